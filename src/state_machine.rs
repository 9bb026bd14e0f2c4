// Copyright 2025 Cowboy AI, LLC.

//! State machine support for discovery entities
//!
//! Session, domain, and candidate statuses are enum state machines with
//! controlled transitions. The traits here give every status enum the same
//! transition-validation surface; the entity modules implement the actual
//! transition tables.

use crate::errors::{DiscoveryError, DiscoveryResult};
use std::fmt::Debug;

/// Trait for types that can be used as states in a state machine
pub trait State: Debug + Clone + PartialEq + Eq + Send + Sync {
    /// Get the name of this state for logging/debugging
    fn name(&self) -> &'static str;

    /// Check if this is a terminal state
    fn is_terminal(&self) -> bool {
        false
    }
}

/// States with an explicit transition table
pub trait StateTransitions: State {
    /// Check if a transition to the target state is valid
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Get all valid target states from this state
    fn valid_transitions(&self) -> Vec<Self>;
}

/// Validate and perform a transition, returning the new state
///
/// ```mermaid
/// graph LR
///     A[current] -->|can_transition_to| B[target]
///     A -->|otherwise| E[InvalidStateTransition]
/// ```
pub fn transition<S: StateTransitions>(current: &S, target: S) -> DiscoveryResult<S> {
    if current.can_transition_to(&target) {
        Ok(target)
    } else {
        Err(DiscoveryError::InvalidStateTransition {
            from: current.name().to_string(),
            to: target.name().to_string(),
        })
    }
}
