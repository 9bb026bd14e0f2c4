// Copyright 2025 Cowboy AI, LLC.

//! Phantom-typed identifiers for discovery entities
//!
//! Every identifier is a UUID wrapped with a marker type, so a `SessionId`
//! can never be passed where a `CandidateId` is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use uuid::Uuid;

/// A typed identifier backed by a UUID
pub struct EntityId<M> {
    id: Uuid,
    _marker: PhantomData<M>,
}

impl<M> EntityId<M> {
    /// Create a new random identifier
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            _marker: PhantomData,
        }
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.id
    }

    /// Parse from the canonical hyphenated form
    pub fn parse(input: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(input).map(Self::from_uuid)
    }
}

impl<M> Default for EntityId<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for EntityId<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for EntityId<M> {}

impl<M> PartialEq for EntityId<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for EntityId<M> {}

impl<M> PartialOrd for EntityId<M> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for EntityId<M> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<M> Hash for EntityId<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> fmt::Debug for EntityId<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.id)
    }
}

impl<M> fmt::Display for EntityId<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<M> Serialize for EntityId<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de, M> Deserialize<'de> for EntityId<M> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

/// Marker types for phantom type parameters
pub mod markers {
    /// Marker for discovery sessions
    #[derive(Debug, Clone, Copy)]
    pub struct SessionMarker;
    /// Marker for funding-source candidates
    #[derive(Debug, Clone, Copy)]
    pub struct CandidateMarker;
    /// Marker for individual search requests
    #[derive(Debug, Clone, Copy)]
    pub struct RequestMarker;
    /// Marker for dead-letter error events
    #[derive(Debug, Clone, Copy)]
    pub struct ErrorMarker;
    /// Marker for query-generation sessions
    #[derive(Debug, Clone, Copy)]
    pub struct GenerationMarker;
    /// Marker for enhancement audit records
    #[derive(Debug, Clone, Copy)]
    pub struct EnhancementMarker;
}

/// Identifier of a discovery session
pub type SessionId = EntityId<markers::SessionMarker>;
/// Identifier of a funding-source candidate
pub type CandidateId = EntityId<markers::CandidateMarker>;
/// Identifier of one (engine, query) search request
pub type RequestId = EntityId<markers::RequestMarker>;
/// Identifier of a dead-lettered workflow error
pub type ErrorId = EntityId<markers::ErrorMarker>;
/// Identifier of a query-generation session
pub type GenerationId = EntityId<markers::GenerationMarker>;
/// Identifier of an enhancement audit record
pub type EnhancementId = EntityId<markers::EnhancementMarker>;
