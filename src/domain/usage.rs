// Copyright 2025 Cowboy AI, LLC.

//! Provider API usage rows
//!
//! One row per outbound call to an external engine. The rolling counts over
//! this log are the source of truth for rate limiting, so multi-process
//! deployments share one budget.

use crate::domain::engine::EngineKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One outbound call to a search provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUsage {
    /// Row identifier
    pub id: Uuid,
    /// Provider that was called
    pub provider: EngineKind,
    /// Query that was sent
    pub query: String,
    /// Results the provider returned
    pub result_count: u32,
    /// Whether the call succeeded
    pub success: bool,
    /// Round-trip time in milliseconds
    pub response_time_ms: u64,
    /// When the call was issued
    pub requested_at: DateTime<Utc>,
}

impl ProviderUsage {
    /// Record the reservation made before a call goes out
    ///
    /// The row is written before the engine is contacted so the rolling
    /// count includes in-flight calls; the outcome fields are filled in by
    /// `complete` once the call returns.
    pub fn reserve(provider: EngineKind, query: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
            query: query.to_string(),
            result_count: 0,
            success: false,
            response_time_ms: 0,
            requested_at: Utc::now(),
        }
    }
}
