// Copyright 2025 Cowboy AI, LLC.

//! Query-generation session audit records

use crate::identifiers::{GenerationId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit row for one query-generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryGenerationRecord {
    /// Record identifier
    pub id: GenerationId,
    /// Discovery session the queries were generated for
    pub session_id: Option<SessionId>,
    /// Model used, or None when the fallback list was substituted
    pub model_id: Option<String>,
    /// Queries the caller asked for
    pub queries_requested: u32,
    /// Queries the backend produced before filtering
    pub queries_generated: u32,
    /// Queries that passed filtering
    pub queries_approved: u32,
    /// Queries dropped by filtering
    pub queries_rejected: u32,
    /// Why queries were rejected (empty line, too long, duplicate, ...)
    pub rejection_reasons: Vec<String>,
    /// Wall-clock duration of the generation call
    pub duration_ms: u64,
    /// Whether the deterministic fallback list was used
    pub fallback_used: bool,
    /// Why the fallback was used, when it was
    pub fallback_reason: Option<String>,
    /// When the generation ran
    pub generated_at: DateTime<Utc>,
}
