// Copyright 2025 Cowboy AI, LLC.

//! Enhancement records: the append-only candidate audit log

use crate::confidence::Confidence;
use crate::identifiers::{CandidateId, EnhancementId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Allowed clock skew when accepting a record's timestamp, in seconds
pub const BACKDATE_TOLERANCE_SECS: i64 = 300;

/// Origin of a proposed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnhancementType {
    /// Proposed by an AI model
    AiSuggested,
    /// Entered directly by a human
    Manual,
    /// A human edited an AI suggestion
    HumanModified,
}

/// Whether a human accepted an AI-suggested change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalState {
    /// Not yet reviewed
    Pending,
    /// Accepted
    Approved,
    /// Declined
    Rejected,
}

/// One append-only change proposal against a candidate field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementRecord {
    /// Record identifier
    pub id: EnhancementId,
    /// Candidate the change targets
    pub candidate_id: CandidateId,
    /// Who proposed the change
    pub actor: String,
    /// When the change was recorded
    pub recorded_at: DateTime<Utc>,
    /// Origin of the change
    pub enhancement_type: EnhancementType,
    /// Candidate field being changed
    pub field_name: String,
    /// Value before the change
    pub original_value: Option<String>,
    /// Proposed value
    pub suggested_value: Option<String>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Model that made an AI suggestion
    pub model_id: Option<String>,
    /// Model confidence in an AI suggestion
    pub model_confidence: Option<Confidence>,
    /// Human approval state
    pub approval: ApprovalState,
    /// Time the actor spent, in milliseconds
    pub time_spent_ms: Option<u64>,
}

impl EnhancementRecord {
    /// Build a manual record stamped with the current time
    pub fn manual(
        candidate_id: CandidateId,
        actor: &str,
        field_name: &str,
        original_value: Option<String>,
        suggested_value: Option<String>,
    ) -> Self {
        Self {
            id: EnhancementId::new(),
            candidate_id,
            actor: actor.to_string(),
            recorded_at: Utc::now(),
            enhancement_type: EnhancementType::Manual,
            field_name: field_name.to_string(),
            original_value,
            suggested_value,
            notes: None,
            model_id: None,
            model_confidence: None,
            approval: ApprovalState::Approved,
            time_spent_ms: None,
        }
    }

    /// Check the record's timestamp against the append-only rule
    ///
    /// Records may not be backdated (or postdated) beyond a small skew
    /// tolerance; the store rejects violations before insert.
    pub fn timestamp_acceptable(&self, now: DateTime<Utc>) -> bool {
        let tolerance = Duration::seconds(BACKDATE_TOLERANCE_SECS);
        self.recorded_at >= now - tolerance && self.recorded_at <= now + tolerance
    }
}
