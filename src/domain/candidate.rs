// Copyright 2025 Cowboy AI, LLC.

//! Funding-source candidates awaiting review

use crate::confidence::Confidence;
use crate::domain::criteria::{FundingCategory, GeographicScope, RecipientType};
use crate::domain::engine::EngineKind;
use crate::identifiers::{CandidateId, SessionId};
use crate::state_machine::{State, StateTransitions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review status of a candidate
///
/// Transitions are monotonic: a candidate moves forward through review and
/// never back, except through an explicit administrator override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    /// Scored at or above the threshold; queued for the crawl phase
    PendingCrawl,
    /// Scored below the threshold; kept for audit, not crawled
    SkippedLowConfidence,
    /// Picked up by a reviewer
    InReview,
    /// Approved by a reviewer
    Approved,
    /// Rejected by a reviewer
    Rejected,
}

impl State for CandidateStatus {
    fn name(&self) -> &'static str {
        match self {
            CandidateStatus::PendingCrawl => "PendingCrawl",
            CandidateStatus::SkippedLowConfidence => "SkippedLowConfidence",
            CandidateStatus::InReview => "InReview",
            CandidateStatus::Approved => "Approved",
            CandidateStatus::Rejected => "Rejected",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            CandidateStatus::SkippedLowConfidence
                | CandidateStatus::Approved
                | CandidateStatus::Rejected
        )
    }
}

impl StateTransitions for CandidateStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        match self {
            CandidateStatus::PendingCrawl => matches!(
                target,
                CandidateStatus::InReview | CandidateStatus::Approved | CandidateStatus::Rejected
            ),
            CandidateStatus::InReview => {
                matches!(target, CandidateStatus::Approved | CandidateStatus::Rejected)
            }
            _ => false,
        }
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            CandidateStatus::PendingCrawl => vec![
                CandidateStatus::InReview,
                CandidateStatus::Approved,
                CandidateStatus::Rejected,
            ],
            CandidateStatus::InReview => {
                vec![CandidateStatus::Approved, CandidateStatus::Rejected]
            }
            _ => vec![],
        }
    }
}

/// A stored prospective funding opportunity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate identifier
    pub id: CandidateId,
    /// Review status
    pub status: CandidateStatus,
    /// Confidence, set once at creation and never mutated
    pub confidence: Confidence,
    /// Normalized host this candidate belongs to
    pub host: String,
    /// Session that created this candidate
    pub session_id: SessionId,
    /// URL the engine returned
    pub source_url: String,
    /// Result title at discovery time
    pub title: String,
    /// Result snippet at discovery time
    pub snippet: String,
    /// Engine that surfaced the result
    pub engine: EngineKind,
    /// Organization name, if one was extracted
    pub organization_name: Option<String>,
    /// Program name, if one was extracted
    pub program_name: Option<String>,
    /// Funding categories this candidate appears to match
    pub categories: Vec<FundingCategory>,
    /// Geographic eligibility tags
    pub geographic_eligibility: Vec<GeographicScope>,
    /// Recipient types this candidate appears to serve
    pub organization_types: Vec<RecipientType>,
    /// When the candidate was created
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// Reviewer the candidate is assigned to
    pub reviewer: Option<String>,
}

impl Candidate {
    /// Status for a score relative to a threshold
    pub fn status_for(confidence: Confidence, threshold: Confidence) -> CandidateStatus {
        if confidence.meets(threshold) {
            CandidateStatus::PendingCrawl
        } else {
            CandidateStatus::SkippedLowConfidence
        }
    }

    /// Apply a reviewed status change, enforcing monotonic transitions
    pub fn review(
        &mut self,
        target: CandidateStatus,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> crate::errors::DiscoveryResult<()> {
        self.status = crate::state_machine::transition(&self.status, target)?;
        self.reviewer = Some(reviewer.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Administrator override: set any status without transition checks
    pub fn admin_override(&mut self, target: CandidateStatus, actor: &str, now: DateTime<Utc>) {
        self.status = target;
        self.reviewer = Some(actor.to_string());
        self.updated_at = now;
    }
}
