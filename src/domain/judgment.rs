// Copyright 2025 Cowboy AI, LLC.

//! Metadata judgments: the per-candidate score breakdown

use crate::confidence::Confidence;
use crate::domain::engine::EngineKind;
use crate::identifiers::{CandidateId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed scoring components in hundredths, before clamping
///
/// The breakdown is kept raw so a reviewer can see how a score came to be;
/// the TLD component is the only one that can be negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// TLD tier contribution (domain credibility)
    pub domain_credibility: i16,
    /// Funding keyword found in the title
    pub funding_keywords_title: i16,
    /// Funding keyword found in the description
    pub funding_keywords_description: i16,
    /// Target-region term found in title or description
    pub geographic_relevance: i16,
    /// Organization-type term found in title or description
    pub organization_type: i16,
    /// Bonus when three or more signals are present
    pub compound_bonus: i16,
}

impl ScoreBreakdown {
    /// Raw signed sum in hundredths
    pub fn total(&self) -> i32 {
        i32::from(self.domain_credibility)
            + i32::from(self.funding_keywords_title)
            + i32::from(self.funding_keywords_description)
            + i32::from(self.geographic_relevance)
            + i32::from(self.organization_type)
            + i32::from(self.compound_bonus)
    }

    /// Clamped scale-2 confidence for this breakdown
    pub fn confidence(&self) -> Confidence {
        Confidence::from_hundredths_clamped(self.total())
    }
}

/// Immutable record of how one candidate was scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataJudgment {
    /// Candidate this judgment belongs to
    pub candidate_id: CandidateId,
    /// Session the judgment was made in
    pub session_id: SessionId,
    /// Component scores
    pub breakdown: ScoreBreakdown,
    /// Aggregate confidence (clamped breakdown total)
    pub confidence: Confidence,
    /// Keywords and terms that matched
    pub keywords_found: Vec<String>,
    /// Engine that surfaced the result
    pub engine: EngineKind,
    /// When the judgment was made
    pub judged_at: DateTime<Utc>,
}
