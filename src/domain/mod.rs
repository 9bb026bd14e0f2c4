// Copyright 2025 Cowboy AI, LLC.

//! Domain entities and value objects of the discovery pipeline
//!
//! These types carry the business semantics: sessions, the global domain
//! registry, candidates awaiting review, score breakdowns, the audit log,
//! and provider usage. Entities are plain serde-able values; persistence
//! lives behind the repository traits in [`crate::store`].

mod candidate;
mod criteria;
mod domain_record;
mod engine;
mod enhancement;
mod generation;
mod judgment;
mod search_query;
mod session;
mod url;
mod usage;

pub use candidate::{Candidate, CandidateStatus};
pub use criteria::{
    FundingCategory, GeographicScope, ProjectScale, RecipientType, SearchCriteria,
};
pub use domain_record::{
    backoff_after, BlacklistEntry, DomainRecord, DomainStatus, LOW_QUALITY_STRIKES,
};
pub use engine::{EngineKind, ProviderType};
pub use enhancement::{
    ApprovalState, EnhancementRecord, EnhancementType, BACKDATE_TOLERANCE_SECS,
};
pub use generation::QueryGenerationRecord;
pub use judgment::{MetadataJudgment, ScoreBreakdown};
pub use search_query::{SavedQuery, ScheduleDay};
pub use session::{
    DiscoverySession, EngineStatistics, ProcessedOutcome, ProcessingStatistics, SessionProgress,
    SessionStatus, SessionType,
};
pub use url::extract_domain;
pub use usage::ProviderUsage;
