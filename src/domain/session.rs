// Copyright 2025 Cowboy AI, LLC.

//! Discovery sessions and their statistics
//!
//! A session ties one search request to its generated queries, raw results,
//! candidates, and statistics. Once a session leaves `Running`, its counters
//! and completion timestamp are immutable; the stores enforce that by
//! rejecting counter mutations on finalized sessions.

use crate::domain::criteria::SearchCriteria;
use crate::domain::engine::EngineKind;
use crate::identifiers::SessionId;
use crate::state_machine::{State, StateTransitions};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a session came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    /// Triggered by a user request
    Manual,
    /// Triggered by the saved-query schedule
    Scheduled,
    /// Re-run of a previously failed session
    Retry,
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Work is in flight
    Running,
    /// All requests processed and counters finalized
    Completed,
    /// Soft deadline passed or fatal error
    Failed,
    /// Cancelled by an operator
    Cancelled,
}

impl State for SessionStatus {
    fn name(&self) -> &'static str {
        match self {
            SessionStatus::Running => "Running",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
            SessionStatus::Cancelled => "Cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl StateTransitions for SessionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(self, SessionStatus::Running) && !matches!(target, SessionStatus::Running)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            SessionStatus::Running => vec![
                SessionStatus::Completed,
                SessionStatus::Failed,
                SessionStatus::Cancelled,
            ],
            _ => vec![],
        }
    }
}

/// Terminal outcome of one raw result in the processing pipeline
///
/// Every raw result is counted exactly once, under exactly one of these
/// outcomes, which is what makes the conservation invariant checkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessedOutcome {
    /// URL had no parseable host
    InvalidUrl,
    /// Host TLD is a known spam suffix
    SpamTld,
    /// Host already seen in this session
    Duplicate,
    /// Host is blacklisted
    Blacklisted,
    /// Scored at or above the session threshold; candidate created
    HighConfidence,
    /// Scored below the session threshold; candidate still created
    LowConfidence,
}

/// Per-session processing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatistics {
    /// Raw results that reached a terminal pipeline outcome
    pub total_results_processed: u64,
    /// Results dropped for unparseable URLs
    pub invalid_urls_skipped: u64,
    /// Results dropped by the spam-TLD filter
    pub spam_tld_filtered: u64,
    /// Results dropped as in-session duplicates
    pub duplicates_skipped: u64,
    /// Results dropped because the host is blacklisted
    pub blacklisted_skipped: u64,
    /// Candidates at or above the confidence threshold
    pub high_confidence: u64,
    /// Candidates below the confidence threshold
    pub low_confidence: u64,
    /// Candidates created (= high + low)
    pub candidates_created: u64,
}

impl ProcessingStatistics {
    /// Count one terminal outcome
    pub fn record(&mut self, outcome: ProcessedOutcome) {
        self.total_results_processed += 1;
        match outcome {
            ProcessedOutcome::InvalidUrl => self.invalid_urls_skipped += 1,
            ProcessedOutcome::SpamTld => self.spam_tld_filtered += 1,
            ProcessedOutcome::Duplicate => self.duplicates_skipped += 1,
            ProcessedOutcome::Blacklisted => self.blacklisted_skipped += 1,
            ProcessedOutcome::HighConfidence => {
                self.high_confidence += 1;
                self.candidates_created += 1;
            }
            ProcessedOutcome::LowConfidence => {
                self.low_confidence += 1;
                self.candidates_created += 1;
            }
        }
    }

    /// Check the conservation invariant: every processed result is counted
    /// under exactly one outcome
    pub fn is_conserved(&self) -> bool {
        self.invalid_urls_skipped
            + self.spam_tld_filtered
            + self.duplicates_skipped
            + self.blacklisted_skipped
            + self.high_confidence
            + self.low_confidence
            == self.total_results_processed
    }
}

/// Progress toward session completion
///
/// Search workers bump the request side, the scoring worker bumps the
/// processed side; when both sides meet, the session can finalize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    /// Request events published at session start
    pub requests_total: u32,
    /// Requests a search worker has finished (successfully or not)
    pub requests_completed: u32,
    /// Raw results published by search workers
    pub results_found: u64,
    /// Raw results that reached a terminal pipeline outcome
    pub results_processed: u64,
}

impl SessionProgress {
    /// All requests done and every found result processed
    pub fn is_complete(&self) -> bool {
        self.requests_total > 0
            && self.requests_completed >= self.requests_total
            && self.results_processed >= self.results_found
    }
}

/// Per-engine sub-statistics within a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatistics {
    /// Requests this engine completed
    pub requests_completed: u32,
    /// Raw results this engine produced
    pub results_found: u64,
    /// Requests that ended in an adapter error
    pub failures: u32,
    /// Engine disabled for the rest of the session (auth failure)
    pub disabled: bool,
}

/// One discovery session: a user request and everything it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySession {
    /// Session identifier
    pub id: SessionId,
    /// How the session was started
    pub session_type: SessionType,
    /// Lifecycle status
    pub status: SessionStatus,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration, stamped at finalization
    pub duration_ms: Option<u64>,
    /// The user-supplied criteria
    pub criteria: SearchCriteria,
    /// Number of queries the generator produced
    pub queries_generated: u32,
    /// Prompt sent to the generator backend, for audit
    pub generator_prompt: Option<String>,
    /// Model that generated the queries (None when fallback was used)
    pub model_id: Option<String>,
    /// Aggregate processing counters
    pub statistics: ProcessingStatistics,
    /// Completion progress
    pub progress: SessionProgress,
    /// Per-engine sub-statistics, keyed by stable engine name
    pub engine_statistics: IndexMap<String, EngineStatistics>,
}

impl DiscoverySession {
    /// Create a new running session
    pub fn new(session_type: SessionType, criteria: SearchCriteria) -> Self {
        Self {
            id: SessionId::new(),
            session_type,
            status: SessionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            criteria,
            queries_generated: 0,
            generator_prompt: None,
            model_id: None,
            statistics: ProcessingStatistics::default(),
            progress: SessionProgress::default(),
            engine_statistics: IndexMap::new(),
        }
    }

    /// Whether the session still accepts counter mutations
    pub fn is_running(&self) -> bool {
        matches!(self.status, SessionStatus::Running)
    }

    /// Mutable per-engine statistics entry
    pub fn engine_stats_mut(&mut self, engine: EngineKind) -> &mut EngineStatistics {
        self.engine_statistics
            .entry(engine.as_str().to_string())
            .or_default()
    }

    /// Stamp the terminal status, completion time, and duration
    ///
    /// Callers must have checked `is_running`; the stores guard this with
    /// their own first-writer-wins finalize.
    pub fn finalize(&mut self, status: SessionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = Some(
            (now - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::transition;

    #[test]
    fn test_status_transitions() {
        assert!(SessionStatus::Running.can_transition_to(&SessionStatus::Completed));
        assert!(SessionStatus::Running.can_transition_to(&SessionStatus::Failed));
        assert!(SessionStatus::Running.can_transition_to(&SessionStatus::Cancelled));
        assert!(!SessionStatus::Completed.can_transition_to(&SessionStatus::Running));
        assert!(!SessionStatus::Failed.can_transition_to(&SessionStatus::Completed));

        let err = transition(&SessionStatus::Completed, SessionStatus::Failed).unwrap_err();
        assert!(err.to_string().contains("Completed"));
    }

    #[test]
    fn test_statistics_conservation() {
        let mut stats = ProcessingStatistics::default();
        stats.record(ProcessedOutcome::InvalidUrl);
        stats.record(ProcessedOutcome::SpamTld);
        stats.record(ProcessedOutcome::Duplicate);
        stats.record(ProcessedOutcome::Blacklisted);
        stats.record(ProcessedOutcome::HighConfidence);
        stats.record(ProcessedOutcome::LowConfidence);

        assert_eq!(stats.total_results_processed, 6);
        assert_eq!(stats.candidates_created, 2);
        assert!(stats.is_conserved());
    }

    #[test]
    fn test_progress_completion() {
        let mut progress = SessionProgress::default();
        assert!(!progress.is_complete());

        progress.requests_total = 2;
        progress.requests_completed = 2;
        progress.results_found = 5;
        progress.results_processed = 4;
        assert!(!progress.is_complete());

        progress.results_processed = 5;
        assert!(progress.is_complete());
    }

    #[test]
    fn test_finalize_stamps_duration() {
        let mut session =
            DiscoverySession::new(SessionType::Manual, SearchCriteria::canned());
        let now = session.started_at + chrono::Duration::seconds(90);
        session.finalize(SessionStatus::Completed, now);
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.completed_at, Some(now));
        assert_eq!(session.duration_ms, Some(90_000));
    }
}
