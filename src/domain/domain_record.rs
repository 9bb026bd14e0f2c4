// Copyright 2025 Cowboy AI, LLC.

//! The global domain registry entry
//!
//! Domains are singletons shared across sessions, keyed by normalized host.
//! The entity methods here are pure (they take `now` explicitly); the stores
//! wrap them in read-modify-write transactions.

use crate::confidence::Confidence;
use crate::identifiers::SessionId;
use crate::state_machine::{State, StateTransitions};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative low-quality sightings that demote a domain with no highs
pub const LOW_QUALITY_STRIKES: u32 = 3;

/// Quality and processing status of a registered domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    /// Seen at least once, not yet judged
    Discovered,
    /// Currently being processed by a later phase
    Processing,
    /// At least one high-confidence sighting
    ProcessedHighQuality,
    /// Demoted after repeated low-confidence sightings
    ProcessedLowQuality,
    /// Known to have no funds in the recorded year
    NoFundsThisYear,
    /// Processing failed; retry after backoff
    ProcessingFailed,
    /// Blocked until explicitly un-blacklisted
    Blacklisted,
}

impl State for DomainStatus {
    fn name(&self) -> &'static str {
        match self {
            DomainStatus::Discovered => "Discovered",
            DomainStatus::Processing => "Processing",
            DomainStatus::ProcessedHighQuality => "ProcessedHighQuality",
            DomainStatus::ProcessedLowQuality => "ProcessedLowQuality",
            DomainStatus::NoFundsThisYear => "NoFundsThisYear",
            DomainStatus::ProcessingFailed => "ProcessingFailed",
            DomainStatus::Blacklisted => "Blacklisted",
        }
    }
}

impl StateTransitions for DomainStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        match self {
            // Blacklisted is sticky: only an explicit un-blacklist leaves it.
            DomainStatus::Blacklisted => matches!(target, DomainStatus::Discovered),
            _ => true,
        }
    }

    fn valid_transitions(&self) -> Vec<Self> {
        let all = [
            DomainStatus::Discovered,
            DomainStatus::Processing,
            DomainStatus::ProcessedHighQuality,
            DomainStatus::ProcessedLowQuality,
            DomainStatus::NoFundsThisYear,
            DomainStatus::ProcessingFailed,
            DomainStatus::Blacklisted,
        ];
        all.into_iter()
            .filter(|t| self.can_transition_to(t))
            .collect()
    }
}

/// Who blacklisted a domain, why, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// Operator or system actor
    pub actor: String,
    /// Human-readable reason
    pub reason: String,
    /// When the blacklisting happened
    pub at: DateTime<Utc>,
}

/// Exponential backoff schedule for failed processing
///
/// Failure 1 waits an hour, 2 four hours, 3 a day, everything after a week.
pub fn backoff_after(failure_count: u32) -> Duration {
    match failure_count {
        0 | 1 => Duration::hours(1),
        2 => Duration::hours(4),
        3 => Duration::days(1),
        _ => Duration::days(7),
    }
}

/// A row in the global domain registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Normalized host, unique across the registry
    pub host: String,
    /// Current status
    pub status: DomainStatus,
    /// Best confidence seen across all sessions
    pub best_confidence: Confidence,
    /// Sightings at or above the threshold
    pub high_quality_count: u32,
    /// Sightings below the threshold
    pub low_quality_count: u32,
    /// First time this host was seen
    pub discovered_at: DateTime<Utc>,
    /// Session that first saw this host
    pub discovered_in: SessionId,
    /// Last time a sighting was recorded
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Total sightings recorded
    pub processing_count: u32,
    /// Consecutive processing failures
    pub failure_count: u32,
    /// Do not process again before this instant
    pub retry_after: Option<DateTime<Utc>>,
    /// Blacklist provenance, present iff status is Blacklisted
    pub blacklist: Option<BlacklistEntry>,
    /// Year for which the domain had no funds
    pub no_funds_year: Option<i32>,
    /// Free-form operator notes
    pub notes: Option<String>,
}

impl DomainRecord {
    /// Register a freshly discovered host
    pub fn new(host: impl Into<String>, session: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            host: host.into(),
            status: DomainStatus::Discovered,
            best_confidence: Confidence::ZERO,
            high_quality_count: 0,
            low_quality_count: 0,
            discovered_at: now,
            discovered_in: session,
            last_processed_at: None,
            processing_count: 0,
            failure_count: 0,
            retry_after: None,
            blacklist: None,
            no_funds_year: None,
            notes: None,
        }
    }

    /// Whether the pipeline should process this domain now
    ///
    /// ```mermaid
    /// graph TD
    ///     A[DomainRecord] -->|Blacklisted| N[false]
    ///     A -->|ProcessedLowQuality| N
    ///     A -->|NoFundsThisYear, year not expired| N
    ///     A -->|ProcessingFailed, now < retry_after| N
    ///     A -->|otherwise| Y[true]
    /// ```
    pub fn should_process(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            DomainStatus::Blacklisted => false,
            DomainStatus::ProcessedLowQuality => false,
            DomainStatus::NoFundsThisYear => {
                // Expires once the calendar rolls past the recorded year.
                match self.no_funds_year {
                    Some(year) => now.year() > year,
                    None => true,
                }
            }
            DomainStatus::ProcessingFailed => match self.retry_after {
                Some(after) => now >= after,
                None => true,
            },
            _ => true,
        }
    }

    /// Record a quality sighting: best-confidence max, counter bump, status
    pub fn apply_quality(&mut self, confidence: Confidence, is_high: bool, now: DateTime<Utc>) {
        self.best_confidence = self.best_confidence.max(confidence);
        self.last_processed_at = Some(now);
        self.processing_count += 1;
        if is_high {
            self.high_quality_count += 1;
        } else {
            self.low_quality_count += 1;
        }

        if self.status == DomainStatus::Blacklisted {
            return;
        }
        if self.high_quality_count > 0 {
            self.status = DomainStatus::ProcessedHighQuality;
        } else if self.low_quality_count >= LOW_QUALITY_STRIKES {
            self.status = DomainStatus::ProcessedLowQuality;
        }
    }

    /// Record a processing failure and schedule the retry
    pub fn record_failure(&mut self, reason: &str, now: DateTime<Utc>) {
        self.failure_count += 1;
        if self.status != DomainStatus::Blacklisted {
            self.status = DomainStatus::ProcessingFailed;
        }
        self.retry_after = Some(now + backoff_after(self.failure_count));
        self.notes = Some(reason.to_string());
    }

    /// Blacklist this domain
    pub fn blacklist(&mut self, reason: &str, actor: &str, now: DateTime<Utc>) {
        self.status = DomainStatus::Blacklisted;
        self.blacklist = Some(BlacklistEntry {
            actor: actor.to_string(),
            reason: reason.to_string(),
            at: now,
        });
    }

    /// Explicitly lift a blacklist (administrator action)
    pub fn unblacklist(&mut self) {
        if self.status == DomainStatus::Blacklisted {
            self.status = DomainStatus::Discovered;
            self.blacklist = None;
        }
    }

    /// Mark the domain as having no funds for the given year
    pub fn mark_no_funds(&mut self, year: i32, notes: Option<String>) {
        if self.status != DomainStatus::Blacklisted {
            self.status = DomainStatus::NoFundsThisYear;
        }
        self.no_funds_year = Some(year);
        if notes.is_some() {
            self.notes = notes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> DomainRecord {
        DomainRecord::new(
            "example.org",
            SessionId::new(),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_new_is_processable() {
        let rec = record();
        assert_eq!(rec.status, DomainStatus::Discovered);
        assert!(rec.should_process(t0()));
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_after(1), Duration::hours(1));
        assert_eq!(backoff_after(2), Duration::hours(4));
        assert_eq!(backoff_after(3), Duration::days(1));
        assert_eq!(backoff_after(4), Duration::days(7));
        assert_eq!(backoff_after(17), Duration::days(7));
    }

    #[test]
    fn test_failure_backoff_progression() {
        let mut rec = record();
        let t0 = t0();

        rec.record_failure("connect timeout", t0);
        assert_eq!(rec.status, DomainStatus::ProcessingFailed);
        assert_eq!(rec.retry_after, Some(t0 + Duration::hours(1)));

        rec.record_failure("connect timeout", t0);
        assert_eq!(rec.retry_after, Some(t0 + Duration::hours(4)));

        rec.record_failure("connect timeout", t0);
        assert_eq!(rec.retry_after, Some(t0 + Duration::days(1)));

        let t3 = t0 + Duration::hours(30);
        rec.record_failure("connect timeout", t3);
        assert_eq!(rec.retry_after, Some(t3 + Duration::days(7)));
    }

    #[test]
    fn test_should_process_respects_retry_after() {
        let mut rec = record();
        let t0 = t0();
        rec.record_failure("dns", t0);
        assert!(!rec.should_process(t0 + Duration::minutes(30)));
        assert!(rec.should_process(t0 + Duration::hours(1)));
    }

    #[test]
    fn test_quality_transitions() {
        let mut rec = record();
        let now = t0();
        let low = Confidence::from_hundredths(30).unwrap();
        let high = Confidence::from_hundredths(80).unwrap();

        rec.apply_quality(low, false, now);
        rec.apply_quality(low, false, now);
        assert_eq!(rec.status, DomainStatus::Discovered);

        rec.apply_quality(low, false, now);
        assert_eq!(rec.status, DomainStatus::ProcessedLowQuality);
        assert_eq!(rec.low_quality_count, 3);

        // A single high sighting promotes, regardless of history.
        rec.apply_quality(high, true, now);
        assert_eq!(rec.status, DomainStatus::ProcessedHighQuality);
        assert_eq!(rec.best_confidence, high);
    }

    #[test]
    fn test_best_confidence_is_monotonic() {
        let mut rec = record();
        let now = t0();
        rec.apply_quality(Confidence::from_hundredths(80).unwrap(), true, now);
        rec.apply_quality(Confidence::from_hundredths(40).unwrap(), false, now);
        assert_eq!(rec.best_confidence.hundredths(), 80);
    }

    #[test]
    fn test_blacklist_is_sticky() {
        let mut rec = record();
        let now = t0();
        rec.blacklist("casino affiliate", "ops", now);
        assert_eq!(rec.status, DomainStatus::Blacklisted);
        assert!(!rec.should_process(now));

        // Quality sightings and failures do not lift a blacklist.
        rec.apply_quality(Confidence::MAX, true, now);
        assert_eq!(rec.status, DomainStatus::Blacklisted);
        rec.record_failure("x", now);
        assert_eq!(rec.status, DomainStatus::Blacklisted);

        rec.unblacklist();
        assert_eq!(rec.status, DomainStatus::Discovered);
        assert!(rec.blacklist.is_none());
    }

    #[test]
    fn test_no_funds_expires_next_year() {
        let mut rec = record();
        rec.mark_no_funds(2025, Some("annual program closed".to_string()));
        assert_eq!(rec.status, DomainStatus::NoFundsThisYear);

        let during = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        assert!(!rec.should_process(during));

        let next_year = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        assert!(rec.should_process(next_year));
    }
}
