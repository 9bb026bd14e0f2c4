// Copyright 2025 Cowboy AI, LLC.

//! Store-level invariants: uniqueness under races, backoff, blacklist
//! stickiness, review transitions

use chrono::{Duration, Utc};
use cim_discovery::domain::{
    backoff_after, Candidate, CandidateStatus, DomainStatus, EngineKind,
};
use cim_discovery::store::{
    CandidateFilter, CandidateStore, DomainStore, MemoryStore, SortDirection, SortField,
};
use cim_discovery::{CandidateId, Confidence, SessionId};
use std::sync::Arc;

fn candidate(session: SessionId, host: &str, confidence: u8) -> Candidate {
    let now = Utc::now();
    Candidate {
        id: CandidateId::new(),
        status: CandidateStatus::PendingCrawl,
        confidence: Confidence::from_hundredths(i32::from(confidence)).unwrap(),
        host: host.to_string(),
        session_id: session,
        source_url: format!("https://{host}/grants"),
        title: "Grants".to_string(),
        snippet: "Funding".to_string(),
        engine: EngineKind::Websearch,
        organization_name: None,
        program_name: None,
        categories: vec![],
        geographic_eligibility: vec![],
        organization_types: vec![],
        created_at: now,
        updated_at: now,
        reviewer: None,
    }
}

#[tokio::test]
async fn domain_uniqueness_under_concurrent_registration() {
    let store = Arc::new(MemoryStore::new());

    let mut handles = Vec::new();
    for _ in 0..32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .register_or_get("example.org", SessionId::new())
                .await
                .unwrap()
        }));
    }

    let mut discovered_at = Vec::new();
    for handle in handles {
        discovered_at.push(handle.await.unwrap().discovered_at);
    }
    // Every racer saw the same canonical row.
    assert!(discovered_at.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn backoff_schedule_and_monotonicity() {
    let store = MemoryStore::new();
    store
        .register_or_get("flaky.example.org", SessionId::new())
        .await
        .unwrap();

    // Three consecutive failures walk the 1h / 4h / 1d schedule.
    let first = store
        .record_domain_failure("flaky.example.org", "timeout")
        .await
        .unwrap();
    assert_eq!(first.status, DomainStatus::ProcessingFailed);
    let d1 = first.retry_after.unwrap() - Utc::now();
    assert!(d1 <= Duration::hours(1) && d1 > Duration::minutes(55));

    let second = store
        .record_domain_failure("flaky.example.org", "timeout")
        .await
        .unwrap();
    let d2 = second.retry_after.unwrap() - Utc::now();
    assert!(d2 <= Duration::hours(4) && d2 > Duration::hours(3));

    let third = store
        .record_domain_failure("flaky.example.org", "timeout")
        .await
        .unwrap();
    let d3 = third.retry_after.unwrap() - Utc::now();
    assert!(d3 <= Duration::days(1) && d3 > Duration::hours(23));

    // A fourth failure waits a week.
    let fourth = store
        .record_domain_failure("flaky.example.org", "timeout")
        .await
        .unwrap();
    let d4 = fourth.retry_after.unwrap() - Utc::now();
    assert!(d4 <= Duration::days(7) && d4 > Duration::days(6));

    // retry_after is monotone in the failure count.
    for n in 1..20 {
        assert!(backoff_after(n + 1) >= backoff_after(n));
    }

    // While backed off, the domain is not processable.
    assert!(!store.should_process("flaky.example.org").await.unwrap());
}

#[tokio::test]
async fn blacklist_is_monotonic_until_unblacklisted() {
    let store = MemoryStore::new();
    store
        .blacklist_domain("casinowinners.com", "gambling", "ops")
        .await
        .unwrap();

    assert!(!store.should_process("casinowinners.com").await.unwrap());
    assert!(store.is_blacklisted("casinowinners.com").await.unwrap());

    // Quality updates and failures do not lift it.
    store
        .update_quality(
            "casinowinners.com",
            Confidence::from_hundredths(95).unwrap(),
            true,
        )
        .await
        .unwrap();
    assert!(!store.should_process("casinowinners.com").await.unwrap());
    store
        .record_domain_failure("casinowinners.com", "x")
        .await
        .unwrap();
    assert!(!store.should_process("casinowinners.com").await.unwrap());

    // Only the explicit administrator action does.
    store
        .unblacklist_domain("casinowinners.com", "admin")
        .await
        .unwrap();
    assert!(store.should_process("casinowinners.com").await.unwrap());
}

#[tokio::test]
async fn quality_demotion_needs_three_lows_and_no_highs() {
    let store = MemoryStore::new();
    store
        .register_or_get("mediocre.example.org", SessionId::new())
        .await
        .unwrap();

    let low = Confidence::from_hundredths(20).unwrap();
    for _ in 0..2 {
        let record = store
            .update_quality("mediocre.example.org", low, false)
            .await
            .unwrap();
        assert_eq!(record.status, DomainStatus::Discovered);
    }
    let record = store
        .update_quality("mediocre.example.org", low, false)
        .await
        .unwrap();
    assert_eq!(record.status, DomainStatus::ProcessedLowQuality);
    assert!(!store.should_process("mediocre.example.org").await.unwrap());
}

#[tokio::test]
async fn mark_no_funds_requires_existing_row() {
    let store = MemoryStore::new();
    let err = store
        .mark_no_funds("unknown.example.org", 2025, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn review_transitions_and_errors() {
    let store = MemoryStore::new();
    let session = SessionId::new();
    let inserted = store
        .insert_candidate(candidate(session, "example.org", 80))
        .await
        .unwrap();
    let id = inserted.id();

    let approved = store
        .review_candidate(id, CandidateStatus::Approved, "reviewer")
        .await
        .unwrap();
    assert_eq!(approved.status, CandidateStatus::Approved);
    assert_eq!(approved.reviewer.as_deref(), Some("reviewer"));

    // Approving again: already in the target state.
    let err = store
        .review_candidate(id, CandidateStatus::Approved, "reviewer")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        cim_discovery::DiscoveryError::InvalidStateTransition { .. }
    ));

    // Unknown candidate: not found.
    let err = store
        .review_candidate(CandidateId::new(), CandidateStatus::Rejected, "reviewer")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn candidate_listing_filters_and_pages() {
    let store = MemoryStore::new();
    let session = SessionId::new();
    for (i, confidence) in [85u8, 40, 70, 95, 15].iter().enumerate() {
        store
            .insert_candidate(candidate(session, &format!("host-{i}.org"), *confidence))
            .await
            .unwrap();
    }

    let page = store
        .query_candidates(&CandidateFilter {
            min_confidence: Confidence::from_hundredths(60),
            sort_by: SortField::Confidence,
            sort_direction: SortDirection::Desc,
            page: 0,
            size: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total_items, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].confidence.hundredths(), 95);
    assert_eq!(page.items[1].confidence.hundredths(), 85);

    let second_page = store
        .query_candidates(&CandidateFilter {
            min_confidence: Confidence::from_hundredths(60),
            sort_by: SortField::Confidence,
            sort_direction: SortDirection::Desc,
            page: 1,
            size: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second_page.items.len(), 1);
    assert_eq!(second_page.items[0].confidence.hundredths(), 70);
}
