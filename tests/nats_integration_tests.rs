// Copyright 2025 Cowboy AI, LLC.

//! Integration tests against a live NATS server
//!
//! These tests require a running NATS server with JetStream enabled.
//! Run with: `nats-server -js`

use chrono::Utc;
use cim_discovery::bus::{
    pull_consumer, JetStreamEventBus, NatsClient, NatsConfig, SEARCH_REQUESTS,
};
use cim_discovery::domain::EngineKind;
use cim_discovery::store::{DomainStore, NatsKvConfig, NatsKvStore, SessionStore};
use cim_discovery::{
    Confidence, EventPublisher, RequestId, SearchRequestEvent, SessionId,
};
use futures::StreamExt;
use uuid::Uuid;

/// Helper to check if NATS is available
async fn nats_available() -> Option<NatsClient> {
    let config = NatsConfig {
        url: "nats://localhost:4222".to_string(),
        ..Default::default()
    };
    NatsClient::connect(config).await.ok()
}

fn request_event() -> SearchRequestEvent {
    SearchRequestEvent {
        request_id: RequestId::new(),
        session_id: SessionId::new(),
        query: "education grants bulgaria".to_string(),
        engine: EngineKind::Websearch,
        max_results: 10,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_publish_consume_roundtrip_with_dedup() {
    let Some(client) = nats_available().await else {
        eprintln!("Skipping test: NATS server not available");
        return;
    };

    let bus = JetStreamEventBus::new(client.jetstream().clone(), 3);
    bus.ensure_streams().await.unwrap();

    let event = request_event();
    bus.publish_request(&event).await.unwrap();
    // Same msg id: the stream's duplicate window absorbs the republish.
    bus.publish_request(&event).await.unwrap();

    let group = format!("test-roundtrip-{}", Uuid::new_v4().simple());
    let partition = cim_discovery::bus::partition_for(event.session_id, 3);
    let consumer = pull_consumer(client.jetstream(), &SEARCH_REQUESTS, &group, Some(partition))
        .await
        .unwrap();

    let mut messages = consumer.messages().await.unwrap();
    let message = tokio::time::timeout(std::time::Duration::from_secs(5), messages.next())
        .await
        .expect("timed out waiting for message")
        .expect("stream closed")
        .expect("message error");

    let received: SearchRequestEvent = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(received.request_id, event.request_id);
    message.ack().await.unwrap();

    // The duplicate publish must not deliver a second copy.
    let second = tokio::time::timeout(std::time::Duration::from_secs(2), messages.next()).await;
    match second {
        Err(_) => {}
        Ok(Some(Ok(extra))) => {
            let extra_event: SearchRequestEvent = serde_json::from_slice(&extra.payload).unwrap();
            assert_ne!(
                extra_event.request_id, event.request_id,
                "duplicate publish was delivered"
            );
        }
        Ok(_) => {}
    }
}

#[tokio::test]
async fn test_kv_store_domain_roundtrip() {
    let Some(client) = nats_available().await else {
        eprintln!("Skipping test: NATS server not available");
        return;
    };

    let config = NatsKvConfig {
        bucket_prefix: format!("test-{}", Uuid::new_v4().simple()),
        ..Default::default()
    };
    let store = NatsKvStore::new(client.client().clone(), config).await.unwrap();

    let host = "example.org";
    let session = SessionId::new();
    let first = store.register_or_get(host, session).await.unwrap();
    let second = store.register_or_get(host, SessionId::new()).await.unwrap();
    assert_eq!(first.discovered_in, second.discovered_in);

    let updated = store
        .update_quality(host, Confidence::from_hundredths(85).unwrap(), true)
        .await
        .unwrap();
    assert_eq!(updated.best_confidence.hundredths(), 85);
    assert_eq!(updated.high_quality_count, 1);

    store.blacklist_domain(host, "spam", "ops").await.unwrap();
    assert!(!store.should_process(host).await.unwrap());
    assert!(store.is_blacklisted(host).await.unwrap());
}

#[tokio::test]
async fn test_kv_store_session_finalize_once() {
    let Some(client) = nats_available().await else {
        eprintln!("Skipping test: NATS server not available");
        return;
    };

    let config = NatsKvConfig {
        bucket_prefix: format!("test-{}", Uuid::new_v4().simple()),
        ..Default::default()
    };
    let store = NatsKvStore::new(client.client().clone(), config).await.unwrap();

    let session = cim_discovery::DiscoverySession::new(
        cim_discovery::SessionType::Manual,
        cim_discovery::SearchCriteria::canned(),
    );
    let id = session.id;
    store.create_session(session).await.unwrap();

    assert!(store
        .try_finalize_session(id, cim_discovery::SessionStatus::Completed)
        .await
        .unwrap());
    assert!(!store
        .try_finalize_session(id, cim_discovery::SessionStatus::Failed)
        .await
        .unwrap());

    let stored = store.get_session(id).await.unwrap().unwrap();
    assert_eq!(stored.status, cim_discovery::SessionStatus::Completed);
}
