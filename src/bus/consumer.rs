// Copyright 2025 Cowboy AI, LLC.

//! Pull-consumer worker loops
//!
//! One durable pull consumer per (group, partition); a worker task owns
//! each consumer, which preserves per-partition ordering the way one
//! consumer-group member owns a Kafka partition. Acknowledgment is manual:
//! a message is acked only after the handler's side effects are durable.
//! Handler failures publish a dead-letter event and then ack - a poisoned
//! message never loops.

use crate::bus::events::{PipelineStage, WorkflowErrorEvent};
use crate::bus::{EventPublisher, TopicSpec};
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::identifiers::SessionId;
use crate::store::DeadLetterStore;
use async_nats::jetstream::consumer::pull::Config as PullConfig;
use async_nats::jetstream::consumer::{AckPolicy, Consumer};
use async_nats::jetstream::Context as JetStreamContext;
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A typed message handler owned by one consumer group
#[async_trait]
pub trait EventHandler<E: Send + 'static>: Send + Sync {
    /// Stage label for dead-letter events from this handler
    fn stage(&self) -> PipelineStage;

    /// Process one event; side effects must be durable before returning Ok
    async fn handle(&self, event: E) -> DiscoveryResult<()>;
}

/// Create (or look up) the durable pull consumer for one partition
pub async fn pull_consumer(
    js: &JetStreamContext,
    topic: &TopicSpec,
    group: &str,
    partition: Option<u32>,
) -> DiscoveryResult<Consumer<PullConfig>> {
    let stream = js
        .get_stream(topic.stream)
        .await
        .map_err(|e| DiscoveryError::Bus(format!("get stream {}: {e}", topic.stream)))?;

    let (durable, filter) = match partition {
        Some(p) => (
            format!("{group}-p{p}"),
            format!("{}.p{p}", topic.subject_root),
        ),
        None => (group.to_string(), topic.subject_root.to_string()),
    };

    stream
        .get_or_create_consumer(
            &durable,
            PullConfig {
                durable_name: Some(durable.clone()),
                filter_subject: filter,
                ack_policy: AckPolicy::Explicit,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| DiscoveryError::Bus(format!("consumer {durable}: {e}")))
}

/// Map a handler error to the dead-letter error type
fn error_type_of(error: &DiscoveryError) -> &'static str {
    match error {
        DiscoveryError::Store(_) | DiscoveryError::ConcurrencyConflict { .. } => "STORE",
        DiscoveryError::Bus(_) => "BUS",
        DiscoveryError::Search(_) => "SEARCH",
        DiscoveryError::SerializationError(_) => "PARSE",
        DiscoveryError::InvalidUrl(_) => "INVALID_URL",
        DiscoveryError::Validation(_) => "VALIDATION",
        _ => "UNKNOWN",
    }
}

fn session_of(payload: &serde_json::Value) -> Option<SessionId> {
    payload
        .get("session_id")
        .and_then(|v| v.as_str())
        .and_then(|s| SessionId::parse(s).ok())
}

/// Record and publish one dead-letter event
pub async fn dead_letter(
    bus: &dyn EventPublisher,
    dead_letters: &dyn DeadLetterStore,
    event: WorkflowErrorEvent,
) {
    if let Err(e) = dead_letters.record_dead_letter(event.clone()).await {
        error!(error = %e, "failed to record dead letter");
    }
    if let Err(e) = bus.publish_error(&event).await {
        error!(error = %e, "failed to publish dead letter");
    }
}

/// Run one partition's consume loop until shutdown
pub async fn run_partition<E, H>(
    consumer: Consumer<PullConfig>,
    handler: Arc<H>,
    bus: Arc<dyn EventPublisher>,
    dead_letters: Arc<dyn DeadLetterStore>,
    mut shutdown: watch::Receiver<bool>,
) where
    E: DeserializeOwned + Send + 'static,
    H: EventHandler<E> + 'static,
{
    let mut messages = match consumer.messages().await {
        Ok(messages) => messages,
        Err(e) => {
            error!(error = %e, "failed to open message stream");
            return;
        }
    };

    loop {
        let message = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("consumer shutting down");
                    break;
                }
                continue;
            }
            message = messages.next() => message,
        };

        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(error = %e, "message stream error");
                continue;
            }
            None => {
                info!("message stream closed");
                break;
            }
        };

        let payload_value: serde_json::Value =
            serde_json::from_slice(&message.payload).unwrap_or(serde_json::Value::Null);

        match serde_json::from_slice::<E>(&message.payload) {
            Ok(event) => {
                if let Err(handler_error) = handler.handle(event).await {
                    warn!(
                        stage = %handler.stage(),
                        error = %handler_error,
                        "handler failed, dead-lettering"
                    );
                    let mut error_event = WorkflowErrorEvent::new(
                        handler.stage(),
                        error_type_of(&handler_error),
                        handler_error.to_string(),
                        payload_value.clone(),
                    )
                    .with_context("subject", message.subject.to_string());
                    error_event.session_id = session_of(&payload_value);
                    dead_letter(bus.as_ref(), dead_letters.as_ref(), error_event).await;
                } else {
                    debug!(stage = %handler.stage(), "event handled");
                }
            }
            Err(parse_error) => {
                warn!(
                    stage = %handler.stage(),
                    error = %parse_error,
                    "unparseable payload, dead-lettering"
                );
                let mut error_event = WorkflowErrorEvent::new(
                    handler.stage(),
                    "PARSE",
                    parse_error.to_string(),
                    payload_value.clone(),
                )
                .with_context("subject", message.subject.to_string());
                error_event.session_id = session_of(&payload_value);
                dead_letter(bus.as_ref(), dead_letters.as_ref(), error_event).await;
            }
        }

        // Manual ack, always: failures were dead-lettered above, and a
        // redelivery would only replay the same failure.
        if let Err(e) = message.ack().await {
            warn!(error = %e, "ack failed; broker will redeliver");
        }
    }
}

/// Spawn one worker per partition for a consumer group
pub async fn spawn_consumer_group<E, H>(
    js: &JetStreamContext,
    topic: &'static TopicSpec,
    group: &str,
    partitions: u32,
    handler: Arc<H>,
    bus: Arc<dyn EventPublisher>,
    dead_letters: Arc<dyn DeadLetterStore>,
    shutdown: watch::Receiver<bool>,
) -> DiscoveryResult<Vec<JoinHandle<()>>>
where
    E: DeserializeOwned + Send + 'static,
    H: EventHandler<E> + 'static,
{
    let mut handles = Vec::new();
    let partition_ids: Vec<Option<u32>> = if topic.partitioned {
        (0..partitions.max(1)).map(Some).collect()
    } else {
        vec![None]
    };

    for partition in partition_ids {
        let consumer = pull_consumer(js, topic, group, partition).await?;
        info!(group, stream = topic.stream, ?partition, "worker started");
        handles.push(tokio::spawn(run_partition(
            consumer,
            handler.clone(),
            bus.clone(),
            dead_letters.clone(),
            shutdown.clone(),
        )));
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RecordingEventBus;
    use crate::store::MemoryStore;

    #[test]
    fn test_error_type_mapping() {
        assert_eq!(error_type_of(&DiscoveryError::Store("x".to_string())), "STORE");
        assert_eq!(error_type_of(&DiscoveryError::Bus("x".to_string())), "BUS");
        assert_eq!(
            error_type_of(&DiscoveryError::SerializationError("x".to_string())),
            "PARSE"
        );
        assert_eq!(
            error_type_of(&DiscoveryError::InternalError("x".to_string())),
            "UNKNOWN"
        );
    }

    #[test]
    fn test_session_extraction() {
        let session = SessionId::new();
        let payload = serde_json::json!({ "session_id": session.to_string(), "query": "q" });
        assert_eq!(session_of(&payload), Some(session));
        assert_eq!(session_of(&serde_json::Value::Null), None);
    }

    #[tokio::test]
    async fn test_dead_letter_records_and_publishes() {
        let bus = Arc::new(RecordingEventBus::new());
        let store = MemoryStore::new();
        let event = WorkflowErrorEvent::new(
            PipelineStage::ResultScoring,
            "STORE",
            "write failed twice",
            serde_json::json!({"url": "https://example.org"}),
        );
        let id = event.error_id;

        dead_letter(bus.as_ref(), &store, event).await;

        assert_eq!(bus.errors().len(), 1);
        use crate::store::DeadLetterStore as _;
        assert!(store.get_dead_letter(id).await.unwrap().is_some());
    }
}
