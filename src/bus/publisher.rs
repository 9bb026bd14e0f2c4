// Copyright 2025 Cowboy AI, LLC.

//! Event publishing
//!
//! Producers publish with a deterministic `Nats-Msg-Id` header, so the
//! stream's duplicate window absorbs republished events, and await the
//! stream's acknowledgment before reporting success. [`RecordingEventBus`]
//! is the in-memory double used by tests and the validation-only paths.

use crate::bus::events::{
    SearchRequestEvent, SearchResultEvent, ValidatedResultEvent, WorkflowErrorEvent,
};
use crate::bus::{
    TopicSpec, ALL_TOPICS, SEARCH_REQUESTS, SEARCH_RESULTS_RAW, SEARCH_RESULTS_VALIDATED,
    WORKFLOW_ERRORS,
};
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::identifiers::SessionId;
use async_nats::jetstream::{self, Context as JetStreamContext};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::RwLock;
use tracing::{debug, info};

/// Producer surface the orchestrator and workers publish through
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one (engine, query) request
    async fn publish_request(&self, event: &SearchRequestEvent) -> DiscoveryResult<()>;

    /// Publish one raw adapter hit
    async fn publish_raw(&self, event: &SearchResultEvent) -> DiscoveryResult<()>;

    /// Publish one domain-validated hit
    async fn publish_validated(&self, event: &ValidatedResultEvent) -> DiscoveryResult<()>;

    /// Publish one dead-letter event
    async fn publish_error(&self, event: &WorkflowErrorEvent) -> DiscoveryResult<()>;
}

/// JetStream-backed publisher
pub struct JetStreamEventBus {
    js: JetStreamContext,
    partitions: u32,
}

impl JetStreamEventBus {
    /// Build the bus over a JetStream context
    pub fn new(js: JetStreamContext, partitions: u32) -> Self {
        Self {
            js,
            partitions: partitions.max(1),
        }
    }

    /// Create (or update) the four discovery streams
    pub async fn ensure_streams(&self) -> DiscoveryResult<()> {
        for topic in ALL_TOPICS {
            let config = jetstream::stream::Config {
                name: topic.stream.to_string(),
                subjects: topic.subjects(self.partitions),
                retention: jetstream::stream::RetentionPolicy::Limits,
                storage: jetstream::stream::StorageType::File,
                max_age: topic.max_age,
                ..Default::default()
            };
            self.js
                .create_stream(config)
                .await
                .map_err(|e| DiscoveryError::Bus(format!("create stream {}: {e}", topic.stream)))?;
            info!(stream = topic.stream, "stream ensured");
        }
        Ok(())
    }

    async fn publish<T: Serialize>(
        &self,
        topic: &TopicSpec,
        session: SessionId,
        msg_id: &str,
        event: &T,
    ) -> DiscoveryResult<()> {
        let subject = topic.subject_for(session, self.partitions);
        let payload: bytes::Bytes = serde_json::to_vec(event)?.into();

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", msg_id);

        let ack = self
            .js
            .publish_with_headers(subject.clone(), headers, payload)
            .await
            .map_err(|e| DiscoveryError::Bus(format!("publish to {subject}: {e}")))?;
        ack.await
            .map_err(|e| DiscoveryError::Bus(format!("ack from {subject}: {e}")))?;

        debug!(subject, msg_id, "event published");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for JetStreamEventBus {
    async fn publish_request(&self, event: &SearchRequestEvent) -> DiscoveryResult<()> {
        self.publish(&SEARCH_REQUESTS, event.session_id, &event.msg_id(), event)
            .await
    }

    async fn publish_raw(&self, event: &SearchResultEvent) -> DiscoveryResult<()> {
        self.publish(&SEARCH_RESULTS_RAW, event.session_id, &event.msg_id(), event)
            .await
    }

    async fn publish_validated(&self, event: &ValidatedResultEvent) -> DiscoveryResult<()> {
        self.publish(
            &SEARCH_RESULTS_VALIDATED,
            event.result.session_id,
            &event.msg_id(),
            event,
        )
        .await
    }

    async fn publish_error(&self, event: &WorkflowErrorEvent) -> DiscoveryResult<()> {
        let session = event.session_id.unwrap_or_else(SessionId::new);
        self.publish(&WORKFLOW_ERRORS, session, &event.msg_id(), event)
            .await
    }
}

/// In-memory publisher for tests and dry runs
///
/// Records every event per topic; clones share the same buffers.
#[derive(Default)]
pub struct RecordingEventBus {
    requests: RwLock<Vec<SearchRequestEvent>>,
    raw: RwLock<Vec<SearchResultEvent>>,
    validated: RwLock<Vec<ValidatedResultEvent>>,
    errors: RwLock<Vec<WorkflowErrorEvent>>,
}

impl RecordingEventBus {
    /// Create an empty recording bus
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded request events
    pub fn requests(&self) -> Vec<SearchRequestEvent> {
        self.requests.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// All recorded raw result events
    pub fn raw_results(&self) -> Vec<SearchResultEvent> {
        self.raw.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// All recorded validated result events
    pub fn validated_results(&self) -> Vec<ValidatedResultEvent> {
        self.validated.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// All recorded dead-letter events
    pub fn errors(&self) -> Vec<WorkflowErrorEvent> {
        self.errors.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventBus {
    async fn publish_request(&self, event: &SearchRequestEvent) -> DiscoveryResult<()> {
        let mut requests = self.requests.write().unwrap_or_else(|e| e.into_inner());
        // Idempotent publish: a repeated msg_id is absorbed.
        if !requests.iter().any(|e| e.msg_id() == event.msg_id()) {
            requests.push(event.clone());
        }
        Ok(())
    }

    async fn publish_raw(&self, event: &SearchResultEvent) -> DiscoveryResult<()> {
        let mut raw = self.raw.write().unwrap_or_else(|e| e.into_inner());
        if !raw.iter().any(|e| e.msg_id() == event.msg_id()) {
            raw.push(event.clone());
        }
        Ok(())
    }

    async fn publish_validated(&self, event: &ValidatedResultEvent) -> DiscoveryResult<()> {
        let mut validated = self.validated.write().unwrap_or_else(|e| e.into_inner());
        if !validated.iter().any(|e| e.msg_id() == event.msg_id()) {
            validated.push(event.clone());
        }
        Ok(())
    }

    async fn publish_error(&self, event: &WorkflowErrorEvent) -> DiscoveryResult<()> {
        self.errors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
