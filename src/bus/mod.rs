// Copyright 2025 Cowboy AI, LLC.

//! Event-bus plumbing: topics, schemas, publisher, consumers
//!
//! Four durable JetStream streams decouple the pipeline stages. Kafka-style
//! partitions are modeled as subject tokens: a session hashes to one
//! partition per topic, so its events stay ordered for any consumer that
//! owns that partition.

pub mod consumer;
pub mod events;
mod nats;
mod publisher;

pub use consumer::{pull_consumer, run_partition, spawn_consumer_group, EventHandler};
pub use events::{
    fnv1a64, PipelineStage, SearchRequestEvent, SearchResultEvent, ValidatedResultEvent,
    WorkflowErrorEvent,
};
pub use nats::{NatsClient, NatsConfig, NatsError};
pub use publisher::{EventPublisher, JetStreamEventBus, RecordingEventBus};

use crate::identifiers::SessionId;
use std::time::Duration;

/// Default partition count per partitioned topic
pub const DEFAULT_PARTITIONS: u32 = 3;
/// Default worker count per consumer group
pub const DEFAULT_WORKERS: usize = 3;

/// One durable topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicSpec {
    /// JetStream stream name
    pub stream: &'static str,
    /// Subject root; partitioned topics append `.p<n>`
    pub subject_root: &'static str,
    /// Message retention
    pub max_age: Duration,
    /// Whether the topic is partitioned by session
    pub partitioned: bool,
}

/// One message per (engine, query) pair
pub const SEARCH_REQUESTS: TopicSpec = TopicSpec {
    stream: "DISCOVERY-REQUESTS",
    subject_root: "discovery.requests",
    max_age: Duration::from_secs(7 * 24 * 60 * 60),
    partitioned: true,
};

/// One message per adapter hit
pub const SEARCH_RESULTS_RAW: TopicSpec = TopicSpec {
    stream: "DISCOVERY-RESULTS-RAW",
    subject_root: "discovery.results.raw",
    max_age: Duration::from_secs(7 * 24 * 60 * 60),
    partitioned: true,
};

/// One message per domain-validated hit
pub const SEARCH_RESULTS_VALIDATED: TopicSpec = TopicSpec {
    stream: "DISCOVERY-RESULTS-VALIDATED",
    subject_root: "discovery.results.validated",
    max_age: Duration::from_secs(7 * 24 * 60 * 60),
    partitioned: true,
};

/// Dead-letter stream, single partition
pub const WORKFLOW_ERRORS: TopicSpec = TopicSpec {
    stream: "DISCOVERY-ERRORS",
    subject_root: "discovery.errors",
    max_age: Duration::from_secs(30 * 24 * 60 * 60),
    partitioned: false,
};

/// All topics, for stream provisioning
pub const ALL_TOPICS: [TopicSpec; 4] = [
    SEARCH_REQUESTS,
    SEARCH_RESULTS_RAW,
    SEARCH_RESULTS_VALIDATED,
    WORKFLOW_ERRORS,
];

impl TopicSpec {
    /// Subjects this topic's stream binds
    pub fn subjects(&self, partitions: u32) -> Vec<String> {
        if self.partitioned {
            (0..partitions.max(1))
                .map(|p| format!("{}.p{p}", self.subject_root))
                .collect()
        } else {
            vec![self.subject_root.to_string()]
        }
    }

    /// Subject a session's events ride on
    pub fn subject_for(&self, session: SessionId, partitions: u32) -> String {
        if self.partitioned {
            let partition = partition_for(session, partitions);
            format!("{}.p{partition}", self.subject_root)
        } else {
            self.subject_root.to_string()
        }
    }
}

/// Deterministic session-to-partition routing
pub fn partition_for(session: SessionId, partitions: u32) -> u32 {
    let partitions = partitions.max(1);
    (fnv1a64(session.as_uuid().as_bytes()) % u64::from(partitions)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_routing_is_stable() {
        let session = SessionId::new();
        let first = partition_for(session, 3);
        assert_eq!(first, partition_for(session, 3));
        assert!(first < 3);
    }

    #[test]
    fn test_session_rides_one_subject_per_topic() {
        let session = SessionId::new();
        let subject = SEARCH_REQUESTS.subject_for(session, 3);
        for _ in 0..10 {
            assert_eq!(SEARCH_REQUESTS.subject_for(session, 3), subject);
        }
        assert!(subject.starts_with("discovery.requests.p"));
    }

    #[test]
    fn test_error_topic_single_subject() {
        assert_eq!(
            WORKFLOW_ERRORS.subjects(3),
            vec!["discovery.errors".to_string()]
        );
        assert_eq!(
            WORKFLOW_ERRORS.subject_for(SessionId::new(), 3),
            "discovery.errors"
        );
    }

    #[test]
    fn test_partitioned_subjects() {
        assert_eq!(
            SEARCH_RESULTS_RAW.subjects(3),
            vec![
                "discovery.results.raw.p0".to_string(),
                "discovery.results.raw.p1".to_string(),
                "discovery.results.raw.p2".to_string(),
            ]
        );
    }

    #[test]
    fn test_retention_windows() {
        assert_eq!(SEARCH_REQUESTS.max_age, Duration::from_secs(604_800));
        assert_eq!(WORKFLOW_ERRORS.max_age, Duration::from_secs(2_592_000));
    }
}
