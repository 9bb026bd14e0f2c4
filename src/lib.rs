// Copyright 2025 Cowboy AI, LLC.

//! # CIM Discovery
//!
//! Event-driven funding-discovery pipeline core for the Composable
//! Information Machine. The crate turns a user's search criteria into
//! scored, deduplicated funding-opportunity candidates persisted for human
//! review:
//!
//! - **Domain & candidate store**: sessions, the global domain registry
//!   with backoff and blacklist semantics, candidates, judgments, and the
//!   append-only enhancement audit log, behind repository traits with
//!   in-memory and NATS KV implementations.
//! - **Search adapter layer**: one capability interface over keyword APIs,
//!   a self-hosted meta-search, and an AI-answer engine, each wrapped as
//!   `rate_limit(retry(circuit_break(timeout(call))))`.
//! - **Query generator**: LLM-backed with a deterministic fallback list;
//!   it never fails the caller.
//! - **Result-processing pipeline**: extraction, spam-TLD filter, dedup,
//!   blacklist, fixed-point scoring, threshold classification, persistence.
//! - **Event-bus orchestrator**: durable JetStream topics with
//!   session-partitioned subjects, idempotent publishes, manual acks, and
//!   a dead-letter stream.
//!
//! ## Design principles
//!
//! 1. **Explicit state machines**: session, domain, and candidate statuses
//!    transition through validated tables, never ad hoc.
//! 2. **Fixed-point scores**: confidence is integer hundredths end to end;
//!    decimals exist only at the persistence and presentation edges.
//! 3. **Idempotent everything**: publishes carry deterministic message
//!    ids, consumers tolerate redelivery, and uniqueness on host and on
//!    (session, host) absorbs races.
//! 4. **Failures stay local**: a failing engine, cache, or result never
//!    blocks its session; errors are counted, dead-lettered, and replayed.

#![warn(missing_docs)]

pub mod adapters;
pub mod api;
pub mod bus;
pub mod cache;
pub mod config;
mod confidence;
pub mod domain;
mod errors;
pub mod generator;
pub mod identifiers;
pub mod orchestrator;
pub mod pipeline;
pub mod state_machine;
pub mod store;

pub use confidence::Confidence;
pub use errors::{DiscoveryError, DiscoveryResult};

// Re-export the types most callers touch.
pub use adapters::{SearchAdapter, SearchError, SearchHit};
pub use bus::{
    EventPublisher, JetStreamEventBus, NatsClient, NatsConfig, PipelineStage, RecordingEventBus,
    SearchRequestEvent, SearchResultEvent, ValidatedResultEvent, WorkflowErrorEvent,
};
pub use cache::BlacklistCache;
pub use config::DiscoveryConfig;
pub use domain::{
    Candidate, CandidateStatus, DiscoverySession, DomainRecord, DomainStatus, EngineKind,
    ProcessedOutcome, ProcessingStatistics, SearchCriteria, SessionStatus, SessionType,
};
pub use generator::{QueryGenerator, QueryRequest, QueryTemplate};
pub use identifiers::{CandidateId, EntityId, ErrorId, RequestId, SessionId};
pub use orchestrator::{
    DiscoveryOrchestrator, ScoringWorker, SearchInitiated, SearchWorker, ValidationWorker,
};
pub use pipeline::{ConfidenceScorer, PipelineConfig, ResultPipeline, SessionContext};
pub use store::{DiscoveryStore, MemoryStore, NatsKvStore, StoreHandles};
