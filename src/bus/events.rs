// Copyright 2025 Cowboy AI, LLC.

//! Event schemas carried on the discovery streams
//!
//! Every event has an explicit serde schema; unknown fields are ignored on
//! the way in, missing required fields fail deserialization and surface as
//! parse errors. Each event derives a deterministic message id so publishes
//! are idempotent and consumers can dedup redeliveries.

use crate::domain::EngineKind;
use crate::identifiers::{ErrorId, RequestId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// FNV-1a 64-bit hash, used for partition routing and content-derived ids
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Pipeline stage an error event originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    /// Query generation against the LLM backend
    QueryGeneration,
    /// Adapter execution against an external engine
    SearchExecution,
    /// Domain extraction and blacklist validation
    ResultValidation,
    /// Scoring and classification
    ResultScoring,
    /// Candidate and domain persistence
    CandidatePersistence,
}

impl PipelineStage {
    /// Stable stage label used in error events
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::QueryGeneration => "QUERY_GENERATION",
            PipelineStage::SearchExecution => "SEARCH_EXECUTION",
            PipelineStage::ResultValidation => "RESULT_VALIDATION",
            PipelineStage::ResultScoring => "RESULT_SCORING",
            PipelineStage::CandidatePersistence => "CANDIDATE_PERSISTENCE",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (engine, query) pair to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequestEvent {
    /// Request identifier, unique per (engine, query) pair
    pub request_id: RequestId,
    /// Owning session
    pub session_id: SessionId,
    /// Query text to send to the engine
    pub query: String,
    /// Engine to execute against
    pub engine: EngineKind,
    /// Results to request from the engine
    pub max_results: u32,
    /// When the request was published
    pub timestamp: DateTime<Utc>,
}

impl SearchRequestEvent {
    /// Deterministic message id for idempotent publish
    pub fn msg_id(&self) -> String {
        format!("req-{}", self.request_id)
    }
}

/// One raw hit from an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultEvent {
    /// Owning session
    pub session_id: SessionId,
    /// Request that produced this hit
    pub request_id: RequestId,
    /// URL the engine returned
    pub url: String,
    /// Normalized host, empty when not yet validated
    pub host: String,
    /// Result title
    pub title: String,
    /// Result snippet
    pub snippet: String,
    /// Engine that produced the hit
    pub engine: EngineKind,
    /// 1-based rank within the engine's response
    pub rank: u32,
    /// When the hit was observed
    pub timestamp: DateTime<Utc>,
}

impl SearchResultEvent {
    /// Content-derived key identifying this result within its session
    ///
    /// Redeliveries and duplicate publishes of the same result share this
    /// key, which is what makes consumer dedup possible.
    pub fn result_key(&self) -> String {
        let content = format!("{}|{}|{}", self.engine, self.url, self.rank);
        format!(
            "{}-{:016x}",
            self.session_id.as_uuid().simple(),
            fnv1a64(content.as_bytes())
        )
    }

    /// Deterministic message id for idempotent publish
    pub fn msg_id(&self) -> String {
        format!("raw-{}", self.result_key())
    }
}

/// A raw hit whose domain passed extraction and the blacklist gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedResultEvent {
    /// The raw result this validation wraps
    #[serde(flatten)]
    pub result: SearchResultEvent,
    /// Normalized host confirmed by the validation stage
    pub domain: String,
}

impl ValidatedResultEvent {
    /// Deterministic message id for idempotent publish
    pub fn msg_id(&self) -> String {
        format!("val-{}", self.result.result_key())
    }
}

/// Dead-letter record for a failure that could not be handled inline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowErrorEvent {
    /// Error identifier
    pub error_id: ErrorId,
    /// Session the failing work belonged to, when known
    pub session_id: Option<SessionId>,
    /// Request the failing work belonged to, when known
    pub request_id: Option<RequestId>,
    /// Stage the failure occurred in
    pub stage: PipelineStage,
    /// Single failure category (AUTH, TIMEOUT, PARSE, ...)
    pub error_type: String,
    /// Human-readable message
    pub message: String,
    /// Delivery attempts consumed before dead-lettering
    pub retry_count: u32,
    /// The payload that was being processed, re-parseable as-is
    pub original_payload: serde_json::Value,
    /// Free-form context (consumer group, subject, host, ...)
    pub context: HashMap<String, String>,
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
}

impl WorkflowErrorEvent {
    /// Build a dead-letter event for a failed payload
    pub fn new(
        stage: PipelineStage,
        error_type: impl Into<String>,
        message: impl Into<String>,
        original_payload: serde_json::Value,
    ) -> Self {
        Self {
            error_id: ErrorId::new(),
            session_id: None,
            request_id: None,
            stage,
            error_type: error_type.into(),
            message: message.into(),
            retry_count: 0,
            original_payload,
            context: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the owning session
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach the owning request
    pub fn with_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Attach a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Totality check: stage and error type present, payload re-parseable
    pub fn is_total(&self) -> bool {
        !self.error_type.trim().is_empty() && !self.stage.as_str().is_empty()
    }

    /// Deterministic message id for idempotent publish
    pub fn msg_id(&self) -> String {
        format!("err-{}", self.error_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event() -> SearchResultEvent {
        SearchResultEvent {
            session_id: SessionId::new(),
            request_id: RequestId::new(),
            url: "https://example.org/grants".to_string(),
            host: "example.org".to_string(),
            title: "Grants".to_string(),
            snippet: "Funding".to_string(),
            engine: EngineKind::Websearch,
            rank: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_fnv_is_stable() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), fnv1a64(b"a"));
        assert_ne!(fnv1a64(b"a"), fnv1a64(b"b"));
    }

    #[test]
    fn test_result_key_deterministic_and_content_sensitive() {
        let event = raw_event();
        assert_eq!(event.result_key(), event.result_key());

        let mut other = event.clone();
        other.rank = 2;
        assert_ne!(event.result_key(), other.result_key());

        // The snippet is not part of the identity.
        let mut same = event.clone();
        same.snippet = "different".to_string();
        assert_eq!(event.result_key(), same.result_key());
    }

    #[test]
    fn test_validated_event_flattens_raw_fields() {
        let validated = ValidatedResultEvent {
            result: raw_event(),
            domain: "example.org".to_string(),
        };
        let json = serde_json::to_value(&validated).unwrap();
        assert_eq!(json["url"], "https://example.org/grants");
        assert_eq!(json["domain"], "example.org");

        let back: ValidatedResultEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.result.rank, 1);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let mut json = serde_json::to_value(raw_event()).unwrap();
        json["surprise"] = serde_json::json!(42);
        let back: SearchResultEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.host, "example.org");
    }

    #[test]
    fn test_error_event_totality() {
        let raw = raw_event();
        let event = WorkflowErrorEvent::new(
            PipelineStage::SearchExecution,
            "TIMEOUT",
            "engine timed out after 3 attempts",
            serde_json::to_value(&raw).unwrap(),
        )
        .with_session(raw.session_id)
        .with_request(raw.request_id)
        .with_context("engine", "websearch");

        assert!(event.is_total());
        // The original payload must be re-parseable.
        let replayed: SearchResultEvent =
            serde_json::from_value(event.original_payload.clone()).unwrap();
        assert_eq!(replayed.url, raw.url);

        let empty_type = WorkflowErrorEvent::new(
            PipelineStage::ResultScoring,
            "",
            "x",
            serde_json::Value::Null,
        );
        assert!(!empty_type.is_total());
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(PipelineStage::SearchExecution.as_str(), "SEARCH_EXECUTION");
        assert_eq!(
            serde_json::to_string(&PipelineStage::ResultScoring).unwrap(),
            "\"RESULT_SCORING\""
        );
    }
}
