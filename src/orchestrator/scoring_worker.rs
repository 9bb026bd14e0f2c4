// Copyright 2025 Cowboy AI, LLC.

//! Scoring worker
//!
//! Consumes validated result events and runs the result-processing
//! pipeline. Per-session contexts (seen hosts, processed keys) live in
//! memory while the session is live and are dropped at finalization;
//! candidate uniqueness on (session, host) keeps reprocessing idempotent
//! even across a restart that loses the in-memory context.

use crate::adapters::SearchHit;
use crate::bus::consumer::EventHandler;
use crate::bus::events::{PipelineStage, ValidatedResultEvent};
use crate::domain::SessionStatus;
use crate::errors::DiscoveryResult;
use crate::identifiers::SessionId;
use crate::pipeline::{ResultPipeline, SessionContext};
use crate::store::StoreHandles;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Consumer of `discovery.results.validated.*`
pub struct ScoringWorker {
    stores: StoreHandles,
    pipeline: Arc<ResultPipeline>,
    contexts: Mutex<HashMap<SessionId, SessionContext>>,
}

impl ScoringWorker {
    /// Wire the worker to the pipeline
    pub fn new(stores: StoreHandles, pipeline: Arc<ResultPipeline>) -> Self {
        Self {
            stores,
            pipeline,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    fn hit_of(event: &ValidatedResultEvent) -> SearchHit {
        SearchHit {
            url: event.result.url.clone(),
            host: event.domain.clone(),
            title: event.result.title.clone(),
            snippet: event.result.snippet.clone(),
            rank: event.result.rank,
            engine: event.result.engine,
            discovered_at: event.result.timestamp,
            session_id: event.result.session_id,
        }
    }
}

#[async_trait]
impl EventHandler<ValidatedResultEvent> for ScoringWorker {
    fn stage(&self) -> PipelineStage {
        PipelineStage::ResultScoring
    }

    async fn handle(&self, event: ValidatedResultEvent) -> DiscoveryResult<()> {
        let session_id = event.result.session_id;
        let session = match self.stores.sessions.get_session(session_id).await? {
            Some(session) => session,
            None => {
                debug!(session_id = %session_id, "result for unknown session dropped");
                return Ok(());
            }
        };
        if !session.is_running() {
            // Stale output after deadline or completion: ignored for counters.
            debug!(session_id = %session_id, "stale result for finalized session ignored");
            return Ok(());
        }

        let hit = Self::hit_of(&event);
        let result_key = event.result.result_key();

        let mut contexts = self.contexts.lock().await;
        let ctx = contexts
            .entry(session_id)
            .or_insert_with(|| SessionContext::new(session_id, &session.criteria));

        let outcome = self.pipeline.process(ctx, &hit, &result_key).await?;

        if let Some(counted) = outcome.counted() {
            let progress = self
                .stores
                .sessions
                .record_outcome(session_id, counted)
                .await?;
            if let Some(progress) = progress {
                if progress.is_complete()
                    && self
                        .stores
                        .sessions
                        .try_finalize_session(session_id, SessionStatus::Completed)
                        .await?
                {
                    contexts.remove(&session_id);
                    info!(session_id = %session_id, "session completed");
                }
            }
        }
        Ok(())
    }
}
