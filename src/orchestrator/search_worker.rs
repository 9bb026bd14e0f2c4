// Copyright 2025 Cowboy AI, LLC.

//! Search execution worker
//!
//! Consumes request events, executes them through the guarded adapters,
//! and publishes one raw result event per hit. Adapter failures are
//! handled here, per the taxonomy: auth disables the engine for the
//! session (one dead letter, later queries dropped), rate limits and open
//! circuits are logged but never dead-lettered, everything else becomes a
//! dead-letter event. Either way the request is counted toward session
//! progress, so sessions complete even when engines fail.

use crate::adapters::{SearchAdapter, SearchError, SearchHit};
use crate::bus::consumer::{dead_letter, EventHandler};
use crate::bus::events::{PipelineStage, SearchRequestEvent, SearchResultEvent, WorkflowErrorEvent};
use crate::bus::EventPublisher;
use crate::domain::{EngineKind, SessionStatus};
use crate::errors::DiscoveryResult;
use crate::identifiers::SessionId;
use crate::store::StoreHandles;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Consumer of `discovery.requests.*`
pub struct SearchWorker {
    stores: StoreHandles,
    bus: Arc<dyn EventPublisher>,
    adapters: HashMap<EngineKind, Arc<dyn SearchAdapter>>,
}

impl SearchWorker {
    /// Wire the worker to its adapters and collaborators
    pub fn new(
        stores: StoreHandles,
        bus: Arc<dyn EventPublisher>,
        adapters: HashMap<EngineKind, Arc<dyn SearchAdapter>>,
    ) -> Self {
        Self {
            stores,
            bus,
            adapters,
        }
    }

    async fn finish_request(
        &self,
        session_id: SessionId,
        engine: EngineKind,
        results_found: u64,
        failed: bool,
    ) -> DiscoveryResult<()> {
        let progress = self
            .stores
            .sessions
            .record_engine_request(session_id, engine, results_found, failed)
            .await?;
        if let Some(progress) = progress {
            if progress.is_complete()
                && self
                    .stores
                    .sessions
                    .try_finalize_session(session_id, SessionStatus::Completed)
                    .await?
            {
                info!(session_id = %session_id, "session completed with no pending results");
            }
        }
        Ok(())
    }

    async fn handle_failure(
        &self,
        event: &SearchRequestEvent,
        error: SearchError,
    ) -> DiscoveryResult<()> {
        match &error {
            SearchError::Auth { .. } => {
                // Disable the engine for this session; remaining queries for
                // it are dropped on arrival. One dead letter, not one per query.
                self.stores
                    .sessions
                    .disable_engine(event.session_id, event.engine)
                    .await?;
                warn!(
                    session_id = %event.session_id,
                    engine = %event.engine,
                    "auth failure, engine disabled for session"
                );
                let error_event = WorkflowErrorEvent::new(
                    PipelineStage::SearchExecution,
                    error.category(),
                    error.to_string(),
                    serde_json::to_value(event)?,
                )
                .with_session(event.session_id)
                .with_request(event.request_id)
                .with_context("engine", event.engine.as_str());
                dead_letter(
                    self.bus.as_ref(),
                    self.stores.dead_letters.as_ref(),
                    error_event,
                )
                .await;
            }
            SearchError::RateLimited { .. } | SearchError::CircuitOpen { .. } => {
                // The circuit handles these; no dead letter.
                warn!(
                    session_id = %event.session_id,
                    engine = %event.engine,
                    error = %error,
                    "engine unavailable, request dropped"
                );
            }
            _ => {
                let error_event = WorkflowErrorEvent::new(
                    PipelineStage::SearchExecution,
                    error.category(),
                    error.to_string(),
                    serde_json::to_value(event)?,
                )
                .with_session(event.session_id)
                .with_request(event.request_id)
                .with_context("engine", event.engine.as_str());
                dead_letter(
                    self.bus.as_ref(),
                    self.stores.dead_letters.as_ref(),
                    error_event,
                )
                .await;
            }
        }
        self.finish_request(event.session_id, event.engine, 0, true)
            .await
    }
}

fn raw_event(event: &SearchRequestEvent, hit: &SearchHit) -> SearchResultEvent {
    SearchResultEvent {
        session_id: event.session_id,
        request_id: event.request_id,
        url: hit.url.clone(),
        host: hit.host.clone(),
        title: hit.title.clone(),
        snippet: hit.snippet.clone(),
        engine: hit.engine,
        rank: hit.rank,
        timestamp: hit.discovered_at,
    }
}

#[async_trait]
impl EventHandler<SearchRequestEvent> for SearchWorker {
    fn stage(&self) -> PipelineStage {
        PipelineStage::SearchExecution
    }

    async fn handle(&self, event: SearchRequestEvent) -> DiscoveryResult<()> {
        if self
            .stores
            .sessions
            .is_engine_disabled(event.session_id, event.engine)
            .await?
        {
            debug!(
                session_id = %event.session_id,
                engine = %event.engine,
                "engine disabled for session, query dropped"
            );
            return self
                .finish_request(event.session_id, event.engine, 0, false)
                .await;
        }

        let Some(adapter) = self.adapters.get(&event.engine) else {
            return self
                .handle_failure(
                    &event,
                    SearchError::Disabled {
                        engine: event.engine,
                    },
                )
                .await;
        };

        match adapter
            .search(&event.query, event.max_results, event.session_id)
            .await
        {
            Ok(hits) => {
                let found = hits.len() as u64;
                for hit in &hits {
                    self.bus.publish_raw(&raw_event(&event, hit)).await?;
                }
                debug!(
                    session_id = %event.session_id,
                    engine = %event.engine,
                    results = found,
                    "request executed"
                );
                self.finish_request(event.session_id, event.engine, found, false)
                    .await
            }
            Err(error) => self.handle_failure(&event, error).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CircuitState, HealthStatus};
    use crate::bus::RecordingEventBus;
    use crate::domain::{DiscoverySession, SearchCriteria, SessionType};
    use crate::store::{MemoryStore, SessionStore as _};
    use chrono::Utc;
    use crate::identifiers::RequestId;

    struct ScriptedAdapter {
        engine: EngineKind,
        outcome: Result<usize, SearchError>,
    }

    #[async_trait]
    impl SearchAdapter for ScriptedAdapter {
        fn engine(&self) -> EngineKind {
            self.engine
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: u32,
            session_id: crate::identifiers::SessionId,
        ) -> Result<Vec<SearchHit>, SearchError> {
            match &self.outcome {
                Ok(count) => Ok((0..*count)
                    .map(|i| {
                        SearchHit::new(
                            format!("https://result-{i}.example.org/grants"),
                            format!("Result {i}"),
                            "Funding",
                            i as u32 + 1,
                            self.engine,
                            session_id,
                        )
                    })
                    .collect()),
                Err(e) => Err(e.clone()),
            }
        }

        async fn health(&self) -> HealthStatus {
            HealthStatus {
                engine: self.engine,
                up: true,
                circuit: CircuitState::Closed,
                last_error: None,
            }
        }
    }

    fn request(session: &DiscoverySession, engine: EngineKind) -> SearchRequestEvent {
        SearchRequestEvent {
            request_id: RequestId::new(),
            session_id: session.id,
            query: "education grants bulgaria".to_string(),
            engine,
            max_results: 10,
            timestamp: Utc::now(),
        }
    }

    async fn setup(
        outcome: Result<usize, SearchError>,
        requests_total: u32,
    ) -> (SearchWorker, MemoryStore, Arc<RecordingEventBus>, DiscoverySession) {
        let store = MemoryStore::new();
        let bus = Arc::new(RecordingEventBus::new());
        let mut session = DiscoverySession::new(SessionType::Manual, SearchCriteria::canned());
        session.progress.requests_total = requests_total;
        store.create_session(session.clone()).await.unwrap();

        let mut adapters: HashMap<EngineKind, Arc<dyn SearchAdapter>> = HashMap::new();
        adapters.insert(
            EngineKind::Websearch,
            Arc::new(ScriptedAdapter {
                engine: EngineKind::Websearch,
                outcome,
            }),
        );
        let worker = SearchWorker::new(
            StoreHandles::from_store(Arc::new(store.clone())),
            bus.clone(),
            adapters,
        );
        (worker, store, bus, session)
    }

    #[tokio::test]
    async fn test_hits_published_and_progress_recorded() {
        let (worker, store, bus, session) = setup(Ok(3), 2).await;
        worker
            .handle(request(&session, EngineKind::Websearch))
            .await
            .unwrap();

        assert_eq!(bus.raw_results().len(), 3);
        let stored = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.progress.requests_completed, 1);
        assert_eq!(stored.progress.results_found, 3);
        assert!(stored.is_running());
    }

    #[tokio::test]
    async fn test_zero_results_can_complete_session() {
        let (worker, store, bus, session) = setup(Ok(0), 1).await;
        worker
            .handle(request(&session, EngineKind::Websearch))
            .await
            .unwrap();

        assert!(bus.raw_results().is_empty());
        let stored = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_auth_failure_disables_engine_and_drops_rest() {
        let (worker, store, bus, session) = setup(
            Err(SearchError::Auth {
                engine: EngineKind::Websearch,
            }),
            3,
        )
        .await;

        worker
            .handle(request(&session, EngineKind::Websearch))
            .await
            .unwrap();
        assert_eq!(bus.errors().len(), 1);
        assert_eq!(bus.errors()[0].error_type, "AUTH");
        assert!(store
            .is_engine_disabled(session.id, EngineKind::Websearch)
            .await
            .unwrap());

        // The next query for that engine is dropped without a dead letter.
        worker
            .handle(request(&session, EngineKind::Websearch))
            .await
            .unwrap();
        assert_eq!(bus.errors().len(), 1);

        let stored = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.progress.requests_completed, 2);
    }

    #[tokio::test]
    async fn test_rate_limited_no_dead_letter() {
        let (worker, _store, bus, session) = setup(
            Err(SearchError::RateLimited {
                engine: EngineKind::Websearch,
                retry_after_secs: Some(3600),
            }),
            2,
        )
        .await;
        worker
            .handle(request(&session, EngineKind::Websearch))
            .await
            .unwrap();
        assert!(bus.errors().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_dead_letters_with_payload() {
        let (worker, _store, bus, session) = setup(
            Err(SearchError::Timeout {
                engine: EngineKind::Websearch,
                timeout_ms: 10_000,
            }),
            2,
        )
        .await;
        let event = request(&session, EngineKind::Websearch);
        worker.handle(event.clone()).await.unwrap();

        let errors = bus.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, "TIMEOUT");
        assert_eq!(errors[0].stage, PipelineStage::SearchExecution);
        // The original payload replays.
        let replayed: SearchRequestEvent =
            serde_json::from_value(errors[0].original_payload.clone()).unwrap();
        assert_eq!(replayed.request_id, event.request_id);
    }

    #[tokio::test]
    async fn test_unknown_engine_dead_letters_disabled() {
        let (worker, _store, bus, session) = setup(Ok(0), 2).await;
        worker
            .handle(request(&session, EngineKind::AiAnswer))
            .await
            .unwrap();
        assert_eq!(bus.errors().len(), 1);
        assert_eq!(bus.errors()[0].error_type, "DISABLED");
    }
}
