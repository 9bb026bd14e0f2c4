// Copyright 2025 Cowboy AI, LLC.

//! Session orchestration
//!
//! The orchestrator owns session creation: it validates criteria, asks the
//! generator for per-engine queries, persists the session, and publishes
//! one request event per (engine, query) pair. The stage workers in this
//! module consume the streams and drive results to candidates. A watchdog
//! fails sessions that miss their soft deadline; late outputs against a
//! finalized session are ignored, never counted.

mod scoring_worker;
mod search_worker;
mod validation_worker;

pub use scoring_worker::ScoringWorker;
pub use search_worker::SearchWorker;
pub use validation_worker::ValidationWorker;

use crate::adapters::{HealthStatus, SearchAdapter};
use crate::bus::events::{PipelineStage, SearchRequestEvent};
use crate::bus::EventPublisher;
use crate::cache::BlacklistCache;
use crate::domain::{
    DiscoverySession, EngineKind, ScheduleDay, SearchCriteria, SessionStatus, SessionType,
};
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::generator::{QueryGenerator, QueryRequest};
use crate::identifiers::{ErrorId, RequestId, SessionId};
use crate::store::StoreHandles;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default soft deadline after which a running session is failed
pub const DEFAULT_SESSION_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Queries requested from the generator per template
    pub queries_per_engine: u32,
    /// Soft deadline for a session
    pub session_deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queries_per_engine: 3,
            session_deadline: DEFAULT_SESSION_DEADLINE,
        }
    }
}

/// What `execute_search` returns to the ingress layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInitiated {
    /// The created session
    pub session_id: SessionId,
    /// Request events published
    pub queries_generated: u32,
    /// Always "INITIATED"
    pub status: String,
    /// Human-readable summary
    pub message: String,
}

/// The discovery orchestrator
pub struct DiscoveryOrchestrator {
    stores: StoreHandles,
    bus: Arc<dyn EventPublisher>,
    generator: Arc<QueryGenerator>,
    adapters: HashMap<EngineKind, Arc<dyn SearchAdapter>>,
    blacklist: Arc<BlacklistCache>,
    config: OrchestratorConfig,
}

impl DiscoveryOrchestrator {
    /// Wire the orchestrator to its collaborators
    pub fn new(
        stores: StoreHandles,
        bus: Arc<dyn EventPublisher>,
        generator: Arc<QueryGenerator>,
        adapters: HashMap<EngineKind, Arc<dyn SearchAdapter>>,
        blacklist: Arc<BlacklistCache>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            stores,
            bus,
            generator,
            adapters,
            blacklist,
            config,
        }
    }

    /// Enabled engines, in stable order
    fn engines(&self) -> Vec<EngineKind> {
        let mut engines: Vec<EngineKind> = self.adapters.keys().copied().collect();
        engines.sort_by_key(|e| e.as_str());
        engines
    }

    /// Validate criteria, create a session, and fan out request events
    ///
    /// Validation failures return before any side effect: no session row,
    /// no events.
    pub async fn execute_search(
        &self,
        criteria: SearchCriteria,
        session_type: SessionType,
    ) -> DiscoveryResult<SearchInitiated> {
        criteria.validate()?;

        let engines = self.engines();
        if engines.is_empty() {
            return Err(DiscoveryError::Configuration(
                "no search engines are enabled".to_string(),
            ));
        }

        let mut session = DiscoverySession::new(session_type, criteria.clone());
        let request = QueryRequest::new(criteria, self.config.queries_per_engine);
        let outcomes = self
            .generator
            .generate_multi(&engines, &request, Some(session.id))
            .await;

        let mut pairs: Vec<(EngineKind, String)> = Vec::new();
        for engine in &engines {
            if let Some(outcome) = outcomes.get(engine) {
                if session.generator_prompt.is_none() {
                    session.generator_prompt = Some(outcome.prompt.clone());
                }
                if session.model_id.is_none() {
                    session.model_id = outcome.model_id.clone();
                }
                for query in &outcome.queries {
                    pairs.push((*engine, query.clone()));
                }
            }
        }

        session.queries_generated = pairs.len() as u32;
        session.progress.requests_total = pairs.len() as u32;
        let session_id = session.id;
        let max_results = session.criteria.max_results_per_query;
        self.stores.sessions.create_session(session).await?;

        self.publish_requests(session_id, max_results, &pairs).await?;
        self.spawn_watchdog(session_id);

        info!(
            session_id = %session_id,
            queries = pairs.len(),
            engines = engines.len(),
            "search session initiated"
        );
        Ok(SearchInitiated {
            session_id,
            queries_generated: pairs.len() as u32,
            status: "INITIATED".to_string(),
            message: format!(
                "published {} search requests across {} engines",
                pairs.len(),
                engines.len()
            ),
        })
    }

    /// Run the saved-query library for one schedule day
    pub async fn run_scheduled(&self, day: ScheduleDay) -> DiscoveryResult<Vec<SearchInitiated>> {
        let queries = self.stores.saved_queries.saved_queries_for(day).await?;
        let mut initiated = Vec::new();

        for saved in queries {
            let engines: Vec<EngineKind> = saved
                .engines
                .iter()
                .copied()
                .filter(|e| self.adapters.contains_key(e))
                .collect();
            if engines.is_empty() {
                warn!(query = %saved.name, "saved query targets no enabled engine");
                continue;
            }

            let mut session =
                DiscoverySession::new(SessionType::Scheduled, SearchCriteria::canned());
            let pairs: Vec<(EngineKind, String)> = engines
                .iter()
                .map(|engine| (*engine, saved.text.clone()))
                .collect();
            session.queries_generated = pairs.len() as u32;
            session.progress.requests_total = pairs.len() as u32;
            let session_id = session.id;
            let max_results = session.criteria.max_results_per_query;
            self.stores.sessions.create_session(session).await?;

            self.publish_requests(session_id, max_results, &pairs).await?;
            self.spawn_watchdog(session_id);

            info!(session_id = %session_id, query = %saved.name, "scheduled session initiated");
            initiated.push(SearchInitiated {
                session_id,
                queries_generated: pairs.len() as u32,
                status: "INITIATED".to_string(),
                message: format!("scheduled query '{}' on {} engines", saved.name, pairs.len()),
            });
        }
        Ok(initiated)
    }

    /// Re-publish a dead-letter's original payload onto its stage's topic
    pub async fn replay_dead_letter(&self, error_id: ErrorId) -> DiscoveryResult<PipelineStage> {
        let event = self
            .stores
            .dead_letters
            .get_dead_letter(error_id)
            .await?
            .ok_or_else(|| DiscoveryError::EntityNotFound {
                entity_type: "WorkflowErrorEvent".to_string(),
                id: error_id.to_string(),
            })?;

        match event.stage {
            PipelineStage::SearchExecution => {
                let request: SearchRequestEvent =
                    serde_json::from_value(event.original_payload.clone())?;
                self.bus.publish_request(&request).await?;
            }
            PipelineStage::ResultValidation => {
                let raw: crate::bus::events::SearchResultEvent =
                    serde_json::from_value(event.original_payload.clone())?;
                self.bus.publish_raw(&raw).await?;
            }
            PipelineStage::ResultScoring | PipelineStage::CandidatePersistence => {
                let validated: crate::bus::events::ValidatedResultEvent =
                    serde_json::from_value(event.original_payload.clone())?;
                self.bus.publish_validated(&validated).await?;
            }
            PipelineStage::QueryGeneration => {
                return Err(DiscoveryError::validation(
                    "query-generation failures fall back inline and are not replayable",
                ));
            }
        }

        info!(error_id = %error_id, stage = %event.stage, "dead letter replayed");
        Ok(event.stage)
    }

    /// Health snapshots for every enabled adapter
    pub async fn health(&self) -> Vec<HealthStatus> {
        let mut snapshots = Vec::new();
        for engine in self.engines() {
            if let Some(adapter) = self.adapters.get(&engine) {
                snapshots.push(adapter.health().await);
            }
        }
        snapshots
    }

    /// The blacklist cache facade
    pub fn blacklist(&self) -> &Arc<BlacklistCache> {
        &self.blacklist
    }

    /// Store handles, for the ingress layer
    pub fn stores(&self) -> &StoreHandles {
        &self.stores
    }

    async fn publish_requests(
        &self,
        session_id: SessionId,
        max_results: u32,
        pairs: &[(EngineKind, String)],
    ) -> DiscoveryResult<()> {
        for (engine, query) in pairs {
            let event = SearchRequestEvent {
                request_id: RequestId::new(),
                session_id,
                query: query.clone(),
                engine: *engine,
                max_results,
                timestamp: Utc::now(),
            };
            self.bus.publish_request(&event).await?;
        }
        Ok(())
    }

    fn spawn_watchdog(&self, session_id: SessionId) {
        let sessions = self.stores.sessions.clone();
        let deadline = self.config.session_deadline;
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            match sessions
                .try_finalize_session(session_id, SessionStatus::Failed)
                .await
            {
                Ok(true) => warn!(
                    session_id = %session_id,
                    "session missed its soft deadline and was failed"
                ),
                Ok(false) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "watchdog check failed"),
            }
        });
    }
}
