// Copyright 2025 Cowboy AI, LLC.

//! Result validation worker
//!
//! Consumes raw result events, extracts the authoritative domain, applies
//! the blacklist cache, and forwards survivors as validated events.
//! Results dropped here reach their terminal counter immediately; the
//! scoring side never sees them.

use crate::bus::consumer::EventHandler;
use crate::bus::events::{PipelineStage, SearchResultEvent, ValidatedResultEvent};
use crate::bus::EventPublisher;
use crate::cache::BlacklistCache;
use crate::domain::{extract_domain, ProcessedOutcome, SessionStatus};
use crate::errors::DiscoveryResult;
use crate::identifiers::SessionId;
use crate::store::StoreHandles;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Consumer of `discovery.results.raw.*`
pub struct ValidationWorker {
    stores: StoreHandles,
    bus: Arc<dyn EventPublisher>,
    blacklist: Arc<BlacklistCache>,
}

impl ValidationWorker {
    /// Wire the worker to the cache and bus
    pub fn new(
        stores: StoreHandles,
        bus: Arc<dyn EventPublisher>,
        blacklist: Arc<BlacklistCache>,
    ) -> Self {
        Self {
            stores,
            bus,
            blacklist,
        }
    }

    async fn drop_result(
        &self,
        session_id: SessionId,
        outcome: ProcessedOutcome,
    ) -> DiscoveryResult<()> {
        let progress = self
            .stores
            .sessions
            .record_outcome(session_id, outcome)
            .await?;
        if let Some(progress) = progress {
            if progress.is_complete()
                && self
                    .stores
                    .sessions
                    .try_finalize_session(session_id, SessionStatus::Completed)
                    .await?
            {
                info!(session_id = %session_id, "session completed at validation");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler<SearchResultEvent> for ValidationWorker {
    fn stage(&self) -> PipelineStage {
        PipelineStage::ResultValidation
    }

    async fn handle(&self, event: SearchResultEvent) -> DiscoveryResult<()> {
        let host = match extract_domain(&event.url) {
            Ok(host) => host,
            Err(e) => {
                debug!(url = %event.url, error = %e, "invalid url dropped at validation");
                return self
                    .drop_result(event.session_id, ProcessedOutcome::InvalidUrl)
                    .await;
            }
        };

        if self.blacklist.is_blacklisted(&host).await? {
            debug!(host, "blacklisted host dropped at validation");
            return self
                .drop_result(event.session_id, ProcessedOutcome::Blacklisted)
                .await;
        }

        let validated = ValidatedResultEvent {
            result: event,
            domain: host,
        };
        self.bus.publish_validated(&validated).await
    }
}
