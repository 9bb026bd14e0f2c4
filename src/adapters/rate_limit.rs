// Copyright 2025 Cowboy AI, LLC.

//! Usage-table-backed rate limiting
//!
//! The rolling count over the provider usage log enforces limits, so every
//! process sharing the store shares one budget. A usage row is written
//! before the engine is contacted; the outcome fields are filled in after.

use crate::adapters::SearchError;
use crate::domain::{EngineKind, ProviderUsage};
use crate::store::UsageStore;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// A rolling-window call budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Calls allowed inside the window
    pub max_calls: u64,
    /// Window length
    pub window: Duration,
}

impl RateLimit {
    /// A daily quota
    pub fn daily(max_calls: u64) -> Self {
        Self {
            max_calls,
            window: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// A per-minute budget
    pub fn per_minute(max_calls: u64) -> Self {
        Self {
            max_calls,
            window: Duration::from_secs(60),
        }
    }
}

/// Handle to a reserved usage row, completed after the call returns
#[derive(Debug, Clone, Copy)]
pub struct UsageReservation {
    /// Usage row id to complete
    pub usage_id: Uuid,
}

/// Rate limiter backed by [`UsageStore`] rolling counts
pub struct UsageRateLimiter {
    store: Arc<dyn UsageStore>,
}

impl UsageRateLimiter {
    /// Build a limiter over the shared usage store
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Check the budget and record the pre-call usage row
    ///
    /// Fails with `RateLimited` without contacting the engine when the
    /// rolling count has reached the limit.
    pub async fn reserve(
        &self,
        engine: EngineKind,
        query: &str,
        limit: Option<RateLimit>,
    ) -> Result<UsageReservation, SearchError> {
        if let Some(limit) = limit {
            let window = ChronoDuration::from_std(limit.window)
                .unwrap_or_else(|_| ChronoDuration::hours(24));
            let since = Utc::now() - window;
            let used = self
                .store
                .count_usage_since(engine, since)
                .await
                .map_err(|e| SearchError::Unknown {
                    engine,
                    detail: format!("usage count failed: {e}"),
                })?;
            if used >= limit.max_calls {
                return Err(SearchError::RateLimited {
                    engine,
                    retry_after_secs: Some(limit.window.as_secs()),
                });
            }
        }

        let usage = ProviderUsage::reserve(engine, query);
        let usage_id = usage.id;
        self.store
            .record_usage(usage)
            .await
            .map_err(|e| SearchError::Unknown {
                engine,
                detail: format!("usage record failed: {e}"),
            })?;
        Ok(UsageReservation { usage_id })
    }

    /// Fill in the outcome of a reserved row; best-effort
    pub async fn complete(
        &self,
        reservation: UsageReservation,
        result_count: u32,
        success: bool,
        response_time_ms: u64,
    ) {
        if let Err(e) = self
            .store
            .complete_usage(reservation.usage_id, result_count, success, response_time_ms)
            .await
        {
            warn!(error = %e, "failed to complete usage row");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, UsageStore as _};

    #[tokio::test]
    async fn test_reserve_under_limit() {
        let store = MemoryStore::new();
        let limiter = UsageRateLimiter::new(Arc::new(store.clone()));
        let limit = Some(RateLimit::per_minute(2));

        limiter
            .reserve(EngineKind::AiAnswer, "q", limit)
            .await
            .unwrap();
        limiter
            .reserve(EngineKind::AiAnswer, "q", limit)
            .await
            .unwrap();

        let err = limiter
            .reserve(EngineKind::AiAnswer, "q", limit)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "RATE_LIMITED");

        // The pre-call rows exist either way.
        let count = store
            .count_usage_since(EngineKind::AiAnswer, Utc::now() - ChronoDuration::minutes(1))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_no_limit_always_reserves() {
        let store = MemoryStore::new();
        let limiter = UsageRateLimiter::new(Arc::new(store));
        for _ in 0..10 {
            limiter
                .reserve(EngineKind::MetaSearch, "q", None)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_complete_fills_outcome() {
        let store = MemoryStore::new();
        let limiter = UsageRateLimiter::new(Arc::new(store.clone()));
        let reservation = limiter
            .reserve(EngineKind::Websearch, "grants", None)
            .await
            .unwrap();
        limiter.complete(reservation, 7, true, 420).await;

        // One row, now marked successful.
        let count = store
            .count_usage_since(EngineKind::Websearch, Utc::now() - ChronoDuration::minutes(1))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_budgets_are_per_engine() {
        let store = MemoryStore::new();
        let limiter = UsageRateLimiter::new(Arc::new(store));
        let limit = Some(RateLimit::daily(1));

        limiter
            .reserve(EngineKind::Websearch, "q", limit)
            .await
            .unwrap();
        // A different engine has its own budget.
        limiter
            .reserve(EngineKind::GoogleProxy, "q", limit)
            .await
            .unwrap();
        assert!(limiter
            .reserve(EngineKind::Websearch, "q", limit)
            .await
            .is_err());
    }
}
