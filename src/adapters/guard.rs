// Copyright 2025 Cowboy AI, LLC.

//! Middleware composition around an engine adapter
//!
//! `GuardedAdapter` wraps any [`SearchAdapter`] as
//! `rate_limit(retry(circuit_break(timeout(call))))`. Rate limiting sits
//! outermost so an exhausted budget never consumes retries; the breaker is
//! checked per attempt so an open circuit stops a retry run mid-flight.

use crate::adapters::{
    with_retry, with_timeout, CircuitBreaker, CircuitBreakerConfig, HealthStatus, RateLimit,
    RetryPolicy, SearchAdapter, SearchError, SearchHit, UsageRateLimiter,
};
use crate::domain::EngineKind;
use crate::identifiers::SessionId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A [`SearchAdapter`] wrapped with the shared middleware stack
pub struct GuardedAdapter<A: SearchAdapter> {
    inner: A,
    breaker: CircuitBreaker,
    limiter: Arc<UsageRateLimiter>,
    limit: Option<RateLimit>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<A: SearchAdapter> GuardedAdapter<A> {
    /// Wrap an adapter with breaker, limiter, retry, and timeout
    pub fn new(
        inner: A,
        breaker_config: CircuitBreakerConfig,
        limiter: Arc<UsageRateLimiter>,
        limit: Option<RateLimit>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(breaker_config),
            limiter,
            limit,
            retry,
            timeout,
        }
    }

    /// The wrapped adapter
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: SearchAdapter> SearchAdapter for GuardedAdapter<A> {
    fn engine(&self) -> EngineKind {
        self.inner.engine()
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        session_id: SessionId,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let engine = self.engine();

        // Rate limit first: an exhausted budget must not touch the engine
        // and trips the circuit so later messages short-circuit cheaply.
        let reservation = match self.limiter.reserve(engine, query, self.limit).await {
            Ok(reservation) => reservation,
            Err(e @ SearchError::RateLimited { .. }) => {
                warn!(engine = %engine, "rate limit exhausted, tripping circuit");
                self.breaker.trip("rate limit exhausted");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let started = Instant::now();
        let result = with_retry(&self.retry, engine, |_attempt| async {
            if !self.breaker.allow() {
                return Err(SearchError::CircuitOpen { engine });
            }
            let outcome = with_timeout(
                engine,
                self.timeout,
                self.inner.search(query, max_results, session_id),
            )
            .await;
            match &outcome {
                Ok(_) => self.breaker.record_success(),
                // An open circuit is not a new failure; the breaker knows.
                Err(SearchError::CircuitOpen { .. }) => {}
                Err(e) => self.breaker.record_failure(&e.to_string()),
            }
            outcome
        })
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(hits) => {
                info!(
                    engine = %engine,
                    results = hits.len(),
                    elapsed_ms,
                    "search completed"
                );
                self.limiter
                    .complete(reservation, hits.len() as u32, true, elapsed_ms)
                    .await;
            }
            Err(error) => {
                warn!(engine = %engine, elapsed_ms, error = %error, "search failed");
                self.limiter.complete(reservation, 0, false, elapsed_ms).await;
            }
        }
        result
    }

    async fn health(&self) -> HealthStatus {
        let circuit = self.breaker.state();
        HealthStatus {
            engine: self.engine(),
            up: circuit != crate::adapters::CircuitState::Open,
            circuit,
            last_error: self.breaker.last_error(),
        }
    }
}
