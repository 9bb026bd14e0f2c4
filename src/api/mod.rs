// Copyright 2025 Cowboy AI, LLC.

//! Ingress REST surface
//!
//! A thin axum wrapper over the orchestrator and the candidate store:
//! `POST /api/search/execute` starts a session, `GET /api/candidates`
//! lists candidates for review, and the approve/reject mutations apply
//! review transitions. Validation failures are HTTP 400 with no side
//! effects; unknown candidates are 404.

use crate::cache::CacheStats;
use crate::domain::{CandidateStatus, EngineKind, EnhancementRecord, SearchCriteria, SessionType};
use crate::errors::DiscoveryError;
use crate::identifiers::CandidateId;
use crate::orchestrator::{DiscoveryOrchestrator, SearchInitiated};
use crate::store::{CandidateFilter, CandidatePage, SortDirection, SortField};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared state of the ingress router
#[derive(Clone)]
pub struct ApiState {
    /// The orchestrator behind the ingress
    pub orchestrator: Arc<DiscoveryOrchestrator>,
}

/// Build the ingress router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/search/execute", post(execute_search))
        .route("/api/candidates", get(list_candidates))
        .route("/api/candidates/:id/approve", put(approve_candidate))
        .route("/api/candidates/:id/reject", put(reject_candidate))
        .route("/api/health", get(health))
        .with_state(state)
}

/// Error envelope returned to ingress callers
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Human-readable error
    pub error: String,
    #[serde(skip)]
    status: StatusCode,
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        let status = match &err {
            DiscoveryError::Validation(_) | DiscoveryError::InvalidStateTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            DiscoveryError::EntityNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            error: err.to_string(),
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

async fn execute_search(
    State(state): State<ApiState>,
    Json(criteria): Json<SearchCriteria>,
) -> Result<Json<SearchInitiated>, ApiError> {
    let initiated = state
        .orchestrator
        .execute_search(criteria, SessionType::Manual)
        .await?;
    Ok(Json(initiated))
}

/// Query parameters of the candidate listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuery {
    /// Status filter (SCREAMING_SNAKE_CASE)
    pub status: Option<String>,
    /// Minimum confidence, decimal in [0, 1]
    pub min_confidence: Option<f64>,
    /// Engine filter (stable engine name)
    pub search_engine: Option<String>,
    /// Created at or after
    pub start_date: Option<DateTime<Utc>>,
    /// Created at or before
    pub end_date: Option<DateTime<Utc>>,
    /// Sort field
    pub sort_by: Option<String>,
    /// Sort direction, ASC or DESC
    pub sort_direction: Option<String>,
    /// 0-indexed page
    pub page: Option<usize>,
    /// Page size, clamped to [1, 100]
    pub size: Option<usize>,
}

impl CandidateQuery {
    fn into_filter(self) -> Result<CandidateFilter, DiscoveryError> {
        let status = match self.status {
            Some(raw) => Some(
                serde_json::from_value::<CandidateStatus>(serde_json::Value::String(raw.clone()))
                    .map_err(|_| {
                        DiscoveryError::validation(format!("unknown status '{raw}'"))
                    })?,
            ),
            None => None,
        };

        let min_confidence = match self.min_confidence {
            Some(raw) => Some(crate::confidence::Confidence::from_f64(raw).ok_or_else(|| {
                DiscoveryError::validation(format!("minConfidence {raw} outside [0, 1]"))
            })?),
            None => None,
        };

        let engine = match self.search_engine {
            Some(raw) => Some(EngineKind::parse(&raw).ok_or_else(|| {
                DiscoveryError::validation(format!("unknown searchEngine '{raw}'"))
            })?),
            None => None,
        };

        let sort_by = match self.sort_by {
            Some(raw) => SortField::parse(&raw)
                .ok_or_else(|| DiscoveryError::validation(format!("unknown sortBy '{raw}'")))?,
            None => SortField::default(),
        };

        let sort_direction = match self.sort_direction.as_deref() {
            Some("ASC") | Some("asc") => SortDirection::Asc,
            Some("DESC") | Some("desc") | None => SortDirection::Desc,
            Some(other) => {
                return Err(DiscoveryError::validation(format!(
                    "sortDirection '{other}' is not ASC or DESC"
                )))
            }
        };

        Ok(CandidateFilter {
            status,
            min_confidence,
            engine,
            start_date: self.start_date,
            end_date: self.end_date,
            sort_by,
            sort_direction,
            page: self.page.unwrap_or(0),
            size: self.size.unwrap_or(20),
        }
        .sanitized())
    }
}

async fn list_candidates(
    State(state): State<ApiState>,
    Query(query): Query<CandidateQuery>,
) -> Result<Json<CandidatePage>, ApiError> {
    let filter = query.into_filter()?;
    let page = state
        .orchestrator
        .stores()
        .candidates
        .query_candidates(&filter)
        .await?;
    Ok(Json(page))
}

async fn review(
    state: &ApiState,
    id: Uuid,
    target: CandidateStatus,
) -> Result<Json<crate::domain::Candidate>, ApiError> {
    let id = CandidateId::from_uuid(id);
    let stores = state.orchestrator.stores();
    let before = stores.candidates.get_candidate(id).await?;
    let reviewed = stores
        .candidates
        .review_candidate(id, target, "review-api")
        .await?;

    // Audit the manual status change.
    let record = EnhancementRecord::manual(
        id,
        "review-api",
        "status",
        before.map(|c| format!("{:?}", c.status)),
        Some(format!("{:?}", reviewed.status)),
    );
    stores.enhancements.append_enhancement(record).await?;

    info!(candidate_id = %id, status = ?reviewed.status, "candidate reviewed");
    Ok(Json(reviewed))
}

async fn approve_candidate(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::domain::Candidate>, ApiError> {
    review(&state, id, CandidateStatus::Approved).await
}

async fn reject_candidate(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::domain::Candidate>, ApiError> {
    review(&state, id, CandidateStatus::Rejected).await
}

/// Health payload for operators
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// Per-engine adapter health
    pub engines: Vec<crate::adapters::HealthStatus>,
    /// Blacklist cache hits
    pub cache_hits: u64,
    /// Blacklist cache misses
    pub cache_misses: u64,
}

async fn health(State(state): State<ApiState>) -> Json<HealthReport> {
    let engines = state.orchestrator.health().await;
    let CacheStats { hits, misses } = state.orchestrator.blacklist().stats();
    Json(HealthReport {
        engines,
        cache_hits: hits,
        cache_misses: misses,
    })
}
