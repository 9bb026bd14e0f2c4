// Copyright 2025 Cowboy AI, LLC.

//! NATS KV-backed store
//!
//! One bucket per entity family, created at construction. Uniqueness races
//! resolve through `create` (which fails when the key exists, after which we
//! re-read); read-modify-write goes through revision-checked `update` with a
//! bounded retry loop.

use crate::bus::events::WorkflowErrorEvent;
use crate::confidence::Confidence;
use crate::domain::{
    Candidate, CandidateStatus, DiscoverySession, DomainRecord, EngineKind, EnhancementRecord,
    MetadataJudgment, ProcessedOutcome, ProviderUsage, QueryGenerationRecord, SavedQuery,
    ScheduleDay, SessionProgress, SessionStatus,
};
use crate::errors::{DiscoveryError, DiscoveryResult};
use crate::identifiers::{CandidateId, ErrorId, SessionId};
use crate::store::{
    CandidateFilter, CandidateInsert, CandidatePage, CandidateStore, DeadLetterStore, DomainStore,
    EnhancementStore, GenerationStore, JudgmentStore, SavedQueryStore, SessionStore, SortDirection,
    SortField, UsageStore,
};
use async_nats::jetstream::{self, kv};
use async_nats::Client;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// Attempts before a revision-checked update gives up
const RMW_ATTEMPTS: usize = 5;

/// Configuration for the NATS KV store
#[derive(Debug, Clone)]
pub struct NatsKvConfig {
    /// Prefix for every bucket name
    pub bucket_prefix: String,
    /// History depth kept per key
    pub history: i64,
    /// Retention for usage rows (drives rolling rate limits)
    pub usage_max_age_secs: u64,
    /// Retention for dead-letter records
    pub dead_letter_max_age_secs: u64,
}

impl Default for NatsKvConfig {
    fn default() -> Self {
        Self {
            bucket_prefix: "discovery".to_string(),
            history: 5,
            usage_max_age_secs: 48 * 60 * 60,
            dead_letter_max_age_secs: 30 * 24 * 60 * 60,
        }
    }
}

/// NATS KV-backed implementation of every store trait
#[derive(Clone)]
pub struct NatsKvStore {
    sessions: kv::Store,
    domains: kv::Store,
    candidates: kv::Store,
    candidate_index: kv::Store,
    judgments: kv::Store,
    enhancements: kv::Store,
    usage: kv::Store,
    saved_queries: kv::Store,
    generations: kv::Store,
    dead_letters: kv::Store,
}

impl NatsKvStore {
    /// Create all buckets and return the store
    pub async fn new(client: Client, config: NatsKvConfig) -> DiscoveryResult<Self> {
        let js = jetstream::new(client);

        let bucket = |name: &str, max_age_secs: u64| kv::Config {
            bucket: format!("{}-{name}", config.bucket_prefix),
            history: config.history,
            max_age: std::time::Duration::from_secs(max_age_secs),
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        };

        let create = |cfg: kv::Config| {
            let js = js.clone();
            async move {
                js.create_key_value(cfg)
                    .await
                    .map_err(|e| DiscoveryError::store(format!("failed to create bucket: {e}")))
            }
        };

        Ok(Self {
            sessions: create(bucket("sessions", 0)).await?,
            domains: create(bucket("domains", 0)).await?,
            candidates: create(bucket("candidates", 0)).await?,
            candidate_index: create(bucket("candidate-index", 0)).await?,
            judgments: create(bucket("judgments", 0)).await?,
            enhancements: create(bucket("enhancements", 0)).await?,
            usage: create(bucket("usage", config.usage_max_age_secs)).await?,
            saved_queries: create(bucket("queries", 0)).await?,
            generations: create(bucket("generations", 0)).await?,
            dead_letters: create(bucket("errors", config.dead_letter_max_age_secs)).await?,
        })
    }

    /// Read and deserialize a value
    async fn read<T: DeserializeOwned>(
        bucket: &kv::Store,
        key: &str,
    ) -> DiscoveryResult<Option<T>> {
        match bucket.get(key).await {
            Ok(Some(bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DiscoveryError::store(format!("get {key}: {e}"))),
        }
    }

    /// Serialize and put a value unconditionally
    async fn write<T: Serialize>(bucket: &kv::Store, key: &str, value: &T) -> DiscoveryResult<()> {
        let payload = serde_json::to_vec(value)?;
        bucket
            .put(key, payload.into())
            .await
            .map_err(|e| DiscoveryError::store(format!("put {key}: {e}")))?;
        Ok(())
    }

    /// Create a key that must not exist yet
    ///
    /// Returns `AlreadyExists` when another writer won the race.
    async fn create_unique<T: Serialize>(
        bucket: &kv::Store,
        key: &str,
        value: &T,
    ) -> DiscoveryResult<()> {
        let payload = serde_json::to_vec(value)?;
        match bucket.create(key, payload.into()).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => {
                Err(DiscoveryError::AlreadyExists(key.to_string()))
            }
            Err(e) => Err(DiscoveryError::store(format!("create {key}: {e}"))),
        }
    }

    /// Revision-checked read-modify-write over an existing key
    ///
    /// The closure may return `None` to signal "no write needed" (the row is
    /// in a state that must not be mutated); its `Some` result is returned
    /// after the update lands.
    async fn rmw<T, R, F>(bucket: &kv::Store, key: &str, entity: &str, mutate: F) -> DiscoveryResult<Option<R>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&mut T) -> DiscoveryResult<Option<R>>,
    {
        for attempt in 0..RMW_ATTEMPTS {
            let entry = bucket
                .entry(key)
                .await
                .map_err(|e| DiscoveryError::store(format!("entry {key}: {e}")))?
                .ok_or_else(|| DiscoveryError::EntityNotFound {
                    entity_type: entity.to_string(),
                    id: key.to_string(),
                })?;

            let mut value: T = serde_json::from_slice(&entry.value)?;
            let result = match mutate(&mut value)? {
                Some(result) => result,
                None => return Ok(None),
            };

            let payload = serde_json::to_vec(&value)?;
            match bucket.update(key, payload.into(), entry.revision).await {
                Ok(_) => return Ok(Some(result)),
                Err(e) => {
                    // Revision moved under us; re-read and retry.
                    warn!(key, attempt, error = %e, "kv update conflict, retrying");
                }
            }
        }
        Err(DiscoveryError::ConcurrencyConflict {
            expected: 0,
            actual: RMW_ATTEMPTS as u64,
        })
    }

    /// All values in a bucket whose key starts with a prefix
    async fn scan<T: DeserializeOwned>(
        bucket: &kv::Store,
        prefix: &str,
    ) -> DiscoveryResult<Vec<T>> {
        let mut keys = bucket
            .keys()
            .await
            .map_err(|e| DiscoveryError::store(format!("keys: {e}")))?;

        let mut values = Vec::new();
        while let Some(key) = keys.next().await {
            let key = key.map_err(|e| DiscoveryError::store(format!("keys: {e}")))?;
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(value) = Self::read::<T>(bucket, &key).await? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

fn session_key(id: SessionId) -> String {
    id.as_uuid().simple().to_string()
}

fn candidate_key(id: CandidateId) -> String {
    id.as_uuid().simple().to_string()
}

fn index_key(session: SessionId, host: &str) -> String {
    format!("{}.{host}", session.as_uuid().simple())
}

#[async_trait]
impl SessionStore for NatsKvStore {
    async fn create_session(&self, session: DiscoverySession) -> DiscoveryResult<()> {
        Self::create_unique(&self.sessions, &session_key(session.id), &session).await
    }

    async fn get_session(&self, id: SessionId) -> DiscoveryResult<Option<DiscoverySession>> {
        Self::read(&self.sessions, &session_key(id)).await
    }

    async fn list_recent_sessions(&self, limit: usize) -> DiscoveryResult<Vec<DiscoverySession>> {
        let mut sessions: Vec<DiscoverySession> = Self::scan(&self.sessions, "").await?;
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn record_engine_request(
        &self,
        id: SessionId,
        engine: EngineKind,
        results_found: u64,
        failed: bool,
    ) -> DiscoveryResult<Option<SessionProgress>> {
        Self::rmw(
            &self.sessions,
            &session_key(id),
            "DiscoverySession",
            |session: &mut DiscoverySession| {
                if !session.is_running() {
                    return Ok(None);
                }
                session.progress.requests_completed += 1;
                session.progress.results_found += results_found;
                let stats = session.engine_stats_mut(engine);
                stats.requests_completed += 1;
                stats.results_found += results_found;
                if failed {
                    stats.failures += 1;
                }
                Ok(Some(session.progress))
            },
        )
        .await
    }

    async fn record_outcome(
        &self,
        id: SessionId,
        outcome: ProcessedOutcome,
    ) -> DiscoveryResult<Option<SessionProgress>> {
        Self::rmw(
            &self.sessions,
            &session_key(id),
            "DiscoverySession",
            |session: &mut DiscoverySession| {
                if !session.is_running() {
                    return Ok(None);
                }
                session.statistics.record(outcome);
                session.progress.results_processed += 1;
                Ok(Some(session.progress))
            },
        )
        .await
    }

    async fn disable_engine(&self, id: SessionId, engine: EngineKind) -> DiscoveryResult<()> {
        Self::rmw(
            &self.sessions,
            &session_key(id),
            "DiscoverySession",
            |session: &mut DiscoverySession| {
                session.engine_stats_mut(engine).disabled = true;
                Ok(Some(()))
            },
        )
        .await?;
        Ok(())
    }

    async fn is_engine_disabled(
        &self,
        id: SessionId,
        engine: EngineKind,
    ) -> DiscoveryResult<bool> {
        let session: Option<DiscoverySession> = Self::read(&self.sessions, &session_key(id)).await?;
        Ok(session.is_some_and(|s| {
            s.engine_statistics
                .get(engine.as_str())
                .is_some_and(|stats| stats.disabled)
        }))
    }

    async fn try_finalize_session(
        &self,
        id: SessionId,
        status: SessionStatus,
    ) -> DiscoveryResult<bool> {
        let flipped = Self::rmw(
            &self.sessions,
            &session_key(id),
            "DiscoverySession",
            |session: &mut DiscoverySession| {
                if !session.is_running() {
                    return Ok(None);
                }
                session.finalize(status, Utc::now());
                Ok(Some(()))
            },
        )
        .await?;
        Ok(flipped.is_some())
    }
}

#[async_trait]
impl DomainStore for NatsKvStore {
    async fn register_or_get(
        &self,
        host: &str,
        session: SessionId,
    ) -> DiscoveryResult<DomainRecord> {
        if let Some(existing) = Self::read(&self.domains, host).await? {
            return Ok(existing);
        }

        let record = DomainRecord::new(host, session, Utc::now());
        match Self::create_unique(&self.domains, host, &record).await {
            Ok(()) => Ok(record),
            Err(e) if e.is_conflict() => {
                // Another writer registered the host first; their row wins.
                Self::read(&self.domains, host)
                    .await?
                    .ok_or_else(|| DiscoveryError::store(format!("domain {host} vanished")))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_domain(&self, host: &str) -> DiscoveryResult<Option<DomainRecord>> {
        Self::read(&self.domains, host).await
    }

    async fn should_process(&self, host: &str) -> DiscoveryResult<bool> {
        let record: Option<DomainRecord> = Self::read(&self.domains, host).await?;
        Ok(record.map_or(true, |r| r.should_process(Utc::now())))
    }

    async fn is_blacklisted(&self, host: &str) -> DiscoveryResult<bool> {
        let record: Option<DomainRecord> = Self::read(&self.domains, host).await?;
        Ok(record.is_some_and(|r| r.blacklist.is_some()))
    }

    async fn update_quality(
        &self,
        host: &str,
        confidence: Confidence,
        is_high: bool,
    ) -> DiscoveryResult<DomainRecord> {
        let updated = Self::rmw(&self.domains, host, "Domain", |record: &mut DomainRecord| {
            record.apply_quality(confidence, is_high, Utc::now());
            Ok(Some(record.clone()))
        })
        .await?;
        updated.ok_or_else(|| DiscoveryError::store(format!("update_quality {host} skipped")))
    }

    async fn blacklist_domain(
        &self,
        host: &str,
        reason: &str,
        actor: &str,
    ) -> DiscoveryResult<DomainRecord> {
        // Upsert: register first, then flip inside the RMW loop.
        self.register_or_get(host, SessionId::new()).await?;
        let updated = Self::rmw(&self.domains, host, "Domain", |record: &mut DomainRecord| {
            record.blacklist(reason, actor, Utc::now());
            Ok(Some(record.clone()))
        })
        .await?;
        updated.ok_or_else(|| DiscoveryError::store(format!("blacklist {host} skipped")))
    }

    async fn unblacklist_domain(&self, host: &str, _actor: &str) -> DiscoveryResult<DomainRecord> {
        let updated = Self::rmw(&self.domains, host, "Domain", |record: &mut DomainRecord| {
            record.unblacklist();
            Ok(Some(record.clone()))
        })
        .await?;
        updated.ok_or_else(|| DiscoveryError::store(format!("unblacklist {host} skipped")))
    }

    async fn mark_no_funds(
        &self,
        host: &str,
        year: i32,
        notes: Option<String>,
    ) -> DiscoveryResult<DomainRecord> {
        let updated = Self::rmw(&self.domains, host, "Domain", |record: &mut DomainRecord| {
            record.mark_no_funds(year, notes.clone());
            Ok(Some(record.clone()))
        })
        .await?;
        updated.ok_or_else(|| DiscoveryError::store(format!("mark_no_funds {host} skipped")))
    }

    async fn record_domain_failure(
        &self,
        host: &str,
        reason: &str,
    ) -> DiscoveryResult<DomainRecord> {
        let updated = Self::rmw(&self.domains, host, "Domain", |record: &mut DomainRecord| {
            record.record_failure(reason, Utc::now());
            Ok(Some(record.clone()))
        })
        .await?;
        updated.ok_or_else(|| DiscoveryError::store(format!("record_failure {host} skipped")))
    }
}

#[async_trait]
impl CandidateStore for NatsKvStore {
    async fn insert_candidate(&self, candidate: Candidate) -> DiscoveryResult<CandidateInsert> {
        let index = index_key(candidate.session_id, &candidate.host);

        match Self::create_unique(&self.candidate_index, &index, &candidate.id).await {
            Ok(()) => {
                Self::write(&self.candidates, &candidate_key(candidate.id), &candidate).await?;
                Ok(CandidateInsert::Inserted(candidate.id))
            }
            Err(e) if e.is_conflict() => {
                let existing: CandidateId = Self::read(&self.candidate_index, &index)
                    .await?
                    .ok_or_else(|| DiscoveryError::store(format!("index {index} vanished")))?;
                Ok(CandidateInsert::Existing(existing))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_candidate(&self, id: CandidateId) -> DiscoveryResult<Option<Candidate>> {
        Self::read(&self.candidates, &candidate_key(id)).await
    }

    async fn review_candidate(
        &self,
        id: CandidateId,
        target: CandidateStatus,
        reviewer: &str,
    ) -> DiscoveryResult<Candidate> {
        let reviewed = Self::rmw(
            &self.candidates,
            &candidate_key(id),
            "Candidate",
            |candidate: &mut Candidate| {
                candidate.review(target, reviewer, Utc::now())?;
                Ok(Some(candidate.clone()))
            },
        )
        .await?;
        reviewed.ok_or_else(|| DiscoveryError::store(format!("review {id} skipped")))
    }

    async fn query_candidates(&self, filter: &CandidateFilter) -> DiscoveryResult<CandidatePage> {
        let filter = filter.clone().sanitized();
        let mut matching: Vec<Candidate> = Self::scan::<Candidate>(&self.candidates, "")
            .await?
            .into_iter()
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.min_confidence.map_or(true, |m| c.confidence >= m))
            .filter(|c| filter.engine.map_or(true, |e| c.engine == e))
            .filter(|c| filter.start_date.map_or(true, |d| c.created_at >= d))
            .filter(|c| filter.end_date.map_or(true, |d| c.created_at <= d))
            .collect();

        matching.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::Confidence => a.confidence.cmp(&b.confidence),
                SortField::Host => a.host.cmp(&b.host),
            };
            match filter.sort_direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total_items = matching.len() as u64;
        let items: Vec<Candidate> = matching
            .into_iter()
            .skip(filter.page * filter.size)
            .take(filter.size)
            .collect();

        Ok(CandidatePage {
            items,
            page: filter.page,
            size: filter.size,
            total_items,
        })
    }
}

#[async_trait]
impl JudgmentStore for NatsKvStore {
    async fn insert_judgment(&self, judgment: MetadataJudgment) -> DiscoveryResult<()> {
        let key = format!(
            "{}.{}",
            judgment.candidate_id.as_uuid().simple(),
            Uuid::new_v4().simple()
        );
        Self::write(&self.judgments, &key, &judgment).await
    }

    async fn judgments_for(&self, id: CandidateId) -> DiscoveryResult<Vec<MetadataJudgment>> {
        let prefix = format!("{}.", id.as_uuid().simple());
        let mut judgments: Vec<MetadataJudgment> = Self::scan(&self.judgments, &prefix).await?;
        judgments.sort_by(|a, b| a.judged_at.cmp(&b.judged_at));
        Ok(judgments)
    }
}

#[async_trait]
impl EnhancementStore for NatsKvStore {
    async fn append_enhancement(&self, record: EnhancementRecord) -> DiscoveryResult<()> {
        if !record.timestamp_acceptable(Utc::now()) {
            return Err(DiscoveryError::validation(format!(
                "enhancement timestamp {} outside the clock-skew tolerance",
                record.recorded_at
            )));
        }
        let key = format!(
            "{}.{}.{}",
            record.candidate_id.as_uuid().simple(),
            record.recorded_at.timestamp_millis(),
            record.id.as_uuid().simple()
        );
        // Append-only: create, never put.
        Self::create_unique(&self.enhancements, &key, &record).await
    }

    async fn enhancements_for(&self, id: CandidateId) -> DiscoveryResult<Vec<EnhancementRecord>> {
        let prefix = format!("{}.", id.as_uuid().simple());
        let mut records: Vec<EnhancementRecord> = Self::scan(&self.enhancements, &prefix).await?;
        records.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        Ok(records)
    }
}

#[async_trait]
impl UsageStore for NatsKvStore {
    async fn record_usage(&self, usage: ProviderUsage) -> DiscoveryResult<()> {
        let key = format!("u.{}", usage.id.simple());
        Self::write(&self.usage, &key, &usage).await
    }

    async fn complete_usage(
        &self,
        id: Uuid,
        result_count: u32,
        success: bool,
        response_time_ms: u64,
    ) -> DiscoveryResult<()> {
        let key = format!("u.{}", id.simple());
        if let Some(mut row) = Self::read::<ProviderUsage>(&self.usage, &key).await? {
            row.result_count = result_count;
            row.success = success;
            row.response_time_ms = response_time_ms;
            Self::write(&self.usage, &key, &row).await?;
        }
        Ok(())
    }

    async fn count_usage_since(
        &self,
        provider: EngineKind,
        since: DateTime<Utc>,
    ) -> DiscoveryResult<u64> {
        let rows: Vec<ProviderUsage> = Self::scan(&self.usage, "u.").await?;
        Ok(rows
            .iter()
            .filter(|u| u.provider == provider && u.requested_at >= since)
            .count() as u64)
    }
}

#[async_trait]
impl SavedQueryStore for NatsKvStore {
    async fn upsert_saved_query(&self, query: SavedQuery) -> DiscoveryResult<()> {
        let key = query.id.simple().to_string();
        Self::write(&self.saved_queries, &key, &query).await
    }

    async fn list_saved_queries(&self) -> DiscoveryResult<Vec<SavedQuery>> {
        let mut queries: Vec<SavedQuery> = Self::scan(&self.saved_queries, "").await?;
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(queries)
    }

    async fn saved_queries_for(&self, day: ScheduleDay) -> DiscoveryResult<Vec<SavedQuery>> {
        let mut queries: Vec<SavedQuery> = Self::scan::<SavedQuery>(&self.saved_queries, "")
            .await?
            .into_iter()
            .filter(|q| q.enabled && q.day == day)
            .collect();
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(queries)
    }
}

#[async_trait]
impl GenerationStore for NatsKvStore {
    async fn record_generation(&self, record: QueryGenerationRecord) -> DiscoveryResult<()> {
        let key = format!(
            "{}.{}",
            record.generated_at.timestamp_millis(),
            record.id.as_uuid().simple()
        );
        Self::write(&self.generations, &key, &record).await
    }

    async fn list_recent_generations(
        &self,
        limit: usize,
    ) -> DiscoveryResult<Vec<QueryGenerationRecord>> {
        let mut records: Vec<QueryGenerationRecord> = Self::scan(&self.generations, "").await?;
        records.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[async_trait]
impl DeadLetterStore for NatsKvStore {
    async fn record_dead_letter(&self, event: WorkflowErrorEvent) -> DiscoveryResult<()> {
        let key = event.error_id.as_uuid().simple().to_string();
        Self::write(&self.dead_letters, &key, &event).await
    }

    async fn get_dead_letter(&self, id: ErrorId) -> DiscoveryResult<Option<WorkflowErrorEvent>> {
        Self::read(&self.dead_letters, &id.as_uuid().simple().to_string()).await
    }

    async fn recent_dead_letters(
        &self,
        limit: usize,
    ) -> DiscoveryResult<Vec<WorkflowErrorEvent>> {
        let mut events: Vec<WorkflowErrorEvent> = Self::scan(&self.dead_letters, "").await?;
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }
}
