// Copyright 2025 Cowboy AI, LLC.

//! Operational CLI for the discovery core
//!
//! `serve` runs the full pipeline (ingress + consumer groups); the other
//! subcommands are one-shot operator actions against the same NATS-backed
//! state.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cim_discovery::adapters::{
    AiAnswerAdapter, AiAnswerConfig, GuardedAdapter, KeywordApiAdapter, KeywordApiConfig,
    MetaSearchAdapter, MetaSearchConfig, SearchAdapter, UsageRateLimiter,
};
use cim_discovery::bus::{
    spawn_consumer_group, JetStreamEventBus, NatsClient, SEARCH_REQUESTS, SEARCH_RESULTS_RAW,
    SEARCH_RESULTS_VALIDATED,
};
use cim_discovery::cache::BlacklistCache;
use cim_discovery::config::{DiscoveryConfig, EngineSettings};
use cim_discovery::domain::{EngineKind, ScheduleDay, SearchCriteria, SessionType};
use cim_discovery::generator::{LlmBackend, QueryGenerator};
use cim_discovery::orchestrator::{
    DiscoveryOrchestrator, OrchestratorConfig, ScoringWorker, SearchWorker, ValidationWorker,
};
use cim_discovery::pipeline::{PipelineConfig, ResultPipeline};
use cim_discovery::store::{NatsKvStore, StoreHandles};
use cim_discovery::{ErrorId, EventPublisher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Subject carrying blacklist-cache invalidations to running processes
const CACHE_INVALIDATE_SUBJECT: &str = "discovery.cache.invalidate";

#[derive(Parser)]
#[command(name = "discovery", about = "Funding-discovery pipeline operations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingress API and all consumer groups
    Serve,
    /// Trigger a manual session with canned (or file-provided) criteria
    Execute {
        /// JSON file with a SearchCriteria payload
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List recent sessions with their statistics
    Sessions {
        /// How many sessions to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Invalidate the blacklist cache in running processes
    InvalidateCache {
        /// Host to invalidate; omit to clear everything
        #[arg(long)]
        host: Option<String>,
    },
    /// Replay a dead-letter event onto its stage's topic
    Replay {
        /// The error id from the dead-letter record
        error_id: String,
    },
    /// Run the saved-query library for a day (default: today)
    Scheduled {
        /// Day name, e.g. "monday"
        #[arg(long)]
        day: Option<String>,
    },
}

struct Runtime {
    client: NatsClient,
    stores: StoreHandles,
    bus: Arc<JetStreamEventBus>,
    orchestrator: Arc<DiscoveryOrchestrator>,
    blacklist: Arc<BlacklistCache>,
    adapters: HashMap<EngineKind, Arc<dyn SearchAdapter>>,
    pipeline: Arc<ResultPipeline>,
    config: DiscoveryConfig,
}

fn build_adapter(
    settings: &EngineSettings,
    config: &DiscoveryConfig,
    limiter: Arc<UsageRateLimiter>,
) -> Arc<dyn SearchAdapter> {
    let breaker = config.breaker.clone();
    let retry = settings.retry_policy();
    match settings.engine {
        EngineKind::Websearch => Arc::new(GuardedAdapter::new(
            KeywordApiAdapter::new(KeywordApiConfig {
                timeout: settings.timeout,
                ..KeywordApiConfig::websearch(&settings.base_url, &settings.api_key)
            }),
            breaker,
            limiter,
            settings.rate_limit,
            retry,
            settings.timeout,
        )),
        EngineKind::GoogleProxy => Arc::new(GuardedAdapter::new(
            KeywordApiAdapter::new(KeywordApiConfig {
                timeout: settings.timeout,
                ..KeywordApiConfig::google_proxy(&settings.base_url, &settings.api_key)
            }),
            breaker,
            limiter,
            settings.rate_limit,
            retry,
            settings.timeout,
        )),
        EngineKind::MetaSearch => Arc::new(GuardedAdapter::new(
            MetaSearchAdapter::new(MetaSearchConfig {
                timeout: settings.timeout,
                ..MetaSearchConfig::new(&settings.base_url)
            }),
            breaker,
            limiter,
            settings.rate_limit,
            retry,
            settings.timeout,
        )),
        EngineKind::AiAnswer => Arc::new(GuardedAdapter::new(
            AiAnswerAdapter::new(AiAnswerConfig {
                timeout: settings.timeout,
                ..AiAnswerConfig::new(&settings.base_url, &settings.api_key)
            }),
            breaker,
            limiter,
            settings.rate_limit,
            retry,
            settings.timeout,
        )),
    }
}

async fn build_runtime(config: DiscoveryConfig) -> Result<Runtime> {
    let client = NatsClient::connect(config.nats.clone())
        .await
        .context("connecting to NATS")?;

    let store = Arc::new(
        NatsKvStore::new(client.client().clone(), config.store.clone())
            .await
            .context("creating KV buckets")?,
    );
    let stores = StoreHandles::from_store(store);

    let bus = Arc::new(JetStreamEventBus::new(
        client.jetstream().clone(),
        config.partitions,
    ));
    bus.ensure_streams().await.context("ensuring streams")?;

    let blacklist = Arc::new(BlacklistCache::new(
        stores.domains.clone(),
        config.cache.clone(),
    ));

    let limiter = Arc::new(UsageRateLimiter::new(stores.usage.clone()));
    let mut adapters: HashMap<EngineKind, Arc<dyn SearchAdapter>> = HashMap::new();
    for settings in config.enabled_engines() {
        adapters.insert(
            settings.engine,
            build_adapter(settings, &config, limiter.clone()),
        );
    }
    if adapters.is_empty() {
        warn!("no engines enabled; set DISCOVERY_<ENGINE>_ENABLED=true");
    }

    let generator = Arc::new(QueryGenerator::new(
        Arc::new(LlmBackend::new(config.llm.clone())),
        stores.generations.clone(),
    ));

    let pipeline = Arc::new(ResultPipeline::new(
        stores.domains.clone(),
        stores.candidates.clone(),
        stores.judgments.clone(),
        blacklist.clone(),
        PipelineConfig {
            threshold: config.threshold,
            spam_policy: config.spam_policy,
        },
    ));

    let orchestrator = Arc::new(DiscoveryOrchestrator::new(
        stores.clone(),
        bus.clone(),
        generator,
        adapters.clone(),
        blacklist.clone(),
        OrchestratorConfig {
            queries_per_engine: config.queries_per_engine,
            session_deadline: config.session_deadline,
        },
    ));

    Ok(Runtime {
        client,
        stores,
        bus,
        orchestrator,
        blacklist,
        adapters,
        pipeline,
        config,
    })
}

async fn serve(runtime: Runtime) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let js = runtime.client.jetstream().clone();
    let bus: Arc<dyn EventPublisher> = runtime.bus.clone();

    let search_worker = Arc::new(SearchWorker::new(
        runtime.stores.clone(),
        bus.clone(),
        runtime.adapters.clone(),
    ));
    let validation_worker = Arc::new(ValidationWorker::new(
        runtime.stores.clone(),
        bus.clone(),
        runtime.blacklist.clone(),
    ));
    let scoring_worker = Arc::new(ScoringWorker::new(
        runtime.stores.clone(),
        runtime.pipeline.clone(),
    ));

    let mut handles = Vec::new();
    handles.extend(
        spawn_consumer_group::<cim_discovery::SearchRequestEvent, _>(
            &js,
            &SEARCH_REQUESTS,
            "search-workers",
            runtime.config.partitions,
            search_worker,
            bus.clone(),
            runtime.stores.dead_letters.clone(),
            shutdown_rx.clone(),
        )
        .await?,
    );
    handles.extend(
        spawn_consumer_group::<cim_discovery::SearchResultEvent, _>(
            &js,
            &SEARCH_RESULTS_RAW,
            "validation-workers",
            runtime.config.partitions,
            validation_worker,
            bus.clone(),
            runtime.stores.dead_letters.clone(),
            shutdown_rx.clone(),
        )
        .await?,
    );
    handles.extend(
        spawn_consumer_group::<cim_discovery::ValidatedResultEvent, _>(
            &js,
            &SEARCH_RESULTS_VALIDATED,
            "scoring-workers",
            runtime.config.partitions,
            scoring_worker,
            bus.clone(),
            runtime.stores.dead_letters.clone(),
            shutdown_rx.clone(),
        )
        .await?,
    );

    // Blacklist-cache invalidations broadcast over core NATS so every
    // process's local cache hears about them.
    {
        let blacklist = runtime.blacklist.clone();
        let mut subscription = runtime
            .client
            .client()
            .subscribe(CACHE_INVALIDATE_SUBJECT)
            .await
            .context("subscribing to cache invalidations")?;
        tokio::spawn(async move {
            use futures::StreamExt;
            while let Some(message) = subscription.next().await {
                let host = String::from_utf8_lossy(&message.payload).to_string();
                if host == "*" || host.is_empty() {
                    blacklist.invalidate_all().await;
                } else {
                    blacklist.invalidate(&host).await;
                }
            }
        });
    }

    let state = cim_discovery::api::ApiState {
        orchestrator: runtime.orchestrator.clone(),
    };
    let router = cim_discovery::api::router(state);
    let listener = tokio::net::TcpListener::bind(&runtime.config.bind)
        .await
        .with_context(|| format!("binding {}", runtime.config.bind))?;
    info!(bind = %runtime.config.bind, "ingress listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = DiscoveryConfig::from_env()?;

    match cli.command {
        Command::Serve => {
            let runtime = build_runtime(config).await?;
            serve(runtime).await
        }
        Command::Execute { file } => {
            let criteria = match file {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str::<SearchCriteria>(&raw)?
                }
                None => SearchCriteria::canned(),
            };
            let runtime = build_runtime(config).await?;
            let initiated = runtime
                .orchestrator
                .execute_search(criteria, SessionType::Manual)
                .await?;
            println!(
                "session {} initiated: {} queries",
                initiated.session_id, initiated.queries_generated
            );
            Ok(())
        }
        Command::Sessions { limit } => {
            let runtime = build_runtime(config).await?;
            let sessions = runtime.stores.sessions.list_recent_sessions(limit).await?;
            for session in sessions {
                let stats = session.statistics;
                println!(
                    "{} {:?} {:?} results={} candidates={} dup={} spam={} blacklisted={}",
                    session.id,
                    session.session_type,
                    session.status,
                    stats.total_results_processed,
                    stats.candidates_created,
                    stats.duplicates_skipped,
                    stats.spam_tld_filtered,
                    stats.blacklisted_skipped,
                );
            }
            Ok(())
        }
        Command::InvalidateCache { host } => {
            let client = NatsClient::connect(config.nats.clone()).await?;
            let payload = host.unwrap_or_else(|| "*".to_string());
            client
                .client()
                .publish(CACHE_INVALIDATE_SUBJECT, payload.clone().into())
                .await
                .context("publishing invalidation")?;
            client.client().flush().await?;
            println!("blacklist cache invalidation sent for '{payload}'");
            Ok(())
        }
        Command::Replay { error_id } => {
            let id = ErrorId::parse(&error_id)
                .with_context(|| format!("'{error_id}' is not a valid error id"))?;
            let runtime = build_runtime(config).await?;
            let stage = runtime.orchestrator.replay_dead_letter(id).await?;
            println!("dead letter {error_id} replayed to stage {stage}");
            Ok(())
        }
        Command::Scheduled { day } => {
            let day = match day {
                Some(raw) => ScheduleDay::parse(&raw)
                    .with_context(|| format!("'{raw}' is not a day name"))?,
                None => ScheduleDay::of(chrono::Utc::now()),
            };
            let runtime = build_runtime(config).await?;
            let initiated = runtime.orchestrator.run_scheduled(day).await?;
            println!("{} scheduled sessions initiated", initiated.len());
            Ok(())
        }
    }
}
