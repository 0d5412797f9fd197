//! `agentd`: per-host monitoring agent daemon.
//!
//! Boots the Config Store, wires every C1-C12 component, then runs three
//! axum listeners (Control API, live logs, live metrics) alongside the
//! Supervisor's background workers until SIGINT/SIGTERM, at which point a
//! single [`tokio_util::sync::CancellationToken`] unwinds everything within
//! a 10 s budget (spec §4.11, §7 "Graceful shutdown").

mod broadcast;
mod control_api;
mod errors;
mod heartbeat;
mod metrics_counters;
mod processes;
mod state;
mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use agent_config::{ConfigPaths, ConfigStore};
use agent_core::prelude::{AlertEngine, KeywordMatcher, NatsBrokerPublisher, NullBrokerPublisher, PostgresRulesStore, RulesStore, SuppressionCache, TelemetryPublisher, TelemetryPublisherConfig, TelemetrySpool};
use anyhow::Context;
use axum::Router;
use clap::Parser;
use tokio::sync::broadcast as tokio_broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter};

use crate::metrics_counters::{AgentMetrics, BroadcastingBrokerPublisher};
use crate::processes::ProcessRegistry;
use crate::state::{AppState, BroadcasterControl};
use crate::supervisor::{LogFilterReload, Supervisor};

/// Name reported in outbound wire payloads as `application` (spec §6);
/// distinct from the crate/package name, which is `agent-server`.
const APPLICATION_NAME: &str = "agentd";

#[derive(Parser, Debug)]
#[command(name = "agentd")]
#[command(about = "Per-host monitoring agent: tails logs, samples metrics, evaluates alerts")]
struct Args {
    /// Directory holding the local config file, secrets file, and durable caches.
    #[arg(long, env = "AGENTD_CONFIG_DIR", default_value = "/etc/agentd")]
    config_dir: PathBuf,

    /// Path to the local TOML config file, relative to nothing in particular.
    #[arg(long, env = "AGENTD_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Backend base URL used to fetch the per-node config layer at startup.
    #[arg(long, env = "AGENTD_BACKEND_URL")]
    backend_url: Option<String>,
}

struct ReloadHandle(reload::Handle<EnvFilter, tracing_subscriber::Registry>);

impl LogFilterReload for ReloadHandle {
    fn set_level(&self, level: &str) {
        let Ok(filter) = EnvFilter::try_new(level) else {
            tracing::warn!(level, "invalid log level in config, keeping current filter");
            return;
        };
        if let Err(e) = self.0.reload(filter) {
            tracing::warn!(error = %e, "failed to reload log filter");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _ = dotenvy::dotenv();

    let initial_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(agent_config::defaults::LOG_LEVEL));
    let (filter_layer, reload_handle) = reload::Layer::new(initial_filter);
    tracing_subscriber::registry().with(filter_layer).with(tracing_subscriber::fmt::layer()).init();

    let config_file_path = args.config_file.unwrap_or_else(agent_config::loader::default_config_path);
    let paths = ConfigPaths::new(args.config_dir, config_file_path);
    let config = Arc::new(ConfigStore::bootstrap(paths, args.backend_url).await.context("failed to bootstrap config store")?);

    let snapshot = config.snapshot();
    info!(node_id = %snapshot.static_config.node_id, version = snapshot.version, "agentd starting");

    let spool = Arc::new(TelemetrySpool::open(&snapshot.static_config.spool_path, snapshot.static_config.spool_max_size).await.context("failed to open telemetry spool")?);

    let suppression_store: Arc<dyn RulesStore> = if snapshot.static_config.suppression_rules_store_url.is_empty() {
        Arc::new(NoRulesConfigured)
    } else {
        match PostgresRulesStore::connect(&snapshot.static_config.suppression_rules_store_url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "suppression rules store unreachable at startup, starting with an empty cache");
                Arc::new(NoRulesConfigured)
            }
        }
    };
    let suppression = Arc::new(SuppressionCache::new(suppression_store, std::time::Duration::from_secs(snapshot.hot.suppression_ttl_secs)));

    let metrics = Arc::new(AgentMetrics::default());
    let alert_engine = Arc::new(AlertEngine::new(snapshot.hot.alert_rules.clone(), snapshot.static_config.alert_ticket_url.clone(), APPLICATION_NAME.to_string(), metrics.clone()));
    let keywords = Arc::new(KeywordMatcher::new(&snapshot.hot.keywords));

    let (live_logs_tx, _) = tokio_broadcast::channel(1024);
    let (live_metrics_tx, _) = tokio_broadcast::channel(256);

    let raw_publisher = if snapshot.static_config.broker_url.is_empty() {
        tracing::warn!("no broker_url configured, error events will be dropped at publish time");
        agent_core::broker::shared(NullBrokerPublisher)
    } else {
        agent_core::broker::shared(NatsBrokerPublisher::new(snapshot.static_config.broker_url.clone(), "agentd.events".to_string()))
    };
    let broadcasting_publisher = Arc::new(BroadcastingBrokerPublisher::new(raw_publisher, live_logs_tx.clone(), metrics.clone()));

    let telemetry_publisher_config = TelemetryPublisherConfig {
        interval: std::time::Duration::from_secs(snapshot.static_config.publisher_interval_secs),
        backoff: snapshot.static_config.retry_backoff_secs.iter().map(|s| std::time::Duration::from_secs(*s)).collect(),
        request_timeout: std::time::Duration::from_secs(snapshot.static_config.http_request_timeout_secs),
        ..TelemetryPublisherConfig::from_defaults(snapshot.static_config.backend_url.clone(), config.secret("backend_auth_token"))
    };
    let telemetry_publisher = Arc::new(TelemetryPublisher::new(spool.clone(), telemetry_publisher_config, snapshot.static_config.node_id.clone()));

    let processes = Arc::new(ProcessRegistry::new());

    let state = AppState {
        node_id: snapshot.static_config.node_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
        config: config.clone(),
        spool: spool.clone(),
        suppression: suppression.clone(),
        alert_engine: alert_engine.clone(),
        processes: processes.clone(),
        live_logs_tx,
        live_metrics_tx,
        broadcaster_control: Arc::new(BroadcasterControl::new()),
        metrics: metrics.clone(),
    };

    let log_filter: Arc<dyn LogFilterReload> = Arc::new(ReloadHandle(reload_handle));
    let supervisor = Arc::new(Supervisor::new(state.clone(), keywords, broadcasting_publisher, telemetry_publisher, log_filter, APPLICATION_NAME.to_string()));

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(cancel.clone()));

    let control_api_port = snapshot.static_config.control_api_port;
    let live_logs_port = snapshot.static_config.live_logs_port;
    let live_metrics_port = snapshot.static_config.live_metrics_port;

    let control_router = control_api::router().with_state(state.clone());
    let live_logs_router = Router::new().route("/ws/logs", axum::routing::get(broadcast::live_logs_handler)).with_state(state.clone());
    let live_metrics_router = Router::new().route("/ws/metrics", axum::routing::get(broadcast::live_metrics_handler)).with_state(state.clone());

    let supervisor_for_run = supervisor.clone();
    let supervisor_cancel = cancel.clone();
    let supervisor_task = tokio::spawn(async move { supervisor_for_run.run(supervisor_cancel).await });

    let servers = tokio::try_join!(
        serve(control_router, control_api_port, "control api", cancel.clone()),
        serve(live_logs_router, live_logs_port, "live logs", cancel.clone()),
        serve(live_metrics_router, live_metrics_port, "live metrics", cancel.clone()),
    );

    if let Err(e) = servers {
        error!(error = %e, "an axum listener failed, initiating shutdown");
        cancel.cancel();
    }

    let shutdown_budget = std::time::Duration::from_secs(agent_config::defaults::GRACEFUL_SHUTDOWN_WINDOW_SECS);
    if tokio::time::timeout(shutdown_budget, supervisor_task).await.is_err() {
        tracing::warn!("graceful shutdown budget exceeded, exiting anyway");
    }

    info!("agentd stopped");
    Ok(())
}

async fn serve(router: Router, port: u16, name: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {name} listener on {addr}"))?;
    info!(addr, "{name} listener bound");
    axum::serve(listener, router).with_graceful_shutdown(async move { cancel.cancelled().await }).await.with_context(|| format!("{name} listener failed"))
}

async fn wait_for_shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    cancel.cancel();
}

/// No-op suppression store used when no `suppression_rules_store_url` is
/// configured, so the cache still functions (always returning no rules)
/// rather than requiring a database for every deployment.
struct NoRulesConfigured;

#[async_trait::async_trait]
impl RulesStore for NoRulesConfigured {
    async fn fetch_all(&self) -> Result<Vec<agent_model::prelude::SuppressionRule>, agent_core::prelude::SuppressionError> {
        Ok(Vec::new())
    }

    async fn record_matches(&self, _matches: &[(String, chrono::DateTime<chrono::Utc>)]) {}
}
