//! Supervisor (C12, spec §4.11): boots every component in startup order,
//! owns the single process-wide [`CancellationToken`], diffs the
//! monitored-file list on every config change to start/stop Tailers, and
//! drives the heartbeat loop. Nothing here binds an HTTP listener — that
//! belongs to `main.rs`, which owns the three axum servers and hands this
//! struct their shared cancellation token.

use std::collections::HashMap;
use std::sync::Arc;

use agent_core::keywords::KeywordMatcher;
use agent_core::sampler::{MetricSampler, SamplerConfig};
use agent_core::tailer::{Tailer, TailerIntervals};
use agent_core::telemetry::TelemetryPublisher;
use agent_model::prelude::MonitoredFileSpec;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::heartbeat::Heartbeat;
use crate::metrics_counters::BroadcastingBrokerPublisher;
use crate::processes::ProcessRegistry;
use crate::state::AppState;

/// Applies a reloaded `log.level` to the running subscriber. `main.rs`
/// wires this from a `tracing_subscriber::reload::Handle`; tests and any
/// caller that does not care about live log-level changes can pass
/// [`NoopLogFilter`].
pub trait LogFilterReload: Send + Sync {
    fn set_level(&self, level: &str);
}

/// No-op [`LogFilterReload`] for callers (tests, `agentctl`) that never
/// wire a real subscriber reload handle.
#[derive(Debug, Default)]
pub struct NoopLogFilter;

impl LogFilterReload for NoopLogFilter {
    fn set_level(&self, _level: &str) {}
}

struct RunningTailer {
    spec: MonitoredFileSpec,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Composes and owns every long-running worker (spec §4.11 startup order:
/// Config Store → Spool → Broker/Telemetry Publisher → Alert Engine →
/// Sampler → one Tailer per enabled file → Control API).
pub struct Supervisor {
    state: AppState,
    keywords: Arc<KeywordMatcher>,
    publisher: Arc<BroadcastingBrokerPublisher>,
    telemetry_publisher: Arc<TelemetryPublisher>,
    log_filter: Arc<dyn LogFilterReload>,
    application: String,
    tailers: Mutex<HashMap<String, RunningTailer>>,
}

impl Supervisor {
    pub fn new(state: AppState, keywords: Arc<KeywordMatcher>, publisher: Arc<BroadcastingBrokerPublisher>, telemetry_publisher: Arc<TelemetryPublisher>, log_filter: Arc<dyn LogFilterReload>, application: String) -> Self {
        Self { state, keywords, publisher, telemetry_publisher, log_filter, application, tailers: Mutex::new(HashMap::new()) }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Runs every background worker until `cancel` fires, then waits (up
    /// to the spec's 10 s graceful-shutdown budget) for them to unwind.
    /// Does not return early: the Control API / WebSocket listeners are
    /// driven independently by `main.rs` against the same token.
    pub async fn run(&self, cancel: CancellationToken) {
        self.sync_tailers().await;

        let sampler_snapshot = self.state.config.snapshot();
        let mut sampler = MetricSampler::new(
            SamplerConfig { host_id: self.state.node_id.clone(), interval: std::time::Duration::from_secs(sampler_snapshot.static_config.sampler_interval_secs), ..SamplerConfig::default() },
            self.state.spool.clone(),
            self.state.live_metrics_tx.clone(),
            self.state.alert_engine.clone(),
            self.state.metrics.clone(),
        );

        let telemetry_publisher = self.telemetry_publisher.clone();
        let heartbeat = Heartbeat::new(
            sampler_snapshot.static_config.heartbeat_url.clone(),
            self.state.node_id.clone(),
            std::time::Duration::from_secs(sampler_snapshot.static_config.heartbeat_interval_secs),
            std::time::Duration::from_secs(sampler_snapshot.static_config.http_request_timeout_secs),
        );

        let sampler_cancel = cancel.clone();
        let sampler_task = tokio::spawn(async move { sampler.run(sampler_cancel).await });

        let publisher_cancel = cancel.clone();
        let publisher_task = tokio::spawn(async move { telemetry_publisher.run(publisher_cancel).await });

        let heartbeat_cancel = cancel.clone();
        let heartbeat_task = tokio::spawn(async move { heartbeat.run(heartbeat_cancel).await });

        let processes = self.state.processes.clone();
        let process_refresh_cancel = cancel.clone();
        let process_refresh_task = tokio::spawn(async move { run_process_refresh(processes, process_refresh_cancel).await });

        let config_watch_cancel = cancel.clone();
        let config_watch_task = {
            let mut rx = self.state.config.subscribe_changes();
            let watcher_self: &Supervisor = self;
            async move {
                loop {
                    tokio::select! {
                        _ = config_watch_cancel.cancelled() => return,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            watcher_self.on_config_changed().await;
                        }
                    }
                }
            }
        };

        tokio::select! {
            _ = sampler_task => {}
            _ = publisher_task => {}
            _ = heartbeat_task => {}
            _ = process_refresh_task => {}
            _ = config_watch_task => {}
        }

        self.shutdown_tailers().await;
    }

    /// Reacts to a new [`agent_config::ConfigSnapshot`] being published:
    /// rebuilds the keyword regex if it changed, reloads the log level,
    /// and diffs the monitored-file list (spec §4.8 "Hot reload").
    async fn on_config_changed(&self) {
        let snapshot = self.state.config.snapshot();
        self.keywords.rebuild(&snapshot.hot.keywords);
        self.log_filter.set_level(&snapshot.hot.log_level);
        self.sync_tailers().await;
    }

    /// Starts a Tailer for every newly-enabled file, cancels one for every
    /// removed or disabled file, and restarts (cancel + respawn) any whose
    /// path or label changed under an unchanged id (spec §4.8: "path/label
    /// changes are treated as remove+add").
    async fn sync_tailers(&self) {
        let snapshot = self.state.config.snapshot();
        let desired: HashMap<String, MonitoredFileSpec> = snapshot.hot.monitored_files.iter().filter(|f| f.enabled).map(|f| (f.id.clone(), f.clone())).collect();

        let mut running = self.tailers.lock().await;

        let stale_ids: Vec<String> = running.iter().filter(|(id, running)| desired.get(*id).is_none_or(|spec| spec != &running.spec)).map(|(id, _)| id.clone()).collect();
        for id in stale_ids {
            if let Some(stopped) = running.remove(&id) {
                stopped.cancel.cancel();
                let _ = stopped.handle.await;
                info!(file_id = %id, "tailer stopped");
            }
        }

        for (id, spec) in &desired {
            if running.contains_key(id) {
                continue;
            }
            let tailer_cancel = CancellationToken::new();
            let tailer = Tailer::new(spec.clone(), self.state.node_id.clone(), self.application.clone(), self.keywords.clone(), self.state.suppression.clone(), self.publisher.clone(), TailerIntervals::default(), self.state.metrics.clone());
            let run_cancel = tailer_cancel.clone();
            let handle = tokio::spawn(async move { tailer.run(run_cancel).await });
            info!(file_id = %id, path = %spec.path.display(), "tailer started");
            running.insert(id.clone(), RunningTailer { spec: spec.clone(), cancel: tailer_cancel, handle });
        }
    }

    async fn shutdown_tailers(&self) {
        let mut running = self.tailers.lock().await;
        for (_, tailer) in running.drain() {
            tailer.cancel.cancel();
        }
    }
}

async fn run_process_refresh(processes: Arc<ProcessRegistry>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(agent_config::defaults::SAMPLER_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                processes.refresh();
            }
        }
    }
}

/// Consults the fatal/non-fatal disposition table (spec §7, §9: "the
/// supervisor is the only site that decides whether a kind is fatal").
/// Only startup conditions reach this; every steady-state error is
/// recovered locally by its own component.
pub fn is_fatal_startup_error(err: &anyhow::Error) -> bool {
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        return matches!(io_err.kind(), std::io::ErrorKind::AddrInUse | std::io::ErrorKind::PermissionDenied);
    }
    err.downcast_ref::<agent_config::ConfigError>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_in_use_io_error_is_fatal() {
        let err = anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::AddrInUse));
        assert!(is_fatal_startup_error(&err));
    }

    #[test]
    fn generic_error_is_not_fatal() {
        let err = anyhow::anyhow!("transient network blip");
        assert!(!is_fatal_startup_error(&err));
    }

    #[test]
    fn noop_log_filter_accepts_any_level() {
        let filter = NoopLogFilter;
        filter.set_level("trace");
    }
}
