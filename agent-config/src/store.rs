use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use agent_model::prelude::{ConfigValue, MonitoredFileSpec};
use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::BackendConfigClient;
use crate::durable_cache;
use crate::error::{ConfigError, ConfigResult};
use crate::loader;
use crate::node_id::resolve_node_id;
use crate::overrides::apply_override;
use crate::secrets::{default_secrets_path, SecretsFile};
use crate::snapshot::ConfigSnapshot;
use crate::sources::{EnvConfig, FileConfig};

/// Where the store keeps its on-disk companions, relative to a single
/// config directory (spec §6 "Persisted local state").
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub file_config_path: PathBuf,
    pub secrets_path: PathBuf,
    pub backend_cache_path: PathBuf,
    pub node_id_cache_path: PathBuf,
}

impl ConfigPaths {
    pub fn new(config_dir: impl Into<PathBuf>, file_config_path: PathBuf) -> Self {
        let config_dir = config_dir.into();
        Self {
            secrets_path: default_secrets_path(&config_dir),
            backend_cache_path: config_dir.join("backend_config_cache.json"),
            node_id_cache_path: config_dir.join("node_id"),
            file_config_path,
            config_dir,
        }
    }
}

/// The runtime configuration store (spec §4.8, C2). Holds the effective
/// [`ConfigSnapshot`] behind an atomic pointer swap so readers never
/// observe a partially merged snapshot (P7).
#[derive(Debug)]
pub struct ConfigStore {
    paths: ConfigPaths,
    snapshot: ArcSwap<ConfigSnapshot>,
    secrets: ArcSwap<SecretsFile>,
    backend: Option<BackendConfigClient>,
    version: std::sync::atomic::AtomicU64,
    changed_tx: watch::Sender<u64>,
}

impl ConfigStore {
    /// Startup order per spec §4.8/§4.11: load local file + env, resolve
    /// node id, attempt a backend fetch (falling back to the durable
    /// cache, logging a warning, on failure), merge, and publish the
    /// first snapshot.
    pub async fn bootstrap(paths: ConfigPaths, backend_base_url: Option<String>) -> ConfigResult<Self> {
        let file = FileConfig::load(&paths.file_config_path).await?;
        let env = EnvConfig::gather();
        let node_id = resolve_node_id(&paths.node_id_cache_path).await;
        let secrets = SecretsFile::load(&paths.secrets_path).await?;

        let backend_client = backend_base_url.or_else(|| file.backend_url.clone()).filter(|u| !u.is_empty()).map(BackendConfigClient::new);

        let backend_layer = match &backend_client {
            Some(client) => match client.fetch(&node_id).await {
                Ok(cfg) => {
                    if let Err(e) = durable_cache::write(&paths.backend_cache_path, &cfg).await {
                        warn!(error = %e, "failed to persist backend config to durable cache");
                    }
                    Some(cfg)
                }
                Err(e) => {
                    warn!(error = %e, "backend config fetch failed at startup, falling back to durable cache");
                    durable_cache::read(&paths.backend_cache_path).await?
                }
            },
            None => None,
        };

        let snapshot = loader::merge(&file, &env, backend_layer.as_ref(), node_id, 1);
        if snapshot.exceeds_tailer_limit() {
            return Err(ConfigError::TooManyTailers { requested: snapshot.enabled_file_count(), max: snapshot.hot.max_tailers });
        }

        let (changed_tx, _rx) = watch::channel(snapshot.version);
        info!(node_id = %snapshot.static_config.node_id, version = snapshot.version, "config store bootstrapped");

        Ok(Self {
            paths,
            snapshot: ArcSwap::from_pointee(snapshot),
            secrets: ArcSwap::from_pointee(secrets),
            backend: backend_client,
            version: std::sync::atomic::AtomicU64::new(1),
            changed_tx,
        })
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }

    /// Subscribers observe the new version number whenever
    /// [`ConfigStore::snapshot`]'s pointee changes; they re-read
    /// `snapshot()` rather than relying on the version's contents.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changed_tx.subscribe()
    }

    pub fn secret(&self, key: &str) -> Option<String> {
        self.secrets.load().get(key).map(String::from)
    }

    /// Dotted-path retrieval against the current snapshot (spec §4.8).
    /// Only a fixed set of top-level paths is recognised; unknown paths
    /// return `None` rather than attempting reflection.
    pub fn get_path(&self, dotted: &str) -> Option<ConfigValue> {
        let snapshot = self.snapshot();
        match dotted {
            "log.level" => Some(ConfigValue::String(snapshot.hot.log_level.clone())),
            "tailer.keywords" => Some(ConfigValue::StringList(snapshot.hot.keywords.clone())),
            "tailer.max_tailers" => Some(ConfigValue::Integer(snapshot.hot.max_tailers as i64)),
            "suppression.ttl_secs" => Some(ConfigValue::Integer(snapshot.hot.suppression_ttl_secs as i64)),
            "server.control_api_port" => Some(ConfigValue::Integer(snapshot.static_config.control_api_port as i64)),
            "server.live_logs_port" => Some(ConfigValue::Integer(snapshot.static_config.live_logs_port as i64)),
            "server.live_metrics_port" => Some(ConfigValue::Integer(snapshot.static_config.live_metrics_port as i64)),
            "broker.url" => Some(ConfigValue::String(snapshot.static_config.broker_url.clone())),
            _ => None,
        }
    }

    /// Applies runtime overrides from the Control API (spec §4.8 layer 4,
    /// §4.10). Validates every path against the schema before mutating
    /// anything: on any single invalid entry the whole batch is rejected
    /// and the previous snapshot remains in force.
    pub fn apply_overrides(&self, overrides: &HashMap<String, ConfigValue>) -> ConfigResult<Vec<String>> {
        let current = self.snapshot();
        let mut next = (*current).clone();
        let mut changed = Vec::new();
        for (path, value) in overrides {
            apply_override(&mut next, path, value)?;
            changed.push(path.clone());
        }
        next.version = self.version.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        self.publish(next);
        Ok(changed)
    }

    /// Forces a backend refresh (spec §6 `POST /api/config/reload`).
    pub async fn reload_from_backend(&self) -> ConfigResult<Vec<String>> {
        let Some(client) = &self.backend else {
            return Ok(Vec::new());
        };
        let current = self.snapshot();
        let fetched = client.fetch(&current.static_config.node_id).await?;
        durable_cache::write(&self.paths.backend_cache_path, &fetched).await?;

        let file = FileConfig::load(&self.paths.file_config_path).await?;
        let env = EnvConfig::gather();
        let mut next = loader::merge(&file, &env, Some(&fetched), current.static_config.node_id.clone(), current.version);
        next.version = self.version.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if next.exceeds_tailer_limit() {
            return Err(ConfigError::TooManyTailers { requested: next.enabled_file_count(), max: next.hot.max_tailers });
        }
        let restart_needed = loader::is_restart_required(&current.static_config, &next.static_config);
        if restart_needed {
            warn!("backend config reload changed a restart-only field; it will not take effect until the process restarts");
        }
        self.publish(next);
        Ok(vec!["reloaded".to_string()])
    }

    /// Replaces the monitored-file list wholesale (spec §6
    /// `/api/monitored-files` CRUD). The dotted-path override mechanism in
    /// [`ConfigStore::apply_overrides`] only carries scalar
    /// [`ConfigValue`]s, so file-list mutation gets its own entry point
    /// following the same clone-validate-publish shape.
    pub fn set_monitored_files(&self, files: Vec<MonitoredFileSpec>) -> ConfigResult<()> {
        let current = self.snapshot();
        let mut next = (*current).clone();
        next.hot.monitored_files = files;
        if next.exceeds_tailer_limit() {
            return Err(ConfigError::TooManyTailers { requested: next.enabled_file_count(), max: next.hot.max_tailers });
        }
        next.version = self.version.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        self.publish(next);
        Ok(())
    }

    fn publish(&self, next: ConfigSnapshot) {
        let version = next.version;
        self.snapshot.store(Arc::new(next));
        let _ = self.changed_tx.send(version);
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store_in(dir: &std::path::Path) -> ConfigStore {
        let paths = ConfigPaths::new(dir.to_path_buf(), dir.join("agentd.toml"));
        ConfigStore::bootstrap(paths, None).await.unwrap()
    }

    #[tokio::test]
    async fn bootstrap_without_any_files_uses_defaults() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path()).await;
        assert_eq!(store.snapshot().static_config.control_api_port, crate::defaults::CONTROL_API_PORT);
    }

    #[tokio::test]
    async fn overrides_apply_atomically_and_bump_version() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let before = store.snapshot().version;
        let mut overrides = HashMap::new();
        overrides.insert("log.level".to_string(), ConfigValue::String("debug".to_string()));
        store.apply_overrides(&overrides).unwrap();
        let after = store.snapshot();
        assert_eq!(after.hot.log_level, "debug");
        assert!(after.version > before);
    }

    #[tokio::test]
    async fn monitored_files_over_limit_is_rejected_and_snapshot_unchanged() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let before = store.snapshot();
        let max = before.hot.max_tailers;
        let too_many: Vec<_> = (0..=max)
            .map(|i| agent_model::prelude::MonitoredFileSpec::new(format!("f{i}"), PathBuf::from(format!("/tmp/f{i}.log")), None, agent_model::prelude::Priority::Low, true))
            .collect();
        let result = store.set_monitored_files(too_many);
        assert!(result.is_err());
        assert_eq!(store.snapshot().version, before.version);
    }

    #[tokio::test]
    async fn invalid_override_path_is_rejected_and_snapshot_unchanged() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let before = store.snapshot();
        let mut overrides = HashMap::new();
        overrides.insert("nonsense.path".to_string(), ConfigValue::Bool(true));
        let result = store.apply_overrides(&overrides);
        assert!(result.is_err());
        assert_eq!(store.snapshot().version, before.version);
    }
}
