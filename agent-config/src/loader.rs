use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use agent_model::prelude::{AlertRule, MonitoredFileSpec, Priority};

use crate::defaults;
use crate::snapshot::{ConfigSnapshot, HotConfig, StaticConfig};
use crate::sources::{EnvConfig, FileConfig};

/// Builds a [`ConfigSnapshot`] by deep-merging, in increasing precedence
/// (spec §4.8): hardcoded defaults → local file (with environment
/// variables treated as part of the same "local" layer, env overriding
/// file) → backend-fetched config → runtime overrides (applied later, by
/// [`crate::store::ConfigStore::apply_overrides`]).
pub fn merge(file: &FileConfig, env: &EnvConfig, backend: Option<&FileConfig>, node_id: String, version: u64) -> ConfigSnapshot {
    macro_rules! pick {
        ($field:ident) => {
            backend
                .and_then(|b| b.$field.clone())
                .or_else(|| env.$field.clone())
                .or_else(|| file.$field.clone())
        };
    }

    let log_level = pick!(log_level).unwrap_or_else(|| defaults::LOG_LEVEL.to_string());
    let keywords = pick!(keywords).unwrap_or_else(|| defaults::KEYWORDS.iter().map(|s| s.to_string()).collect());
    let max_tailers = backend.and_then(|b| b.max_tailers).or(env.max_tailers).or(file.max_tailers).unwrap_or(defaults::MAX_TAILERS);
    let suppression_ttl_secs = backend.and_then(|b| b.suppression_ttl_secs).or(env.suppression_ttl_secs).or(file.suppression_ttl_secs).unwrap_or(defaults::SUPPRESSION_TTL_SECS);

    let monitored_files = backend
        .and_then(|b| b.monitored_files.clone())
        .or_else(|| file.monitored_files.clone())
        .unwrap_or_default()
        .into_iter()
        .map(|entry| {
            let priority = Priority::from_str(&entry.priority).unwrap_or(Priority::Medium);
            MonitoredFileSpec::new(entry.id, PathBuf::from(entry.path), entry.label, priority, entry.enabled)
        })
        .collect();

    let alert_rules: HashMap<String, AlertRule> = backend
        .and_then(|b| b.alert_rules.clone())
        .or_else(|| file.alert_rules.clone())
        .unwrap_or_default()
        .into_iter()
        .map(|r| {
            let priority = Priority::from_str(&r.priority).unwrap_or(Priority::Medium);
            (
                r.key.clone(),
                AlertRule {
                    key: r.key,
                    threshold: r.threshold,
                    required_duration_secs: r.required_duration_secs,
                    cooldown_secs: r.cooldown_secs,
                    priority,
                    message_template: r.message_template,
                    recommended_actions: r.recommended_actions,
                },
            )
        })
        .collect();

    let static_config = StaticConfig {
        node_id,
        control_api_port: pick!(control_api_port).unwrap_or(defaults::CONTROL_API_PORT),
        live_logs_port: pick!(live_logs_port).unwrap_or(defaults::LIVE_LOGS_PORT),
        live_metrics_port: pick!(live_metrics_port).unwrap_or(defaults::LIVE_METRICS_PORT),
        broker_url: pick!(broker_url).unwrap_or_default(),
        backend_url: pick!(backend_url).unwrap_or_default(),
        alert_ticket_url: pick!(alert_ticket_url).unwrap_or_default(),
        heartbeat_url: pick!(heartbeat_url).unwrap_or_default(),
        backend_auth_token: pick!(backend_auth_token),
        spool_path: pick!(spool_path).unwrap_or_else(|| "/var/lib/agentd/spool.sqlite3".to_string()),
        suppression_rules_store_url: pick!(suppression_rules_store_url).unwrap_or_default(),
        log_file: pick!(log_file),
        sampler_interval_secs: pick!(sampler_interval_secs).unwrap_or(defaults::SAMPLER_INTERVAL_SECS),
        publisher_interval_secs: pick!(publisher_interval_secs).unwrap_or(defaults::PUBLISHER_INTERVAL_SECS),
        heartbeat_interval_secs: pick!(heartbeat_interval_secs).unwrap_or(defaults::HEARTBEAT_INTERVAL_SECS),
        http_request_timeout_secs: pick!(http_request_timeout_secs).unwrap_or(defaults::HTTP_REQUEST_TIMEOUT_SECS),
        retry_backoff_secs: pick!(retry_backoff_secs).unwrap_or_else(|| defaults::RETRY_BACKOFF_SECS.to_vec()),
        spool_max_size: pick!(spool_max_size).unwrap_or(defaults::SPOOL_MAX_SIZE),
    };

    ConfigSnapshot {
        version,
        static_config,
        hot: HotConfig { log_level, keywords, max_tailers, suppression_ttl_secs, monitored_files, alert_rules },
    }
}

/// First of [`defaults::DEFAULT_CONFIG_LOCATIONS`] that exists, else the
/// first entry (so a fresh install gets a sensible "file not found, using
/// defaults" log line pointing at a real path).
pub fn default_config_path() -> PathBuf {
    for candidate in defaults::DEFAULT_CONFIG_LOCATIONS {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return path;
        }
    }
    PathBuf::from(defaults::DEFAULT_CONFIG_LOCATIONS[0])
}

pub fn is_restart_required(old: &StaticConfig, new: &StaticConfig) -> bool {
    old.control_api_port != new.control_api_port || old.live_logs_port != new.live_logs_port || old.live_metrics_port != new.live_metrics_port || old.broker_url != new.broker_url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_when_every_layer_is_silent() {
        let snapshot = merge(&FileConfig::default(), &EnvConfig::default(), None, "node-1".to_string(), 1);
        assert_eq!(snapshot.static_config.control_api_port, defaults::CONTROL_API_PORT);
        assert_eq!(snapshot.hot.max_tailers, defaults::MAX_TAILERS);
        assert_eq!(snapshot.hot.log_level, defaults::LOG_LEVEL);
    }

    #[test]
    fn backend_outranks_env_outranks_file() {
        let mut file = FileConfig::default();
        file.log_level = Some("warn".to_string());
        let mut env = EnvConfig::default();
        env.log_level = Some("debug".to_string());
        let mut backend = FileConfig::default();
        backend.log_level = Some("trace".to_string());

        let snapshot = merge(&file, &env, Some(&backend), "node-1".to_string(), 1);
        assert_eq!(snapshot.hot.log_level, "trace");

        let snapshot_no_backend = merge(&file, &env, None, "node-1".to_string(), 1);
        assert_eq!(snapshot_no_backend.hot.log_level, "debug");
    }

    #[test]
    fn restart_required_only_for_static_fields() {
        let base = merge(&FileConfig::default(), &EnvConfig::default(), None, "node-1".to_string(), 1).static_config;
        let mut changed_port = base.clone();
        changed_port.control_api_port += 1;
        assert!(is_restart_required(&base, &changed_port));

        let mut changed_token = base.clone();
        changed_token.backend_auth_token = Some("x".to_string());
        assert!(!is_restart_required(&base, &changed_token));
    }
}
