use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Raw shape of the local on-disk TOML config file (spec §4.8 layer 2).
/// Every field is optional: absence means "fall through to the next
/// layer", mirrored by `FileConfig::default()` covering the same shape as
/// the hardcoded defaults layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    pub node_id: Option<String>,
    pub control_api_port: Option<u16>,
    pub live_logs_port: Option<u16>,
    pub live_metrics_port: Option<u16>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,

    pub broker_url: Option<String>,
    pub backend_url: Option<String>,
    pub alert_ticket_url: Option<String>,
    pub heartbeat_url: Option<String>,
    pub backend_auth_token: Option<String>,

    pub spool_path: Option<String>,
    pub spool_max_size: Option<u64>,

    pub sampler_interval_secs: Option<u64>,
    pub publisher_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub http_request_timeout_secs: Option<u64>,
    pub retry_backoff_secs: Option<Vec<u64>>,

    pub keywords: Option<Vec<String>>,
    pub max_tailers: Option<usize>,

    pub monitored_files: Option<Vec<FileConfigEntry>>,
    pub alert_rules: Option<Vec<FileConfigAlertRule>>,

    pub suppression_rules_store_url: Option<String>,
    pub suppression_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfigEntry {
    pub id: String,
    pub path: String,
    pub label: Option<String>,
    pub priority: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfigAlertRule {
    pub key: String,
    pub threshold: f64,
    pub required_duration_secs: u64,
    pub cooldown_secs: u64,
    pub priority: String,
    pub message_template: String,
    pub recommended_actions: Option<String>,
}

fn default_true() -> bool {
    true
}

impl FileConfig {
    pub fn from_toml_str(contents: &str, path: &str) -> ConfigResult<Self> {
        toml::from_str(contents).map_err(|source| ConfigError::ParseToml { path: path.to_string(), source })
    }

    pub async fn load(path: &Path) -> ConfigResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Self::from_toml_str(&contents, &path.display().to_string()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::ReadFile { path: path.display().to_string(), source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_none() {
        let cfg = FileConfig::from_toml_str("log_level = \"info\"", "test.toml").unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
        assert!(cfg.broker_url.is_none());
    }

    #[test]
    fn monitored_file_entry_enabled_defaults_true() {
        let toml_str = r#"
            [[monitored_files]]
            id = "a"
            path = "/var/log/a.log"
            priority = "high"
        "#;
        let cfg = FileConfig::from_toml_str(toml_str, "test.toml").unwrap();
        let entries = cfg.monitored_files.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].enabled);
    }
}
