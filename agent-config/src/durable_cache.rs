use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::sources::file_config::FileConfig;

/// Mirrors the last successful backend fetch to disk so that a restart
/// with the backend unreachable can still start with the most recent
/// per-node configuration (spec §4.8 "Durable cache", §6 "Config durable
/// cache: JSON mirror of last successful backend fetch").
pub async fn write(path: &Path, config: &FileConfig) -> ConfigResult<()> {
    let body = serde_json::to_string_pretty(config).map_err(|e| ConfigError::CacheWrite(e.to_string()))?;
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    tokio::fs::write(path, body).await.map_err(|e| ConfigError::CacheWrite(e.to_string()))
}

pub async fn read(path: &Path) -> ConfigResult<Option<FileConfig>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents).map(Some).map_err(|e| ConfigError::CacheRead(e.to_string())),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::CacheRead(source.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backend_cache.json");
        let mut cfg = FileConfig::default();
        cfg.log_level = Some("debug".to_string());
        write(&path, &cfg).await.unwrap();
        let read_back = read(&path).await.unwrap().unwrap();
        assert_eq!(read_back.log_level.as_deref(), Some("debug"));
    }

    #[tokio::test]
    async fn missing_cache_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read(&path).await.unwrap().is_none());
    }
}
