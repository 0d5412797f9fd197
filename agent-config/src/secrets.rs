use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Secrets live in a file separate from the main config, opened with
/// restricted permissions, and are never exposed through any getter the
/// Control API can reach (spec §4.8, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsFile {
    #[serde(flatten)]
    values: HashMap<String, String>,
}

impl SecretsFile {
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| ConfigError::ParseSecrets { path: path.display().to_string(), source }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::ReadFile { path: path.display().to_string(), source }),
        }
    }

    /// Writes the file with `0600` permissions on unix. Intentionally has
    /// no corresponding public getter surface on [`crate::store::ConfigStore`]
    /// beyond [`SecretsFile::get`], which callers in `agent-server` must not
    /// wire into any HTTP response.
    pub async fn persist(&self, path: &Path) -> ConfigResult<()> {
        let body = serde_json::to_string_pretty(self).map_err(|e| ConfigError::CacheWrite(e.to_string()))?;
        tokio::fs::write(path, body).await.map_err(|e| ConfigError::CacheWrite(e.to_string()))?;
        restrict_permissions(path).await;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = tokio::fs::set_permissions(path, perms).await;
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}

pub fn default_secrets_path(config_dir: &Path) -> PathBuf {
    config_dir.join("secrets.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        let mut secrets = SecretsFile::default();
        secrets.values.insert("broker_token".to_string(), "s3cr3t".to_string());
        secrets.persist(&path).await.unwrap();

        let loaded = SecretsFile::load(&path).await.unwrap();
        assert_eq!(loaded.get("broker_token"), Some("s3cr3t"));
    }

    #[tokio::test]
    async fn missing_file_yields_empty_secrets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded = SecretsFile::load(&path).await.unwrap();
        assert_eq!(loaded.get("anything"), None);
    }
}
