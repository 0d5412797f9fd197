use std::path::Path;

use sha2::{Digest, Sha256};

/// Resolves the §9 open question "Node identifier source" in favour of a
/// persistent machine UUID cached to a local file, falling back to an
/// IP-derived identifier only when no cache can be created. Once chosen,
/// the identifier is stable for the lifetime of the process (spec §9:
/// implementers MUST choose one at startup and keep it stable).
pub async fn resolve_node_id(cache_path: &Path) -> String {
    if let Ok(existing) = tokio::fs::read_to_string(cache_path).await {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let generated = uuid::Uuid::new_v4().to_string();
    if let Some(parent) = cache_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    if tokio::fs::write(cache_path, &generated).await.is_ok() {
        return generated;
    }

    // Cache file could not be created (read-only filesystem, permissions).
    // Fall back to a stable-for-this-process id derived from hostname, per
    // the spec's "IP-derived id" candidate, substituting hostname since
    // the local IP can be DHCP-volatile within a single run too.
    fallback_identifier()
}

fn fallback_identifier() -> String {
    let hostname = hostname_best_effort();
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    let digest = hasher.finalize();
    format!("host-{:x}", digest)[..16].to_string()
}

fn hostname_best_effort() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn resolves_same_id_across_calls_once_cached() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("node_id");
        let first = resolve_node_id(&cache_path).await;
        let second = resolve_node_id(&cache_path).await;
        assert_eq!(first, second);
    }
}
