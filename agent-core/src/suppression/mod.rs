mod postgres_store;

use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_model::prelude::SuppressionRule;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use postgres_store::PostgresRulesStore;

#[derive(Debug, thiserror::Error)]
pub enum SuppressionError {
    #[error("rules store unreachable: {0}")]
    StoreUnreachable(String),
}

/// The suppression rules store is an external system; the cache only
/// depends on this narrow interface (spec §1: "external systems are
/// specified only by the interface the core consumes").
#[async_trait]
pub trait RulesStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<SuppressionRule>, SuppressionError>;

    /// Best-effort batched write-back of match counters (spec §4.7).
    async fn record_matches(&self, matches: &[(String, chrono::DateTime<Utc>)]);
}

struct PendingMatch {
    rule_id: String,
    matched_at: chrono::DateTime<Utc>,
}

/// TTL-cached view of suppression rules (C1, spec §4.7). Reads are
/// lock-free against the current snapshot; refresh takes a short
/// exclusive section to swap the pointer and is itself serialized so
/// concurrent refreshers collapse into one fetch.
pub struct SuppressionCache {
    store: Arc<dyn RulesStore>,
    rules: ArcSwap<Vec<SuppressionRule>>,
    last_refresh: Mutex<Instant>,
    ttl: Duration,
    refresh_lock: Mutex<()>,
    pending_writeback: Mutex<Vec<PendingMatch>>,
}

impl std::fmt::Debug for SuppressionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppressionCache").field("rule_count", &self.rules.load().len()).field("ttl", &self.ttl).finish()
    }
}

impl SuppressionCache {
    pub fn new(store: Arc<dyn RulesStore>, ttl: Duration) -> Self {
        Self {
            store,
            rules: ArcSwap::from_pointee(Vec::new()),
            last_refresh: Mutex::new(Instant::now() - ttl - Duration::from_secs(1)),
            ttl,
            refresh_lock: Mutex::new(()),
            pending_writeback: Mutex::new(Vec::new()),
        }
    }

    /// `ShouldSuppress(line, host_id)` per spec §4.7: refreshes first if
    /// stale, then returns the first matching enabled, non-expired rule.
    pub async fn should_suppress(&self, line: &str, host_id: &str) -> Option<SuppressionRule> {
        self.refresh_if_stale().await;

        let now = Utc::now();
        let rules = self.rules.load();
        let matched = rules.iter().find(|r| r.is_active(now) && r.matches(line, host_id)).cloned();

        if let Some(rule) = &matched {
            debug!(rule_id = %rule.id, rule_name = %rule.name, "line suppressed by rule");
            self.pending_writeback.lock().await.push(PendingMatch { rule_id: rule.id.clone(), matched_at: now });
        }
        matched
    }

    async fn refresh_if_stale(&self) {
        let is_stale = {
            let last = self.last_refresh.lock().await;
            last.elapsed() >= self.ttl
        };
        if !is_stale {
            return;
        }
        self.force_refresh().await;
    }

    /// Forces a refresh regardless of TTL. Concurrent callers collapse
    /// into a single fetch via `refresh_lock`.
    pub async fn force_refresh(&self) {
        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        {
            let last = self.last_refresh.lock().await;
            if last.elapsed() < self.ttl {
                return;
            }
        }
        match self.store.fetch_all().await {
            Ok(fresh) => {
                self.rules.store(Arc::new(fresh));
                *self.last_refresh.lock().await = Instant::now();
            }
            Err(e) => {
                warn!(error = %e, "suppression rules store unreachable, serving last cached rule set");
                *self.last_refresh.lock().await = Instant::now();
            }
        }
        self.flush_writeback().await;
    }

    async fn flush_writeback(&self) {
        let mut pending = self.pending_writeback.lock().await;
        if pending.is_empty() {
            return;
        }
        let batch: Vec<(String, chrono::DateTime<Utc>)> = pending.drain(..).map(|p| (p.rule_id, p.matched_at)).collect();
        drop(pending);
        self.store.record_matches(&batch).await;
    }

    pub fn cached_rule_count(&self) -> usize {
        self.rules.load().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_model::prelude::DurationMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStore {
        rules: Vec<SuppressionRule>,
        fetch_count: AtomicUsize,
    }

    #[async_trait]
    impl RulesStore for FakeStore {
        async fn fetch_all(&self) -> Result<Vec<SuppressionRule>, SuppressionError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.rules.clone())
        }

        async fn record_matches(&self, _matches: &[(String, chrono::DateTime<Utc>)]) {}
    }

    fn rule(match_text: &str) -> SuppressionRule {
        SuppressionRule {
            id: "r1".into(),
            name: "test".into(),
            match_text: match_text.into(),
            host_filter: None,
            duration_mode: DurationMode::Permanent,
            expires_at: None,
            enabled: true,
            match_count: 0,
            last_matched_at: None,
        }
    }

    #[tokio::test]
    async fn suppresses_matching_line() {
        let store = Arc::new(FakeStore { rules: vec![rule("connection refused")], fetch_count: AtomicUsize::new(0) });
        let cache = SuppressionCache::new(store, Duration::from_secs(60));
        let result = cache.should_suppress("ERROR: connection refused to db", "host-1").await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn non_matching_line_passes_through() {
        let store = Arc::new(FakeStore { rules: vec![rule("connection refused")], fetch_count: AtomicUsize::new(0) });
        let cache = SuppressionCache::new(store, Duration::from_secs(60));
        let result = cache.should_suppress("ERROR: disk full", "host-1").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn does_not_refetch_within_ttl() {
        let store = Arc::new(FakeStore { rules: vec![rule("x")], fetch_count: AtomicUsize::new(0) });
        let cache = SuppressionCache::new(store.clone(), Duration::from_secs(60));
        cache.should_suppress("no match here", "host-1").await;
        cache.should_suppress("no match here", "host-1").await;
        assert_eq!(store.fetch_count.load(Ordering::SeqCst), 1);
    }
}
