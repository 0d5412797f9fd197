use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_model::prelude::{ErrorEvent, MonitoredFileSpec};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::BrokerPublisher;
use crate::classify::{classify_severity, derive_priority};
use crate::keywords::KeywordMatcher;
use crate::metrics::AgentMetrics;
use crate::suppression::SuppressionCache;

/// One module tag the tailer refuses to re-emit when tailing its own log
/// file, per the spec's single required hardcoded exception (§4.1).
pub const SELF_LOG_TAG: &str = "agent-core::tailer";

#[derive(Debug, Clone, Copy)]
pub struct TailerIntervals {
    pub file_poll: Duration,
    pub read_poll: Duration,
    pub rotation_poll: Duration,
}

impl Default for TailerIntervals {
    fn default() -> Self {
        Self {
            file_poll: Duration::from_secs(5),
            read_poll: Duration::from_millis(1000),
            rotation_poll: Duration::from_secs(30),
        }
    }
}

/// Follows one [`MonitoredFileSpec`] from end-of-file (C7, spec §4.1).
pub struct Tailer {
    spec: MonitoredFileSpec,
    host_id: String,
    application: String,
    keywords: Arc<KeywordMatcher>,
    suppression: Arc<SuppressionCache>,
    publisher: Arc<dyn BrokerPublisher>,
    intervals: TailerIntervals,
    is_self_log: bool,
    metrics: Arc<AgentMetrics>,
}

impl Tailer {
    pub fn new(spec: MonitoredFileSpec, host_id: String, application: String, keywords: Arc<KeywordMatcher>, suppression: Arc<SuppressionCache>, publisher: Arc<dyn BrokerPublisher>, intervals: TailerIntervals, metrics: Arc<AgentMetrics>) -> Self {
        let is_self_log = spec.label.contains("agentd") || spec.path.to_string_lossy().contains("agentd");
        Self { spec, host_id, application, keywords, suppression, publisher, intervals, is_self_log, metrics }
    }

    /// Runs until `cancel` fires. Cancellation is observed at the next
    /// read boundary (spec §4.1 "Termination").
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.open_at_eof(&cancel).await {
                Some(file) => {
                    if self.steady_state(file, &cancel).await {
                        // rotation/truncation detected: loop back and reopen
                        continue;
                    }
                    return;
                }
                None => return, // cancelled while waiting for the file to appear
            }
        }
    }

    /// Startup: poll until the path exists or cancellation, then open
    /// read-only and seek to EOF (spec §4.1 "Startup").
    async fn open_at_eof(&self, cancel: &CancellationToken) -> Option<tokio::fs::File> {
        loop {
            match tokio::fs::File::open(&self.spec.path).await {
                Ok(mut file) => {
                    if let Err(e) = file.seek(std::io::SeekFrom::End(0)).await {
                        warn!(path = %self.spec.path.display(), error = %e, "failed to seek to end of file, will retry");
                    } else {
                        info!(path = %self.spec.path.display(), label = %self.spec.label, "tailer opened file at EOF");
                        return Some(file);
                    }
                }
                Err(_) => {
                    debug!(path = %self.spec.path.display(), "monitored file not yet present, polling");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.intervals.file_poll) => {}
            }
        }
    }

    /// Reads newline-terminated lines until cancellation or a rotation is
    /// detected. Returns `true` when the caller should reopen the file.
    async fn steady_state(&self, file: tokio::fs::File, cancel: &CancellationToken) -> bool {
        let (mut offset, opened_ino) = match file.metadata().await {
            Ok(meta) => (meta.len(), Some(meta.ino())),
            Err(_) => (0, None),
        };
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut last_progress = tokio::time::Instant::now();

        loop {
            if cancel.is_cancelled() {
                return false;
            }
            line.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => return false,
                result = reader.read_line(&mut line) => result,
            };

            match read {
                Ok(0) => {
                    if last_progress.elapsed() >= self.intervals.rotation_poll {
                        if let Some(should_reopen) = self.check_rotation(&self.spec.path, offset, opened_ino).await {
                            if should_reopen {
                                return true;
                            }
                        }
                        last_progress = tokio::time::Instant::now();
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(self.intervals.read_poll) => {}
                    }
                }
                Ok(n) => {
                    offset += n as u64;
                    last_progress = tokio::time::Instant::now();
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if !trimmed.is_empty() {
                        self.metrics.record_line_tailed();
                        self.handle_line(trimmed).await;
                    }
                }
                Err(e) => {
                    warn!(path = %self.spec.path.display(), error = %e, "tailer read error, reopening");
                    return true;
                }
            }
        }
    }

    /// `Some(true)` if the file should be reopened: size shrank
    /// (truncation), the path's current inode no longer matches
    /// `opened_ino` (rotate-and-recreate at the same path), or the path
    /// no longer stats (disappeared). `Some(false)` to keep reading this
    /// descriptor, `None` on a transient stat failure (treated as "keep
    /// reading"). `opened_ino` is `None` when the original open-time
    /// `stat` failed, in which case inode comparison is skipped and only
    /// the size check applies.
    async fn check_rotation(&self, path: &Path, current_offset: u64, opened_ino: Option<u64>) -> Option<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                if meta.len() < current_offset {
                    info!(path = %path.display(), "monitored file shrank, reopening from offset 0");
                    return Some(true);
                }
                if let Some(ino) = opened_ino {
                    if meta.ino() != ino {
                        info!(path = %path.display(), old_ino = ino, new_ino = meta.ino(), "monitored file inode changed, reopening");
                        return Some(true);
                    }
                }
                Some(false)
            }
            Err(_) => {
                info!(path = %path.display(), "monitored file disappeared, reopening");
                Some(true)
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        if !self.keywords.is_candidate(line) {
            return;
        }
        if self.is_self_log && line.contains(SELF_LOG_TAG) {
            return;
        }

        if let Some(rule) = self.suppression.should_suppress(line, &self.host_id).await {
            self.metrics.record_event_suppressed();
            debug!(rule_id = %rule.id, path = %self.spec.path.display(), "line suppressed");
            return;
        }

        let severity = classify_severity(line);
        let priority = derive_priority(self.spec.priority, line);
        let event = ErrorEvent {
            timestamp: Utc::now(),
            host_id: self.host_id.clone(),
            log_path: self.spec.path.display().to_string(),
            log_label: self.spec.label.clone(),
            application: self.application.clone(),
            log_line: line.to_string(),
            severity,
            priority,
        };

        if let Err(e) = self.publisher.publish(&event).await {
            warn!(path = %self.spec.path.display(), error = %e, "broker publish failed, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_model::prelude::Priority;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct CapturingPublisher {
        events: StdMutex<Vec<ErrorEvent>>,
    }

    #[async_trait]
    impl BrokerPublisher for CapturingPublisher {
        async fn publish(&self, event: &ErrorEvent) -> Result<(), crate::broker::BrokerError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct NoRulesStore;
    #[async_trait]
    impl crate::suppression::RulesStore for NoRulesStore {
        async fn fetch_all(&self) -> Result<Vec<agent_model::prelude::SuppressionRule>, crate::suppression::SuppressionError> {
            Ok(Vec::new())
        }
        async fn record_matches(&self, _matches: &[(String, chrono::DateTime<Utc>)]) {}
    }

    fn test_tailer(path: std::path::PathBuf, publisher: Arc<dyn BrokerPublisher>) -> Tailer {
        let spec = MonitoredFileSpec::new("a", path, Some("app".to_string()), Priority::High, true);
        let keywords = Arc::new(KeywordMatcher::new(&["error".to_string()]));
        let suppression = Arc::new(SuppressionCache::new(Arc::new(NoRulesStore), Duration::from_secs(60)));
        let metrics = Arc::new(AgentMetrics::default());
        Tailer::new(spec, "host-1".to_string(), "agentd".to_string(), keywords, suppression, publisher, TailerIntervals { file_poll: Duration::from_millis(20), read_poll: Duration::from_millis(20), rotation_poll: Duration::from_secs(30) }, metrics)
    }

    #[tokio::test]
    async fn p1_lines_written_before_seek_are_not_emitted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, "ERROR: before start\n").await.unwrap();

        let publisher = Arc::new(CapturingPublisher { events: StdMutex::new(Vec::new()) });
        let tailer = test_tailer(path.clone(), publisher.clone());
        let cancel = CancellationToken::new();

        let file = tailer.open_at_eof(&cancel).await.unwrap();
        let cancel_clone = cancel.clone();
        let run_handle = tokio::spawn(async move {
            tailer.steady_state(file, &cancel_clone).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::fs::write(&path, "ERROR: before start\nERROR: after start\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        cancel.cancel();
        let _ = run_handle.await;

        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].log_line, "ERROR: after start");
    }

    #[tokio::test]
    async fn self_log_lines_are_never_emitted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agentd.log");
        tokio::fs::write(&path, "").await.unwrap();

        let publisher = Arc::new(CapturingPublisher { events: StdMutex::new(Vec::new()) });
        let tailer = test_tailer(path.clone(), publisher.clone());
        assert!(tailer.is_self_log);

        tailer.handle_line(&format!("ERROR in {SELF_LOG_TAG}: publish failed")).await;
        assert!(publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_candidate_line_is_not_emitted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, "").await.unwrap();
        let publisher = Arc::new(CapturingPublisher { events: StdMutex::new(Vec::new()) });
        let tailer = test_tailer(path, publisher.clone());
        tailer.handle_line("everything is fine").await;
        assert!(publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn candidate_line_is_emitted_with_classified_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, "").await.unwrap();
        let publisher = Arc::new(CapturingPublisher { events: StdMutex::new(Vec::new()) });
        let tailer = test_tailer(path, publisher.clone());
        tailer.handle_line("ERROR: disk full, denied access").await;
        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, agent_model::prelude::Severity::Error);
        assert_eq!(events[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn suppressed_line_increments_events_suppressed_metric() {
        struct AlwaysSuppress;
        #[async_trait]
        impl crate::suppression::RulesStore for AlwaysSuppress {
            async fn fetch_all(&self) -> Result<Vec<agent_model::prelude::SuppressionRule>, crate::suppression::SuppressionError> {
                Ok(vec![agent_model::prelude::SuppressionRule {
                    id: "r1".to_string(),
                    name: "connection refused".to_string(),
                    match_text: "error".to_string(),
                    host_filter: None,
                    duration_mode: agent_model::prelude::DurationMode::Permanent,
                    expires_at: None,
                    enabled: true,
                    match_count: 0,
                    last_matched_at: None,
                }])
            }
            async fn record_matches(&self, _matches: &[(String, chrono::DateTime<Utc>)]) {}
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, "").await.unwrap();
        let spec = MonitoredFileSpec::new("a", path, Some("app".to_string()), Priority::High, true);
        let keywords = Arc::new(KeywordMatcher::new(&["error".to_string()]));
        let suppression = Arc::new(SuppressionCache::new(Arc::new(AlwaysSuppress), Duration::from_secs(60)));
        let metrics = Arc::new(AgentMetrics::default());
        let publisher = Arc::new(CapturingPublisher { events: StdMutex::new(Vec::new()) });
        let tailer = Tailer::new(spec, "host-1".to_string(), "agentd".to_string(), keywords, suppression, publisher.clone(), TailerIntervals::default(), metrics.clone());

        tailer.handle_line("ERROR: connection refused").await;

        assert!(publisher.events.lock().unwrap().is_empty());
        assert_eq!(metrics.snapshot().events_suppressed, 1);
    }

    #[tokio::test]
    async fn check_rotation_detects_inode_change_on_rotate_and_recreate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, "one\n").await.unwrap();
        let publisher = Arc::new(CapturingPublisher { events: StdMutex::new(Vec::new()) });
        let tailer = test_tailer(path.clone(), publisher);
        let opened_ino = tokio::fs::metadata(&path).await.unwrap().ino();

        // Simulate log rotation: the old inode is unlinked and a new file
        // is created at the same path.
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::write(&path, "two\nthree\n").await.unwrap();

        let result = tailer.check_rotation(&path, 4, Some(opened_ino)).await;
        assert_eq!(result, Some(true));
    }

    #[tokio::test]
    async fn check_rotation_keeps_reading_same_inode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, "one\n").await.unwrap();
        let publisher = Arc::new(CapturingPublisher { events: StdMutex::new(Vec::new()) });
        let tailer = test_tailer(path.clone(), publisher);
        let opened_ino = tokio::fs::metadata(&path).await.unwrap().ino();

        let result = tailer.check_rotation(&path, 4, Some(opened_ino)).await;
        assert_eq!(result, Some(false));
    }

    #[tokio::test]
    async fn check_rotation_detects_truncation_even_with_unchanged_inode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, "one\ntwo\n").await.unwrap();
        let publisher = Arc::new(CapturingPublisher { events: StdMutex::new(Vec::new()) });
        let tailer = test_tailer(path.clone(), publisher);
        let opened_ino = tokio::fs::metadata(&path).await.unwrap().ino();

        tokio::fs::write(&path, "x\n").await.unwrap();
        let result = tailer.check_rotation(&path, 100, Some(opened_ino)).await;
        assert_eq!(result, Some(true));
    }
}
