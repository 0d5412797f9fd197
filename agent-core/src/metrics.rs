use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide liveness counters, incremented by the Tailer, Sampler, and
/// Alert Engine as part of their normal work and read out via
/// `/api/metrics` (SPEC_FULL.md §4: an ambient observability surface the
/// distilled spec's route table never names, but its Non-goals never
/// exclude either).
#[derive(Debug, Default)]
pub struct AgentMetrics {
    lines_tailed: AtomicU64,
    events_published: AtomicU64,
    events_suppressed: AtomicU64,
    snapshots_spooled: AtomicU64,
    alerts_emitted: AtomicU64,
}

impl AgentMetrics {
    pub fn record_line_tailed(&self) {
        self.lines_tailed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_suppressed(&self) {
        self.events_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_spooled(&self) {
        self.snapshots_spooled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_emitted(&self) {
        self.alerts_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AgentMetricsSnapshot {
        AgentMetricsSnapshot {
            lines_tailed: self.lines_tailed.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_suppressed: self.events_suppressed.load(Ordering::Relaxed),
            snapshots_spooled: self.snapshots_spooled.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgentMetricsSnapshot {
    pub lines_tailed: u64,
    pub events_published: u64,
    pub events_suppressed: u64,
    pub snapshots_spooled: u64,
    pub alerts_emitted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment_independently() {
        let metrics = AgentMetrics::default();
        let zero = metrics.snapshot();
        assert_eq!(zero.lines_tailed, 0);
        assert_eq!(zero.alerts_emitted, 0);

        metrics.record_line_tailed();
        metrics.record_line_tailed();
        metrics.record_alert_emitted();

        let after = metrics.snapshot();
        assert_eq!(after.lines_tailed, 2);
        assert_eq!(after.alerts_emitted, 1);
        assert_eq!(after.events_suppressed, 0);
    }
}
