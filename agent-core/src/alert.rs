use std::collections::HashMap;
use std::sync::Arc;

use agent_model::prelude::{AlertBreachState, AlertRule, AlertTicket, MetricSnapshot};
use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::metrics::AgentMetrics;

/// Per-metric-key current value extracted from a [`MetricSnapshot`],
/// matched against configured [`AlertRule`] keys (e.g. `cpu_critical`).
/// This is the small, closed vocabulary the engine actually evaluates;
/// new keys require a corresponding extraction arm here plus a rule in
/// config, mirroring how `agent-config::schema` is a static descriptor
/// table rather than reflection.
fn extract_metric(rule_key: &str, snapshot: &MetricSnapshot) -> Option<f64> {
    match rule_key {
        "cpu_critical" | "cpu_high" | "cpu_percent" => Some(snapshot.cpu.overall_percent as f64),
        "memory_critical" | "memory_high" | "memory_percent" => Some(snapshot.memory.used_percent as f64),
        "disk_critical" | "disk_high" | "disk_percent" => {
            let (total, used) = snapshot.disk.usage.values().fold((0u64, 0u64), |(t, u), m| (t + m.total_bytes, u + m.used_bytes));
            if total == 0 { None } else { Some(used as f64 / total as f64 * 100.0) }
        }
        "load_1m" => Some(snapshot.cpu.load_avg_1m),
        _ => None,
    }
}

/// Outbound alert ticket wire body (spec §6): identical shape to
/// [`AlertTicket`].
#[derive(Serialize)]
struct AlertTicketPayload<'a> {
    #[serde(flatten)]
    ticket: &'a AlertTicket,
}

/// Per-metric sustained-breach tracking, cooldown bookkeeping, and alert
/// ticket emission (C8, spec §4.6). Breach state is guarded by a
/// `DashMap` keyed by rule key; each critical section is O(1).
pub struct AlertEngine {
    rules: HashMap<String, AlertRule>,
    state: DashMap<String, AlertBreachState>,
    http: Client,
    alert_ticket_url: String,
    application: String,
    metrics: Arc<AgentMetrics>,
}

impl AlertEngine {
    pub fn new(rules: HashMap<String, AlertRule>, alert_ticket_url: String, application: String, metrics: Arc<AgentMetrics>) -> Self {
        let http = Client::builder().timeout(std::time::Duration::from_secs(agent_config::defaults::HTTP_REQUEST_TIMEOUT_SECS)).build().unwrap_or_else(|_| Client::new());
        Self { rules, state: DashMap::new(), http, alert_ticket_url, application, metrics }
    }

    /// Evaluates every configured rule against the metrics present in one
    /// snapshot (spec §4.3 "Dispatch ... to the Alert Engine").
    pub async fn evaluate_snapshot(&self, snapshot: &MetricSnapshot) {
        for (key, rule) in &self.rules {
            let Some(value) = extract_metric(key, snapshot) else { continue };
            self.evaluate(key, value, &snapshot.host_id, Utc::now()).await;
        }
    }

    /// The five-step algorithm in spec §4.6, evaluated for one
    /// `(rule_key, current_value, now)` triple.
    pub async fn evaluate(&self, rule_key: &str, current_value: f64, host_id: &str, now: chrono::DateTime<Utc>) {
        let Some(rule) = self.rules.get(rule_key) else { return };
        let mut entry = self.state.entry(rule_key.to_string()).or_default();
        let duration = entry.evaluate(current_value, rule.threshold, rule.required_duration_secs, rule.cooldown_secs, now);
        let Some(breach_duration) = duration else { return };
        drop(entry);

        let ticket = self.build_ticket(rule, current_value, breach_duration, host_id);
        info!(rule_key, host_id, current_value, "sustained threshold breach, emitting alert");
        self.metrics.record_alert_emitted();
        if let Err(e) = self.post_ticket(&ticket).await {
            // Idempotent w.r.t. reality: the engine does not retry; if the
            // condition is still breached it will re-fire next tick
            // (spec §4.6 "Failure semantics").
            error!(rule_key, error = %e, "alert ticket emission failed, will not retry this episode");
        }
    }

    fn build_ticket(&self, rule: &AlertRule, current_value: f64, breach_duration: chrono::Duration, host_id: &str) -> AlertTicket {
        let description = rule
            .message_template
            .replace("{rule}", &rule.key)
            .replace("{value}", &format!("{current_value:.1}"))
            .replace("{duration}", &breach_duration.num_seconds().to_string())
            .replace("{host}", host_id)
            .replace("{actions}", rule.recommended_actions.as_deref().unwrap_or(""));
        AlertTicket::open(format!("{} sustained breach on {}", rule.key, host_id), description, rule.priority, self.application.clone(), host_id.to_string(), rule.key.clone(), current_value)
    }

    async fn post_ticket(&self, ticket: &AlertTicket) -> Result<(), reqwest::Error> {
        let response = self.http.post(&self.alert_ticket_url).json(&AlertTicketPayload { ticket }).send().await?;
        response.error_for_status().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_model::prelude::Priority;

    fn cpu_rule() -> AlertRule {
        AlertRule { key: "cpu_critical".to_string(), threshold: 90.0, required_duration_secs: 300, cooldown_secs: 1800, priority: Priority::Critical, message_template: "{rule} at {value}% for {duration}s on {host}".to_string(), recommended_actions: None }
    }

    fn engine() -> AlertEngine {
        let mut rules = HashMap::new();
        rules.insert("cpu_critical".to_string(), cpu_rule());
        AlertEngine::new(rules, "http://127.0.0.1:0/alerts".to_string(), "agentd".to_string(), Arc::new(AgentMetrics::default()))
    }

    #[tokio::test]
    async fn scenario4_sub_duration_breach_never_emits() {
        let engine = engine();
        let t0 = Utc::now();
        engine.evaluate("cpu_critical", 92.0, "host-1", t0).await;
        engine.evaluate("cpu_critical", 92.0, "host-1", t0 + chrono::Duration::seconds(299)).await;
        assert!(engine.state.get("cpu_critical").unwrap().last_emitted.is_none());
    }

    #[tokio::test]
    async fn scenario4_sustained_breach_sets_last_emitted() {
        let engine = engine();
        let t0 = Utc::now();
        engine.evaluate("cpu_critical", 92.0, "host-1", t0).await;
        // POST will fail against the closed port above; last_emitted is
        // still set by AlertBreachState::evaluate before the POST attempt.
        engine.evaluate("cpu_critical", 92.0, "host-1", t0 + chrono::Duration::seconds(301)).await;
        assert!(engine.state.get("cpu_critical").unwrap().last_emitted.is_some());
    }

    #[tokio::test]
    async fn sustained_breach_increments_alerts_emitted_metric_even_when_post_fails() {
        let metrics = Arc::new(AgentMetrics::default());
        let mut rules = HashMap::new();
        rules.insert("cpu_critical".to_string(), cpu_rule());
        let engine = AlertEngine::new(rules, "http://127.0.0.1:0/alerts".to_string(), "agentd".to_string(), metrics.clone());

        let t0 = Utc::now();
        engine.evaluate("cpu_critical", 92.0, "host-1", t0).await;
        engine.evaluate("cpu_critical", 92.0, "host-1", t0 + chrono::Duration::seconds(301)).await;

        assert_eq!(metrics.snapshot().alerts_emitted, 1);
    }

    #[tokio::test]
    async fn unknown_rule_key_is_a_no_op() {
        let engine = engine();
        engine.evaluate("nonexistent_rule", 999.0, "host-1", Utc::now()).await;
        assert!(engine.state.get("nonexistent_rule").is_none());
    }

    #[test]
    fn extract_metric_reads_cpu_and_memory() {
        let mut snapshot_cpu = agent_model::prelude::CpuStats::default();
        snapshot_cpu.overall_percent = 55.0;
        let snapshot = MetricSnapshot {
            timestamp: Utc::now(),
            host_id: "h".into(),
            cpu: snapshot_cpu,
            memory: agent_model::prelude::MemoryStats::default(),
            disk: agent_model::prelude::DiskStats::default(),
            network: agent_model::prelude::NetworkStats::default(),
            processes: agent_model::prelude::ProcessStats::default(),
        };
        assert_eq!(extract_metric("cpu_critical", &snapshot), Some(55.0));
        assert_eq!(extract_metric("unknown_key", &snapshot), None);
    }
}
