#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::severity::Priority;

/// Static configuration for one alert rule (spec §3).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlertRule {
    /// e.g. `cpu_critical`.
    pub key: String,
    pub threshold: f64,
    pub required_duration_secs: u64,
    pub cooldown_secs: u64,
    pub priority: Priority,
    pub message_template: String,
    pub recommended_actions: Option<String>,
}

/// Per-rule-key mutable breach bookkeeping (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlertBreachState {
    pub first_breach: Option<DateTime<Utc>>,
    pub last_emitted: Option<DateTime<Utc>>,
}

impl AlertBreachState {
    /// Runs the five-step algorithm in spec §4.6 against the current value,
    /// returning `Some(breach_duration)` exactly when an alert should fire
    /// (mutating `self` to reflect the transition).
    pub fn evaluate(&mut self, current_value: f64, threshold: f64, required_duration_secs: u64, cooldown_secs: u64, now: DateTime<Utc>) -> Option<chrono::Duration> {
        if current_value < threshold {
            self.first_breach = None;
            return None;
        }
        let first_breach = match self.first_breach {
            None => {
                self.first_breach = Some(now);
                return None;
            }
            Some(t) => t,
        };
        let duration = now - first_breach;
        if duration < chrono::Duration::seconds(required_duration_secs as i64) {
            return None;
        }
        if let Some(last) = self.last_emitted {
            if now - last < chrono::Duration::seconds(cooldown_secs as i64) {
                return None;
            }
        }
        self.last_emitted = Some(now);
        self.first_breach = None;
        Some(duration)
    }
}

/// Outbound alert ticket payload (spec §6): `{title, description, priority,
/// status:"open", application, system_ip, alert_type, metric_value}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlertTicket {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: String,
    pub application: String,
    #[cfg_attr(feature = "serde", serde(rename = "system_ip"))]
    pub host_id: String,
    pub alert_type: String,
    pub metric_value: f64,
}

impl AlertTicket {
    pub fn open(title: impl Into<String>, description: impl Into<String>, priority: Priority, application: impl Into<String>, host_id: impl Into<String>, alert_type: impl Into<String>, metric_value: f64) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority,
            status: "open".to_string(),
            application: application.into(),
            host_id: host_id.into(),
            alert_type: alert_type.into(),
            metric_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn sub_duration_breach_never_emits() {
        let mut state = AlertBreachState::default();
        let t0 = Utc::now();
        assert_eq!(state.evaluate(92.0, 90.0, 300, 1800, t0), None);
        assert_eq!(state.evaluate(92.0, 90.0, 300, 1800, t0 + Duration::seconds(299)), None);
    }

    #[test]
    fn sustained_breach_emits_exactly_once() {
        let mut state = AlertBreachState::default();
        let t0 = Utc::now();
        state.evaluate(92.0, 90.0, 300, 1800, t0);
        let fired = state.evaluate(92.0, 90.0, 300, 1800, t0 + Duration::seconds(301));
        assert!(fired.is_some());
        assert!(state.first_breach.is_none());
        assert_eq!(state.evaluate(92.0, 90.0, 300, 1800, t0 + Duration::seconds(302)), None);
    }

    #[test]
    fn cooldown_blocks_reemission() {
        let mut state = AlertBreachState::default();
        let t0 = Utc::now();
        state.evaluate(92.0, 90.0, 300, 1800, t0);
        state.evaluate(92.0, 90.0, 300, 1800, t0 + Duration::seconds(301));
        // still breached but within cooldown
        state.evaluate(92.0, 90.0, 300, 1800, t0 + Duration::seconds(400));
        assert!(state.first_breach.is_some());
        let fired = state.evaluate(92.0, 90.0, 300, 1800, t0 + Duration::seconds(301 + 1800));
        assert!(fired.is_some());
    }

    #[test]
    fn dropping_below_threshold_clears_breach() {
        let mut state = AlertBreachState::default();
        let t0 = Utc::now();
        state.evaluate(92.0, 90.0, 300, 1800, t0);
        state.evaluate(50.0, 90.0, 300, 1800, t0 + Duration::seconds(10));
        assert!(state.first_breach.is_none());
    }
}
