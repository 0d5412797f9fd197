use agent_model::prelude::{DurationMode, SuppressionRule};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};

use super::{RulesStore, SuppressionError};

/// Default relational view of the suppression rules table (spec §6:
/// "Relational table with at minimum: id, name, match_text, node_ip
/// (nullable), duration_type, enabled, expires_at (nullable), match_count,
/// last_matched_at"). Read semantics select only `enabled AND (expires_at
/// IS NULL OR expires_at > now())` at the SQL layer as a first filter; the
/// cache still re-checks `is_active` in memory since clock skew between
/// the agent and the store is possible.
#[derive(Debug, Clone)]
pub struct PostgresRulesStore {
    pool: PgPool,
}

impl PostgresRulesStore {
    pub async fn connect(url: &str) -> Result<Self, SuppressionError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await.map_err(|e| SuppressionError::StoreUnreachable(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_duration_mode(raw: &str) -> DurationMode {
    match raw {
        "timed" => DurationMode::Timed,
        "expiring_at" => DurationMode::ExpiringAt,
        _ => DurationMode::Permanent,
    }
}

#[async_trait::async_trait]
impl RulesStore for PostgresRulesStore {
    async fn fetch_all(&self) -> Result<Vec<SuppressionRule>, SuppressionError> {
        let timeout = std::time::Duration::from_secs(10);
        let rows = tokio::time::timeout(
            timeout,
            sqlx::query(
                r#"
                SELECT id, name, match_text, node_ip, duration_type, enabled,
                       expires_at, match_count, last_matched_at
                FROM suppression_rules
                WHERE enabled AND (expires_at IS NULL OR expires_at > now())
                "#,
            )
            .fetch_all(&self.pool),
        )
        .await
        .map_err(|_| SuppressionError::StoreUnreachable("rules store fetch timed out".to_string()))?
        .map_err(|e| SuppressionError::StoreUnreachable(e.to_string()))?;

        let rules = rows
            .into_iter()
            .map(|row| SuppressionRule {
                id: row.get::<String, _>("id"),
                name: row.get::<String, _>("name"),
                match_text: row.get::<String, _>("match_text"),
                host_filter: row.get::<Option<String>, _>("node_ip"),
                duration_mode: parse_duration_mode(row.get::<String, _>("duration_type").as_str()),
                expires_at: row.get::<Option<DateTime<Utc>>, _>("expires_at"),
                enabled: row.get::<bool, _>("enabled"),
                match_count: row.get::<i64, _>("match_count") as u64,
                last_matched_at: row.get::<Option<DateTime<Utc>>, _>("last_matched_at"),
            })
            .collect();
        Ok(rules)
    }

    async fn record_matches(&self, matches: &[(String, DateTime<Utc>)]) {
        for (rule_id, matched_at) in matches {
            let result = sqlx::query("UPDATE suppression_rules SET match_count = match_count + 1, last_matched_at = $1 WHERE id = $2")
                .bind(matched_at)
                .bind(rule_id)
                .execute(&self.pool)
                .await;
            if let Err(e) = result {
                tracing::warn!(rule_id = %rule_id, error = %e, "best-effort suppression match write-back failed");
            }
        }
    }
}
