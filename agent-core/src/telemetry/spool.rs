use agent_model::prelude::MetricSnapshot;
use agent_model::spool::{SpoolEntry, SpoolStats};
use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("spool database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to serialize metric snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type SpoolResult<T> = Result<T, SpoolError>;

/// Durable FIFO of pending Metric Snapshots (C4, spec §4.4), backed by an
/// embedded SQLite database on the local filesystem — "an implementation
/// using an embedded relational store on the local filesystem is
/// appropriate" per the spec. A single writer (the Sampler) and a single
/// reader (the Publisher) may operate concurrently; `eviction_lock`
/// serializes the enqueue-then-evict-oldest critical section so "total
/// entries ≤ max" is never violated under races.
pub struct TelemetrySpool {
    pool: SqlitePool,
    max_size: u64,
    eviction_lock: Mutex<()>,
}

impl TelemetrySpool {
    pub async fn open(path: &str, max_size: u64) -> SpoolResult<Self> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS spool_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                payload TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_attempt_at TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool, max_size, eviction_lock: Mutex::new(()) })
    }

    #[cfg(test)]
    pub async fn open_in_memory(max_size: u64) -> SpoolResult<Self> {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await?;
        sqlx::query(
            r#"
            CREATE TABLE spool_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                payload TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_attempt_at TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool, max_size, eviction_lock: Mutex::new(()) })
    }

    /// `Enqueue(snapshot) -> id` (spec §4.4). Evicts the oldest entry first
    /// if size would exceed `max_size`.
    pub async fn enqueue(&self, snapshot: &MetricSnapshot) -> SpoolResult<i64> {
        let payload = serde_json::to_string(snapshot)?;
        let now = Utc::now();
        let _guard = self.eviction_lock.lock().await;

        let id: i64 = sqlx::query("INSERT INTO spool_entries (timestamp, payload, retry_count, created_at) VALUES ($1, $2, 0, $3) RETURNING id")
            .bind(snapshot.timestamp)
            .bind(&payload)
            .bind(now)
            .fetch_one(&self.pool)
            .await?
            .get("id");

        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM spool_entries").fetch_one(&self.pool).await?.get("c");
        if count as u64 > self.max_size {
            let evicted = sqlx::query("DELETE FROM spool_entries WHERE id = (SELECT id FROM spool_entries ORDER BY timestamp ASC, id ASC LIMIT 1)").execute(&self.pool).await?;
            if evicted.rows_affected() > 0 {
                warn!(max_size = self.max_size, "telemetry spool at capacity, evicted oldest entry");
            }
        }
        Ok(id)
    }

    /// `Dequeue(limit) -> [(id, snapshot, retry_count)]` (spec §4.4):
    /// returns without removing, oldest-timestamp-first. Rows whose
    /// payload fails to deserialize are dropped and logged rather than
    /// returned.
    pub async fn dequeue(&self, limit: i64) -> SpoolResult<Vec<SpoolEntry>> {
        let rows = sqlx::query("SELECT id, timestamp, payload, retry_count, created_at, last_attempt_at FROM spool_entries ORDER BY timestamp ASC, id ASC LIMIT $1").bind(limit).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let id: i64 = row.get("id");
                    error!(id, error = %e, "dropping corrupt spool entry");
                    let _ = sqlx::query("DELETE FROM spool_entries WHERE id = $1").bind(id).execute(&self.pool).await;
                }
            }
        }
        Ok(entries)
    }

    /// `MarkSent(id)` (spec §4.4): removes the entry.
    pub async fn mark_sent(&self, id: i64) -> SpoolResult<()> {
        sqlx::query("DELETE FROM spool_entries WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// `MarkFailed(id, maxRetries) -> still_queued` (spec §4.4): bumps the
    /// retry counter; removes and returns `false` once `maxRetries` is
    /// reached.
    pub async fn mark_failed(&self, id: i64, max_retries: u32) -> SpoolResult<bool> {
        let now = Utc::now();
        sqlx::query("UPDATE spool_entries SET retry_count = retry_count + 1, last_attempt_at = $1 WHERE id = $2").bind(now).bind(id).execute(&self.pool).await?;

        let retry_count: Option<i64> = sqlx::query("SELECT retry_count FROM spool_entries WHERE id = $1").bind(id).fetch_optional(&self.pool).await?.map(|r| r.get("retry_count"));

        match retry_count {
            Some(count) if count as u32 >= max_retries => {
                sqlx::query("DELETE FROM spool_entries WHERE id = $1").bind(id).execute(&self.pool).await?;
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    pub async fn size(&self) -> SpoolResult<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM spool_entries").fetch_one(&self.pool).await?.get("c");
        Ok(count as u64)
    }

    pub async fn stats(&self) -> SpoolResult<SpoolStats> {
        let total = self.size().await?;
        let rows = sqlx::query("SELECT retry_count, COUNT(*) AS c FROM spool_entries GROUP BY retry_count").fetch_all(&self.pool).await?;
        let mut by_retry_count = std::collections::BTreeMap::new();
        for row in rows {
            let retry_count: i64 = row.get("retry_count");
            let c: i64 = row.get("c");
            by_retry_count.insert(retry_count as u32, c as u64);
        }
        let oldest_timestamp = sqlx::query("SELECT timestamp FROM spool_entries ORDER BY timestamp ASC, id ASC LIMIT 1").fetch_optional(&self.pool).await?.map(|r| r.get::<chrono::DateTime<Utc>, _>("timestamp"));
        Ok(SpoolStats { total, by_retry_count, oldest_timestamp })
    }
}

fn decode_row(row: &SqliteRow) -> SpoolResult<SpoolEntry> {
    let id: i64 = row.get("id");
    let payload: String = row.get("payload");
    let snapshot: MetricSnapshot = serde_json::from_str(&payload)?;
    Ok(SpoolEntry {
        id,
        snapshot,
        retry_count: row.get::<i64, _>("retry_count") as u32,
        created_at: row.get::<chrono::DateTime<Utc>, _>("created_at"),
        last_attempt_at: row.get::<Option<chrono::DateTime<Utc>>, _>("last_attempt_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_model::prelude::{CpuStats, DiskStats, MemoryStats, NetworkStats, ProcessStats};

    fn sample_snapshot(minute: i64) -> MetricSnapshot {
        MetricSnapshot {
            timestamp: Utc::now() + chrono::Duration::minutes(minute),
            host_id: "host-1".into(),
            cpu: CpuStats::default(),
            memory: MemoryStats::default(),
            disk: DiskStats::default(),
            network: NetworkStats::default(),
            processes: ProcessStats::default(),
        }
    }

    #[tokio::test]
    async fn p5_bounded_and_oldest_wins_eviction() {
        let spool = TelemetrySpool::open_in_memory(3).await.unwrap();
        for i in 0..5 {
            spool.enqueue(&sample_snapshot(i)).await.unwrap();
        }
        assert_eq!(spool.size().await.unwrap(), 3);
        let entries = spool.dequeue(10).await.unwrap();
        assert_eq!(entries.len(), 3);
        // the two oldest (minute 0, 1) were evicted; 2, 3, 4 remain
        assert_eq!(entries[0].snapshot.timestamp, sample_snapshot(2).timestamp);
    }

    #[tokio::test]
    async fn dequeue_returns_fifo_order_without_removing() {
        let spool = TelemetrySpool::open_in_memory(10).await.unwrap();
        let id1 = spool.enqueue(&sample_snapshot(0)).await.unwrap();
        let _id2 = spool.enqueue(&sample_snapshot(1)).await.unwrap();
        let entries = spool.dequeue(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, id1);
        assert_eq!(spool.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mark_sent_removes_entry() {
        let spool = TelemetrySpool::open_in_memory(10).await.unwrap();
        let id = spool.enqueue(&sample_snapshot(0)).await.unwrap();
        spool.mark_sent(id).await.unwrap();
        assert_eq!(spool.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn p9_mark_failed_retries_then_removes_at_bound() {
        let spool = TelemetrySpool::open_in_memory(10).await.unwrap();
        let id = spool.enqueue(&sample_snapshot(0)).await.unwrap();
        assert!(spool.mark_failed(id, 3).await.unwrap());
        assert!(spool.mark_failed(id, 3).await.unwrap());
        assert!(!spool.mark_failed(id, 3).await.unwrap());
        assert_eq!(spool.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_reports_total_and_retry_buckets() {
        let spool = TelemetrySpool::open_in_memory(10).await.unwrap();
        let id = spool.enqueue(&sample_snapshot(0)).await.unwrap();
        spool.enqueue(&sample_snapshot(1)).await.unwrap();
        spool.mark_failed(id, 5).await.unwrap();
        let stats = spool.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_retry_count.get(&1), Some(&1));
        assert_eq!(stats.by_retry_count.get(&0), Some(&1));
    }
}
