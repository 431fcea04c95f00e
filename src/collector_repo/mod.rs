// SQLite bookkeeping for collectors: last-emitted watermarks per series and the security table.
// Timestamps are stored as epoch seconds. One row per key; writes go "update, else insert",
// with the insert itself an upsert so a concurrent first write cannot create a second row.
// Stored values never move backwards.

pub mod aggregation;
mod securities;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use crate::error::{CollectorError, Result};
pub use aggregation::compute_aggregation_timestamp;
pub use securities::Security;

/// Which statement an update-else-insert write ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Updated,
    Inserted,
}

pub struct CollectorRepo {
    pool: SqlitePool,
}

impl CollectorRepo {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        aggregation::init_tracker_tables(&self.pool).await?;
        securities::init_security_table(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn query_last_emitted_agg_timestamp(
        &self,
        key: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let ts = sqlx::query_scalar::<_, i64>(
            "SELECT sample_ts FROM emitted_sample_tracker WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        ts.map(from_epoch_secs).transpose()
    }

    /// Stored watermark for `key`, or a freshly inserted one of `now - period`.
    pub async fn establish_last_emitted_agg_timestamp(
        &self,
        key: &str,
        period_secs: u32,
    ) -> Result<DateTime<Utc>> {
        self.establish_last_emitted_agg_timestamp_at(key, period_secs, Utc::now())
            .await
    }

    /// As [`Self::establish_last_emitted_agg_timestamp`], with an explicit "now".
    #[instrument(skip(self, now), fields(repo = "collector", operation = "establish_last_emitted_agg_timestamp"))]
    pub async fn establish_last_emitted_agg_timestamp_at(
        &self,
        key: &str,
        period_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if let Some(ts) = self.query_last_emitted_agg_timestamp(key).await? {
            return Ok(ts);
        }

        let now = now.trunc_subsecs(0);
        let initial = compute_aggregation_timestamp(
            now - TimeDelta::seconds(i64::from(period_secs)),
            now,
            period_secs,
        );
        let inserted = sqlx::query(
            r#"
            INSERT INTO emitted_sample_tracker (key, sample_ts) VALUES ($1, $2)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(initial.timestamp())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            info!(initial = %initial, "watermark established");
            return Ok(initial);
        }

        // Another writer created the row between our read and insert.
        warn!("watermark inserted concurrently; using stored value");
        self.query_last_emitted_agg_timestamp(key)
            .await?
            .ok_or(CollectorError::Storage(sqlx::Error::RowNotFound))
    }

    #[instrument(skip(self), fields(repo = "collector", operation = "update_last_emitted_agg_timestamp"))]
    pub async fn update_last_emitted_agg_timestamp(
        &self,
        key: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        let r = sqlx::query(
            "UPDATE emitted_sample_tracker SET sample_ts = MAX(sample_ts, $2) WHERE key = $1",
        )
        .bind(key)
        .bind(timestamp.timestamp())
        .execute(&self.pool)
        .await?;
        if r.rows_affected() > 0 {
            return Ok(WriteOutcome::Updated);
        }

        sqlx::query(
            r#"
            INSERT INTO emitted_sample_tracker (key, sample_ts) VALUES ($1, $2)
            ON CONFLICT(key) DO UPDATE SET sample_ts = MAX(sample_ts, excluded.sample_ts)
            "#,
        )
        .bind(key)
        .bind(timestamp.timestamp())
        .execute(&self.pool)
        .await?;
        debug!("watermark row created");
        Ok(WriteOutcome::Inserted)
    }

    pub async fn query_last_emitted_non_metric_sequence(&self, key: &str) -> Result<Option<i64>> {
        let seq = sqlx::query_scalar::<_, i64>(
            "SELECT last_seq FROM emitted_non_metric_tracker WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(seq)
    }

    #[instrument(skip(self), fields(repo = "collector", operation = "update_last_emitted_non_metric_sequence"))]
    pub async fn update_last_emitted_non_metric_sequence(
        &self,
        key: &str,
        seq: i64,
    ) -> Result<WriteOutcome> {
        let r = sqlx::query(
            "UPDATE emitted_non_metric_tracker SET last_seq = MAX(last_seq, $2) WHERE key = $1",
        )
        .bind(key)
        .bind(seq)
        .execute(&self.pool)
        .await?;
        if r.rows_affected() > 0 {
            return Ok(WriteOutcome::Updated);
        }

        sqlx::query(
            r#"
            INSERT INTO emitted_non_metric_tracker (key, last_seq) VALUES ($1, $2)
            ON CONFLICT(key) DO UPDATE SET last_seq = MAX(last_seq, excluded.last_seq)
            "#,
        )
        .bind(key)
        .bind(seq)
        .execute(&self.pool)
        .await?;
        debug!("sequence row created");
        Ok(WriteOutcome::Inserted)
    }
}

fn from_epoch_secs(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        CollectorError::Storage(sqlx::Error::Decode(
            format!("timestamp out of range: {}", secs).into(),
        ))
    })
}
