// Aggregation grid: tracker table schema + pure timestamp snapping.
// DB reads/writes of the trackers stay in collector_repo::mod.

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::SqlitePool;

/// Creates the last-emitted trackers (aggregation timestamp and non-metric sequence).
pub async fn init_tracker_tables(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emitted_sample_tracker (
            key TEXT PRIMARY KEY NOT NULL,
            sample_ts INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emitted_non_metric_tracker (
            key TEXT PRIMARY KEY NOT NULL,
            last_seq INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Snaps `sample` onto the grid of period `period_secs` anchored at `reference`:
/// the greatest `t <= sample` with `t - reference` a multiple of the period.
/// Works the same whether `reference` is before, after or equal to `sample`.
/// A zero period leaves `sample` unchanged.
pub fn compute_aggregation_timestamp(
    sample: DateTime<Utc>,
    reference: DateTime<Utc>,
    period_secs: u32,
) -> DateTime<Utc> {
    if period_secs == 0 {
        return sample;
    }
    const NANOS_PER_SEC: i128 = 1_000_000_000;
    let diff = sample - reference;
    let diff_ns = i128::from(diff.num_seconds()) * NANOS_PER_SEC + i128::from(diff.subsec_nanos());
    // < u32::MAX seconds in nanoseconds, so it fits an i64.
    let offset_ns = diff_ns.rem_euclid(i128::from(period_secs) * NANOS_PER_SEC) as i64;
    sample - TimeDelta::nanoseconds(offset_ns)
}
