// Securities known to the collectors; `deleted` marks a company removed from monitoring.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::instrument;

use super::CollectorRepo;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Security {
    pub symbol: String,
    pub exchange: String,
    pub deleted: bool,
}

pub(super) async fn init_security_table(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS security (
            symbol TEXT PRIMARY KEY NOT NULL,
            exchange TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

impl CollectorRepo {
    /// Adds or refreshes a security; re-adding clears its deleted marker.
    pub async fn upsert_security(&self, symbol: &str, exchange: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO security (symbol, exchange, deleted) VALUES ($1, $2, 0)
            ON CONFLICT(symbol) DO UPDATE SET exchange = excluded.exchange, deleted = 0
            "#,
        )
        .bind(symbol)
        .bind(exchange)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_security(&self, symbol: &str) -> Result<Option<Security>> {
        let row = sqlx::query_as::<_, Security>(
            "SELECT symbol, exchange, deleted FROM security WHERE symbol = $1",
        )
        .bind(symbol)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Securities not marked deleted, by symbol.
    pub async fn list_active_securities(&self) -> Result<Vec<Security>> {
        let rows = sqlx::query_as::<_, Security>(
            "SELECT symbol, exchange, deleted FROM security WHERE deleted = 0 ORDER BY symbol ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Sets the deleted marker. Returns rows affected (0 when the symbol is unknown).
    #[instrument(skip(self), fields(repo = "collector", operation = "mark_security_deleted"))]
    pub async fn mark_security_deleted(&self, symbol: &str) -> Result<u64> {
        let r = sqlx::query("UPDATE security SET deleted = 1 WHERE symbol = $1")
            .bind(symbol)
            .execute(self.pool())
            .await?;
        Ok(r.rows_affected())
    }
}
