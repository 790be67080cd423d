//! Persistence layer.
//!
//! Runs and trades go into SQLite via sqlx. The worker treats every call
//! here as best-effort: a store failure degrades to a warning and never
//! alters the run outcome.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::types::{Signal, TradeRecord};

/// Run/trade persistence as seen by the worker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn start_run(&self, run_id: &str, user_wallet: &str, buy_amount_wei: u128)
        -> Result<()>;
    async fn stop_run(&self, run_id: &str, reason: &str) -> Result<()>;
    async fn record_trade(&self, record: &TradeRecord) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the schema if missing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open store: {database_url}"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id          TEXT PRIMARY KEY,
                user_wallet     TEXT NOT NULL,
                buy_amount_wei  TEXT NOT NULL,
                status          TEXT NOT NULL,
                stop_reason     TEXT,
                started_ts      INTEGER NOT NULL,
                stopped_ts      INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create runs table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                trade_id    TEXT PRIMARY KEY,
                run_id      TEXT NOT NULL,
                user_wallet TEXT NOT NULL,
                side        TEXT NOT NULL,
                amount_wei  TEXT NOT NULL,
                tx_ref      TEXT NOT NULL,
                to_wallet   TEXT NOT NULL,
                status      TEXT NOT NULL,
                ts          INTEGER NOT NULL,
                meta        TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create trades table")?;

        Ok(Self { pool })
    }

    /// All trades for a run, insertion order.
    pub async fn trades_for_run(&self, run_id: &str) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            "SELECT trade_id, run_id, user_wallet, side, amount_wei, tx_ref, to_wallet, \
             status, ts, meta FROM trades WHERE run_id = ? ORDER BY rowid ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query trades")?;

        rows.into_iter().map(|row| row_to_trade(&row)).collect()
    }

    /// Status and stop reason for a run, if recorded.
    pub async fn run_status(&self, run_id: &str) -> Result<Option<(String, Option<String>)>> {
        let row = sqlx::query("SELECT status, stop_reason FROM runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query run status")?;
        Ok(row.map(|r| (r.get::<String, _>("status"), r.get("stop_reason"))))
    }
}

fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> Result<TradeRecord> {
    let side = match row.get::<String, _>("side").as_str() {
        "BUY" => Signal::Buy,
        "SELL" => Signal::Sell,
        other => anyhow::bail!("Unknown trade side in store: {other}"),
    };
    let amount: String = row.get("amount_wei");
    let meta: String = row.get("meta");
    let ts_millis: i64 = row.get("ts");

    Ok(TradeRecord {
        trade_id: row.get("trade_id"),
        run_id: row.get("run_id"),
        user_wallet: row.get("user_wallet"),
        side,
        amount_wei: amount
            .parse()
            .with_context(|| format!("Invalid stored amount: {amount}"))?,
        tx_ref: row.get("tx_ref"),
        to_wallet: row.get("to_wallet"),
        status: row.get("status"),
        ts: DateTime::<Utc>::from_timestamp_millis(ts_millis)
            .context("Invalid stored timestamp")?,
        meta: serde_json::from_str(&meta).unwrap_or(serde_json::Value::Null),
    })
}

#[async_trait]
impl TradeStore for SqliteStore {
    async fn start_run(
        &self,
        run_id: &str,
        user_wallet: &str,
        buy_amount_wei: u128,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO runs (run_id, user_wallet, buy_amount_wei, status, started_ts) \
             VALUES (?, ?, ?, 'RUNNING', ?)",
        )
        .bind(run_id)
        .bind(user_wallet.to_lowercase())
        .bind(buy_amount_wei.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert run")?;

        debug!(run_id, "Run recorded");
        Ok(())
    }

    async fn stop_run(&self, run_id: &str, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE runs SET status = 'STOPPED', stop_reason = ?, stopped_ts = ? \
             WHERE run_id = ?",
        )
        .bind(reason)
        .bind(Utc::now().timestamp_millis())
        .bind(run_id)
        .execute(&self.pool)
        .await
        .context("Failed to update run")?;

        debug!(run_id, reason, "Run stopped in store");
        Ok(())
    }

    async fn record_trade(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO trades (trade_id, run_id, user_wallet, side, amount_wei, tx_ref, \
             to_wallet, status, ts, meta) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.trade_id)
        .bind(&record.run_id)
        .bind(&record.user_wallet)
        .bind(record.side.to_string())
        .bind(record.amount_wei.to_string())
        .bind(&record.tx_ref)
        .bind(&record.to_wallet)
        .bind(&record.status)
        .bind(record.ts.timestamp_millis())
        .bind(record.meta.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to insert trade")?;

        debug!(trade_id = %record.trade_id, side = %record.side, "Trade recorded");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
