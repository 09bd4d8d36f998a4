use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::SqlitePool;

use common::models::Candle;

use crate::db::with_deadline;
use crate::error::{Result, StorageError};
use crate::traits::CandleStore;

#[derive(sqlx::FromRow)]
struct CandleRow {
    time: i64,
    symbol: String,
    interval: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl TryFrom<CandleRow> for Candle {
    type Error = StorageError;

    fn try_from(row: CandleRow) -> Result<Self> {
        let event_time = DateTime::from_timestamp_millis(row.time)
            .ok_or(StorageError::InvalidTimestamp(row.time))?;

        Ok(Candle {
            symbol: row.symbol,
            interval: row.interval,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            event_time,
        })
    }
}

#[derive(Clone)]
pub struct CandlesRepository {
    pool: SqlitePool,
    deadline: Duration,
}

impl CandlesRepository {
    pub fn new(pool: SqlitePool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

#[async_trait]
impl CandleStore for CandlesRepository {
    async fn save(&self, candle: &Candle) -> Result<()> {
        let insert = sqlx::query(
            r#"
                INSERT INTO candles (
                    time, symbol, interval, open, high, low, close, volume
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (time, symbol, interval) DO NOTHING
            "#,
        )
        .bind(candle.event_time_ms())
        .bind(&candle.symbol)
        .bind(&candle.interval)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .execute(&self.pool);

        with_deadline("candles.save", self.deadline, insert).await?;
        Ok(())
    }

    async fn window(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>> {
        let select = sqlx::query_as::<_, CandleRow>(
            r#"
                SELECT time, symbol, interval, open, high, low, close, volume
                FROM candles
                WHERE symbol = ?
                ORDER BY time DESC
                LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool);

        let rows = with_deadline("candles.window", self.deadline, select).await?;

        // Newest-first out of the query, callers get oldest-first.
        let mut candles = rows
            .into_iter()
            .map(Candle::try_from)
            .collect::<Result<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }
}
