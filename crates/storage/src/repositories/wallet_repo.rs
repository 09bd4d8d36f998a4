use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use common::models::Wallet;

use crate::db::with_deadline;
use crate::error::{Result, StorageError};
use crate::traits::WalletStore;

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: String,
    usdt_balance: f64,
    coin_balance: f64,
    updated_at: i64,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StorageError;

    fn try_from(row: WalletRow) -> Result<Self> {
        let updated_at = DateTime::from_timestamp_millis(row.updated_at)
            .ok_or(StorageError::InvalidTimestamp(row.updated_at))?;

        Ok(Wallet {
            id: row.id,
            usdt_balance: row.usdt_balance,
            coin_balance: row.coin_balance,
            updated_at,
        })
    }
}

#[derive(Clone)]
pub struct WalletRepository {
    pool: SqlitePool,
    deadline: Duration,
}

impl WalletRepository {
    pub fn new(pool: SqlitePool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }

    /// Creates the account with `seed_usdt` and no coin unless it already
    /// exists. An existing wallet is never reset.
    pub async fn ensure_wallet(&self, id: &str, seed_usdt: f64) -> Result<Wallet> {
        let insert = sqlx::query(
            r#"
                INSERT INTO wallets (id, usdt_balance, coin_balance, updated_at)
                VALUES (?, ?, 0.0, ?)
                ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(seed_usdt)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool);

        let result = with_deadline("wallets.ensure", self.deadline, insert).await?;
        if result.rows_affected() > 0 {
            info!("Seeded wallet {} with {:.2} USDT", id, seed_usdt);
        }

        self.get_wallet(id).await
    }
}

#[async_trait]
impl WalletStore for WalletRepository {
    async fn get_wallet(&self, id: &str) -> Result<Wallet> {
        let select = sqlx::query_as::<_, WalletRow>(
            "SELECT id, usdt_balance, coin_balance, updated_at FROM wallets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool);

        match with_deadline("wallets.get", self.deadline, select).await? {
            Some(row) => Wallet::try_from(row),
            None => Err(StorageError::WalletNotFound(id.to_string())),
        }
    }

    async fn update_wallet(&self, wallet: &Wallet) -> Result<()> {
        let update = sqlx::query(
            r#"
                UPDATE wallets
                SET usdt_balance = ?, coin_balance = ?, updated_at = ?
                WHERE id = ?
            "#,
        )
        .bind(wallet.usdt_balance)
        .bind(wallet.coin_balance)
        .bind(wallet.updated_at.timestamp_millis())
        .bind(&wallet.id)
        .execute(&self.pool);

        let result = with_deadline("wallets.update", self.deadline, update).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::WalletNotFound(wallet.id.clone()));
        }
        Ok(())
    }
}
