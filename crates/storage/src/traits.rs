use async_trait::async_trait;

use common::models::{Candle, Wallet};

use crate::error::Result;

#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Idempotent on `(event_time, symbol, interval)`: saving the same bar
    /// twice leaves a single row and is not an error.
    async fn save(&self, candle: &Candle) -> Result<()>;

    /// The `limit` most recent candles for `symbol`, oldest first.
    async fn window(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_wallet(&self, id: &str) -> Result<Wallet>;

    async fn update_wallet(&self, wallet: &Wallet) -> Result<()>;
}
