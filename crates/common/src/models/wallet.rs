use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    pub id: String,
    pub usdt_balance: f64,
    pub coin_balance: f64,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Quote-currency value of the whole wallet at `price`.
    pub fn notional(&self, price: f64) -> f64 {
        self.usdt_balance + self.coin_balance * price
    }
}

/// Broadcast-only projection of a [`Wallet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalletUpdate {
    pub usdt: f64,
    pub coin: f64,
}

impl From<&Wallet> for WalletUpdate {
    fn from(wallet: &Wallet) -> Self {
        Self {
            usdt: wallet.usdt_balance,
            coin: wallet.coin_balance,
        }
    }
}
