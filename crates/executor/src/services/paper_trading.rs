use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use common::models::{SignalAction, TradeSignal, Wallet, WalletUpdate};
use storage::{StorageError, WalletStore};

#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Refusing to trade at price {0}")]
    InvalidPrice(f64),

    #[error("[Wallet] {0}")]
    Storage(#[from] StorageError),
}

/// Balances a trade must strictly exceed before it is executed.
#[derive(Debug, Clone, Copy)]
pub struct TradeRules {
    pub min_quote: f64,
    pub min_base: f64,
}

impl Default for TradeRules {
    fn default() -> Self {
        Self {
            min_quote: 10.0,
            min_base: 0.0001,
        }
    }
}

/// All-in/all-out settlement. Returns the new `(usdt, coin)` balances, or
/// `None` when the action does not trade.
pub fn settle(
    wallet: &Wallet,
    action: SignalAction,
    price: f64,
    rules: &TradeRules,
) -> Option<(f64, f64)> {
    match action {
        SignalAction::Buy if wallet.usdt_balance > rules.min_quote => {
            let bought = wallet.usdt_balance / price;
            Some((0.0, wallet.coin_balance + bought))
        }
        SignalAction::Sell if wallet.coin_balance > rules.min_base => {
            let proceeds = wallet.coin_balance * price;
            Some((wallet.usdt_balance + proceeds, 0.0))
        }
        _ => None,
    }
}

/// Simulated execution against one persisted wallet.
pub struct PaperTradingEngine {
    wallets: Arc<dyn WalletStore>,
    account_id: String,
    rules: TradeRules,
    // Serializes the wallet read-modify-write across symbol workers.
    lock: Mutex<()>,
}

impl PaperTradingEngine {
    pub fn new(wallets: Arc<dyn WalletStore>, account_id: &str) -> Self {
        Self {
            wallets,
            account_id: account_id.to_string(),
            rules: TradeRules::default(),
            lock: Mutex::new(()),
        }
    }

    pub fn with_rules(mut self, rules: TradeRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Settles `signal` and persists the wallet. `Ok(None)` means nothing
    /// traded and nothing was written.
    pub async fn apply(&self, signal: &TradeSignal) -> Result<Option<WalletUpdate>, TradeError> {
        if signal.action == SignalAction::Hold {
            return Ok(None);
        }
        if !signal.price.is_finite() || signal.price <= 0.0 {
            return Err(TradeError::InvalidPrice(signal.price));
        }

        let _guard = self.lock.lock().await;

        let mut wallet = self.wallets.get_wallet(&self.account_id).await?;

        let Some((usdt, coin)) = settle(&wallet, signal.action, signal.price, &self.rules) else {
            match signal.action {
                SignalAction::Buy => warn!(
                    symbol = %signal.symbol,
                    "BUY skipped: {:.2} USDT is not above {}",
                    wallet.usdt_balance,
                    self.rules.min_quote
                ),
                _ => warn!(
                    symbol = %signal.symbol,
                    "SELL skipped: {} coin is not above {}",
                    wallet.coin_balance,
                    self.rules.min_base
                ),
            }
            return Ok(None);
        };

        wallet.usdt_balance = usdt;
        wallet.coin_balance = coin;
        wallet.updated_at = Utc::now();
        self.wallets.update_wallet(&wallet).await?;

        info!(
            symbol = %signal.symbol,
            "PAPER {} at {:.2}: usdt={:.2} coin={:.8}",
            signal.action,
            signal.price,
            wallet.usdt_balance,
            wallet.coin_balance
        );

        Ok(Some(WalletUpdate::from(&wallet)))
    }
}
