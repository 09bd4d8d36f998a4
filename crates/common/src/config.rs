use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/trading.db";
pub const DEFAULT_WS_BASE_URL: &str = "wss://stream.binance.com:9443/stream?streams=";
pub const DEFAULT_WS_BIND_ADDR: &str = "0.0.0.0:8085";
pub const DEFAULT_ACCOUNT_ID: &str = "demo";
pub const DEFAULT_SEED_USDT: f64 = 1000.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must list at least one symbol")]
    NoSymbols(&'static str),

    #[error("STRATEGY_PERIOD must be at least 1")]
    ZeroPeriod,

    #[error("WINDOW_SIZE ({window}) must hold at least STRATEGY_PERIOD + 1 ({needed}) candles")]
    WindowTooSmall { window: usize, needed: usize },

    #[error("RECONNECT_BASE_MS ({base_ms}) must not exceed RECONNECT_MAX_MS ({max_ms})")]
    BackoffRange { base_ms: u64, max_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Lower-case stream symbols, e.g. `btcusdt`.
    pub symbols: Vec<String>,
    pub kline_interval: String,
    pub ws_base_url: String,
    pub ws_bind_addr: String,
    pub account_id: String,
    pub seed_usdt: f64,
    pub strategy_period: usize,
    pub window_size: usize,
    pub db_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub reconnect_max_failures: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let symbols: Vec<String> = get("SYMBOLS")
            .unwrap_or_else(|| "btcusdt".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(ConfigError::NoSymbols("SYMBOLS"));
        }

        let seed_usdt: f64 = parse_or(&get, "SEED_USDT", DEFAULT_SEED_USDT)?;
        if !seed_usdt.is_finite() || seed_usdt < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "SEED_USDT",
                value: seed_usdt.to_string(),
            });
        }

        let strategy_period: usize = parse_or(&get, "STRATEGY_PERIOD", 3)?;
        if strategy_period == 0 {
            return Err(ConfigError::ZeroPeriod);
        }

        let window_size: usize = parse_or(&get, "WINDOW_SIZE", 20)?;
        if window_size < strategy_period + 1 {
            return Err(ConfigError::WindowTooSmall {
                window: window_size,
                needed: strategy_period + 1,
            });
        }

        let base_ms: u64 = parse_or(&get, "RECONNECT_BASE_MS", 500)?;
        let max_ms: u64 = parse_or(&get, "RECONNECT_MAX_MS", 30_000)?;
        if base_ms > max_ms {
            return Err(ConfigError::BackoffRange { base_ms, max_ms });
        }

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            symbols,
            kline_interval: get("KLINE_INTERVAL").unwrap_or_else(|| "1m".to_string()),
            ws_base_url: get("BINANCE_WS_URL").unwrap_or_else(|| DEFAULT_WS_BASE_URL.to_string()),
            ws_bind_addr: get("WS_BIND_ADDR").unwrap_or_else(|| DEFAULT_WS_BIND_ADDR.to_string()),
            account_id: get("ACCOUNT_ID").unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string()),
            seed_usdt,
            strategy_period,
            window_size,
            db_timeout: Duration::from_millis(parse_or(&get, "DB_TIMEOUT_MS", 5_000)?),
            reconnect_base: Duration::from_millis(base_ms),
            reconnect_max: Duration::from_millis(max_ms),
            reconnect_max_failures: parse_or(&get, "RECONNECT_MAX_FAILURES", 10)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}
