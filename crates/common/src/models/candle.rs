use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed kline. Identified by `(event_time, symbol, interval)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub interval: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub event_time: DateTime<Utc>,
}

impl Candle {
    pub fn event_time_ms(&self) -> i64 {
        self.event_time.timestamp_millis()
    }
}
