use tokio::sync::mpsc;

use common::models::Candle;

use crate::error::SinkClosed;

/// Downstream of the gateway. `submit` must return without waiting on
/// whatever processes the candle.
pub trait CandleSink: Send + Sync {
    fn submit(&self, candle: Candle) -> Result<(), SinkClosed>;
}

impl CandleSink for mpsc::UnboundedSender<Candle> {
    fn submit(&self, candle: Candle) -> Result<(), SinkClosed> {
        self.send(candle).map_err(|_| SinkClosed)
    }
}
