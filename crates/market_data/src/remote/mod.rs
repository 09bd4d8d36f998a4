pub mod kline_response;

pub use kline_response::{KlineEvent, KlineStreamEvent, StreamFrame, decode_kline_message};

/// Stream URL for one symbol's klines. `base_url` is either the combined
/// endpoint (`.../stream?streams=`) or the raw one (`.../ws/`).
pub fn kline_stream_url(base_url: &str, symbol: &str, interval: &str) -> String {
    format!("{}{}@kline_{}", base_url, symbol.to_lowercase(), interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_names_are_lowercase() {
        assert_eq!(
            kline_stream_url("wss://stream.binance.com:9443/stream?streams=", "BTCUSDT", "1m"),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@kline_1m"
        );
    }
}
