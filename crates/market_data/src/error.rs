use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("[Json] {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected event type {0:?}")]
    UnexpectedEvent(String),

    #[error("Invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Event time {0} is out of range")]
    InvalidTimestamp(i64),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("[Transport] {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("Stream closed by venue")]
    Disconnected,

    #[error("Reconnect circuit open after {failures} consecutive failures, last: {last_error}")]
    CircuitOpen { failures: u32, last_error: String },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Candle sink is closed")]
pub struct SinkClosed;
