use chrono::DateTime;
use serde::Deserialize;

use common::models::Candle;

use crate::error::DecodeError;

/// A frame from either the combined endpoint (wrapped in `stream`/`data`)
/// or the raw single-stream endpoint.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum StreamFrame {
    Combined {
        stream: String,
        data: KlineStreamEvent,
    },
    Raw(KlineStreamEvent),
}

impl StreamFrame {
    pub fn into_event(self) -> KlineStreamEvent {
        match self {
            Self::Combined { data, .. } => data,
            Self::Raw(event) => event,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct KlineStreamEvent {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: i64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "k"))]
    pub kline: KlineEvent,
}

#[derive(Deserialize, Debug)]
pub struct KlineEvent {
    #[serde(rename(deserialize = "t"))]
    pub start_time: i64,
    #[serde(rename(deserialize = "T"))]
    pub close_time: i64,
    #[serde(rename(deserialize = "i"))]
    pub interval: String,
    #[serde(rename(deserialize = "o"))]
    pub open_price: String,
    #[serde(rename(deserialize = "c"))]
    pub close_price: String,
    #[serde(rename(deserialize = "h"))]
    pub high_price: String,
    #[serde(rename(deserialize = "l"))]
    pub low_price: String,
    // Upper-case `L` is the last trade id, not the low.
    #[serde(rename(deserialize = "L"))]
    pub last_trade_id: i64,
    #[serde(rename(deserialize = "v"))]
    pub volume: String,
    #[serde(rename(deserialize = "x"))]
    pub is_closed: bool,
}

impl KlineStreamEvent {
    /// `Ok(None)` while the bar is still open.
    pub fn to_candle(&self) -> Result<Option<Candle>, DecodeError> {
        if self.event_type != "kline" {
            return Err(DecodeError::UnexpectedEvent(self.event_type.clone()));
        }
        if !self.kline.is_closed {
            return Ok(None);
        }

        let event_time = DateTime::from_timestamp_millis(self.event_time)
            .ok_or(DecodeError::InvalidTimestamp(self.event_time))?;

        Ok(Some(Candle {
            symbol: self.symbol.clone(),
            interval: self.kline.interval.clone(),
            open: parse_decimal("open", &self.kline.open_price)?,
            high: parse_decimal("high", &self.kline.high_price)?,
            low: parse_decimal("low", &self.kline.low_price)?,
            close: parse_decimal("close", &self.kline.close_price)?,
            volume: parse_decimal("volume", &self.kline.volume)?,
            event_time,
        }))
    }
}

/// Decodes one text frame into a closed candle, if it carries one.
pub fn decode_kline_message(text: &str) -> Result<Option<Candle>, DecodeError> {
    let frame: StreamFrame = serde_json::from_str(text)?;
    frame.into_event().to_candle()
}

fn parse_decimal(field: &'static str, value: &str) -> Result<f64, DecodeError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}
