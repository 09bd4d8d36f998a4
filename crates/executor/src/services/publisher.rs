use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::trace;

use common::models::{Candle, TradeSignal, WalletUpdate};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("[Json] {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Kline,
    Signals,
    Wallet,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Kline, Topic::Signals, Topic::Wallet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kline => "kline",
            Self::Signals => "signals",
            Self::Wallet => "wallet",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Kline => 0,
            Self::Signals => 1,
            Self::Wallet => 2,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast side of the pipeline. Publishing never waits on subscribers.
#[cfg_attr(test, mockall::automock)]
pub trait EventPublisher: Send + Sync {
    fn publish_candle(&self, candle: &Candle) -> Result<(), PublishError>;
    fn publish_signal(&self, signal: &TradeSignal) -> Result<(), PublishError>;
    fn publish_wallet(&self, update: &WalletUpdate) -> Result<(), PublishError>;
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    channel: &'static str,
    data: &'a T,
}

/// One broadcast channel per topic carrying `{"channel", "data"}` JSON text.
#[derive(Clone)]
pub struct BroadcastPublisher {
    channels: [broadcast::Sender<String>; 3],
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        Self {
            channels: Topic::ALL.map(|_| broadcast::channel(CHANNEL_CAPACITY).0),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<String> {
        self.channels[topic.index()].subscribe()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels[topic.index()].receiver_count()
    }

    fn publish<T: Serialize>(&self, topic: Topic, data: &T) -> Result<(), PublishError> {
        let message = serde_json::to_string(&Envelope {
            channel: topic.as_str(),
            data,
        })?;
        // No subscribers is not a failure, the event is simply dropped.
        let delivered = self.channels[topic.index()].send(message).unwrap_or(0);
        trace!("Published to {} ({} receivers)", topic, delivered);
        Ok(())
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish_candle(&self, candle: &Candle) -> Result<(), PublishError> {
        self.publish(Topic::Kline, candle)
    }

    fn publish_signal(&self, signal: &TradeSignal) -> Result<(), PublishError> {
        self.publish(Topic::Signals, signal)
    }

    fn publish_wallet(&self, update: &WalletUpdate) -> Result<(), PublishError> {
        self.publish(Topic::Wallet, update)
    }
}
