use chrono::{DateTime, Utc};

use common::models::{SignalAction, TradeSignal};

use crate::error::StrategyError;

/// RSI bands. Values strictly below `oversold` buy, strictly above
/// `overbought` sell, everything else holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalThresholds {
    oversold: f64,
    overbought: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl SignalThresholds {
    pub fn new(oversold: f64, overbought: f64) -> Result<Self, StrategyError> {
        if oversold.is_nan() || overbought.is_nan() || oversold >= overbought {
            return Err(StrategyError::ThresholdOrder {
                oversold,
                overbought,
            });
        }
        Ok(Self {
            oversold,
            overbought,
        })
    }

    pub fn decide(
        &self,
        symbol: &str,
        price: f64,
        timestamp: DateTime<Utc>,
        rsi: f64,
    ) -> TradeSignal {
        let (action, reason) = if rsi < self.oversold {
            (
                SignalAction::Buy,
                format!("RSI oversold ({:.2} < {})", rsi, self.oversold),
            )
        } else if rsi > self.overbought {
            (
                SignalAction::Sell,
                format!("RSI overbought ({:.2} > {})", rsi, self.overbought),
            )
        } else {
            (SignalAction::Hold, format!("RSI neutral ({:.2})", rsi))
        };

        TradeSignal {
            symbol: symbol.to_string(),
            action,
            price,
            timestamp,
            reason,
        }
    }
}

/// [`SignalThresholds::decide`] with the default 30/70 bands.
pub fn decide(symbol: &str, price: f64, timestamp: DateTime<Utc>, rsi: f64) -> TradeSignal {
    SignalThresholds::default().decide(symbol, price, timestamp, rsi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_for(rsi: f64) -> SignalAction {
        decide("BTCUSDT", 100.0, Utc::now(), rsi).action
    }

    #[test]
    fn boundaries_are_strict() {
        assert_eq!(action_for(30.0), SignalAction::Hold);
        assert_eq!(action_for(29.999), SignalAction::Buy);
        assert_eq!(action_for(70.0), SignalAction::Hold);
        assert_eq!(action_for(70.001), SignalAction::Sell);
        assert_eq!(action_for(50.0), SignalAction::Hold);
    }

    #[test]
    fn extremes_map_to_trades() {
        assert_eq!(action_for(0.0), SignalAction::Buy);
        assert_eq!(action_for(100.0), SignalAction::Sell);
        assert_eq!(action_for(f64::NAN), SignalAction::Hold);
    }

    #[test]
    fn signal_carries_price_time_and_reason() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let signal = decide("ETHUSDT", 2500.5, at, 21.4321);

        assert_eq!(signal.symbol, "ETHUSDT");
        assert_eq!(signal.price, 2500.5);
        assert_eq!(signal.timestamp, at);
        assert_eq!(signal.reason, "RSI oversold (21.43 < 30)");
        assert!(signal.is_actionable());
    }

    #[test]
    fn sell_reason_cites_rsi() {
        let signal = decide("BTCUSDT", 1.0, Utc::now(), 85.0);
        assert_eq!(signal.reason, "RSI overbought (85.00 > 70)");
    }

    #[test]
    fn custom_bands_must_be_ordered() {
        assert!(SignalThresholds::new(20.0, 80.0).is_ok());
        assert_eq!(
            SignalThresholds::new(70.0, 30.0),
            Err(StrategyError::ThresholdOrder {
                oversold: 70.0,
                overbought: 30.0
            })
        );
        assert!(SignalThresholds::new(f64::NAN, 70.0).is_err());
    }
}
