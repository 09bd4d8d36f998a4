use tracing::debug;

use common::models::{Candle, TradeSignal};

use crate::error::StrategyError;
use crate::indicators::IndicatorSnapshot;
use crate::signal::SignalThresholds;

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Not enough history yet, expected while the store warms up.
    Warmup { available: usize, required: usize },
    Decided {
        snapshot: IndicatorSnapshot,
        signal: TradeSignal,
    },
}

/// RSI/SMA threshold strategy over a trailing candle window.
#[derive(Debug, Clone)]
pub struct StrategyService {
    period: usize,
    thresholds: SignalThresholds,
}

impl StrategyService {
    pub fn new(period: usize) -> Result<Self, StrategyError> {
        if period == 0 {
            return Err(StrategyError::ZeroPeriod);
        }
        Ok(Self {
            period,
            thresholds: SignalThresholds::default(),
        })
    }

    pub fn with_thresholds(mut self, thresholds: SignalThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Fewer than `period` candles is a soft stop. At exactly `period` the
    /// RSI is still its "not computable" zero and the signal reads as oversold.
    pub fn required_history(&self) -> usize {
        self.period
    }

    /// Evaluates `latest` against `window`, which must be ordered oldest first
    /// and end with `latest`.
    pub fn evaluate(&self, latest: &Candle, window: &[Candle]) -> Evaluation {
        let required = self.required_history();
        if window.len() < required {
            return Evaluation::Warmup {
                available: window.len(),
                required,
            };
        }

        let snapshot = IndicatorSnapshot::compute(window, self.period);
        debug!(
            "{}: close={:.2} RSI({})={:.2} SMA({})={:.2}",
            latest.symbol, latest.close, self.period, snapshot.rsi, self.period, snapshot.sma
        );

        let signal = self.thresholds.decide(
            &latest.symbol,
            latest.close,
            latest.event_time,
            snapshot.rsi,
        );

        Evaluation::Decided { snapshot, signal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use common::models::SignalAction;

    fn series(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "BTCUSDT".to_string(),
                interval: "1m".to_string(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
                event_time: DateTime::from_timestamp_millis(i as i64 * 60_000).unwrap(),
            })
            .collect()
    }

    fn decided_action(evaluation: &Evaluation) -> SignalAction {
        match evaluation {
            Evaluation::Decided { signal, .. } => signal.action,
            other => panic!("expected a decision, got {other:?}"),
        }
    }

    #[test]
    fn zero_period_is_rejected() {
        assert_eq!(StrategyService::new(0).unwrap_err(), StrategyError::ZeroPeriod);
    }

    #[test]
    fn warms_up_below_period() {
        let strategy = StrategyService::new(3).unwrap();
        let window = series(&[10.0, 9.0]);

        assert_eq!(
            strategy.evaluate(window.last().unwrap(), &window),
            Evaluation::Warmup {
                available: 2,
                required: 3
            }
        );
    }

    #[test]
    fn window_of_period_buys_on_rsi_zero() {
        // Three closes are two moves, so RSI(3) falls back to 0.
        let strategy = StrategyService::new(3).unwrap();
        let window = series(&[100.0, 101.0, 102.0]);

        match strategy.evaluate(window.last().unwrap(), &window) {
            Evaluation::Decided { snapshot, signal } => {
                assert_eq!(snapshot.rsi, 0.0);
                assert_eq!(signal.action, SignalAction::Buy);
                assert_eq!(signal.price, 102.0);
            }
            other => panic!("expected a decision, got {other:?}"),
        }
    }

    #[test]
    fn falling_closes_buy_rising_closes_sell() {
        let strategy = StrategyService::new(3).unwrap();

        let falling = series(&[10.0, 9.0, 8.0, 7.0]);
        assert_eq!(
            decided_action(&strategy.evaluate(falling.last().unwrap(), &falling)),
            SignalAction::Buy
        );

        let rising = series(&[7.0, 8.0, 9.0, 10.0]);
        assert_eq!(
            decided_action(&strategy.evaluate(rising.last().unwrap(), &rising)),
            SignalAction::Sell
        );
    }

    #[test]
    fn signal_is_priced_at_latest_close() {
        let strategy = StrategyService::new(3).unwrap();
        let window = series(&[10.0, 12.0, 12.0, 11.0]);
        let latest = window.last().unwrap();

        match strategy.evaluate(latest, &window) {
            Evaluation::Decided { snapshot, signal } => {
                assert_eq!(signal.action, SignalAction::Hold);
                assert_eq!(signal.price, 11.0);
                assert_eq!(signal.timestamp, latest.event_time);
                assert!((snapshot.sma - 35.0 / 3.0).abs() < 1e-9);
            }
            other => panic!("expected a decision, got {other:?}"),
        }
    }

    #[test]
    fn custom_thresholds_apply() {
        // RSI here is 66.67, a sell only with a tighter upper band.
        let strategy = StrategyService::new(3)
            .unwrap()
            .with_thresholds(SignalThresholds::new(40.0, 60.0).unwrap());
        let window = series(&[10.0, 12.0, 12.0, 11.0]);

        assert_eq!(
            decided_action(&strategy.evaluate(window.last().unwrap(), &window)),
            SignalAction::Sell
        );
    }
}
