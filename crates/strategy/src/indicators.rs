//! Trailing-window indicators over closes.
//!
//! Both functions expect `window` ordered oldest first and return `0.0` when
//! the window is too short to compute the value.

use ta::Next;
use ta::indicators::SimpleMovingAverage;

use common::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub sma: f64,
    pub rsi: f64,
}

impl IndicatorSnapshot {
    pub fn compute(window: &[Candle], period: usize) -> Self {
        Self {
            sma: moving_average(window, period),
            rsi: relative_strength(window, period),
        }
    }
}

/// Arithmetic mean of the last `period` closes.
pub fn moving_average(window: &[Candle], period: usize) -> f64 {
    if period == 0 || window.len() < period {
        return 0.0;
    }

    let Ok(mut sma) = SimpleMovingAverage::new(period) else {
        return 0.0;
    };

    window[window.len() - period..]
        .iter()
        .fold(0.0, |_, candle| sma.next(candle.close))
}

/// Simple-average RSI over the last `period` close-to-close moves.
///
/// Gains and losses are plain sums divided by `period` (no Wilder smoothing).
/// A window without any losing move reads 100.
pub fn relative_strength(window: &[Candle], period: usize) -> f64 {
    if period == 0 || window.len() < period + 1 {
        return 0.0;
    }

    let (gains, losses) = window[window.len() - period - 1..].windows(2).fold(
        (0.0, 0.0),
        |(gains, losses), pair| {
            let change = pair[1].close - pair[0].close;
            if change > 0.0 {
                (gains + change, losses)
            } else {
                (gains, losses - change)
            }
        },
    );

    if losses == 0.0 {
        return 100.0;
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    let rs = avg_gain / avg_loss;

    100.0 - (100.0 / (1.0 + rs))
}
