use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum StrategyError {
    #[error("Indicator period must be at least 1")]
    ZeroPeriod,

    #[error("Oversold threshold {oversold} must be below overbought threshold {overbought}")]
    ThresholdOrder { oversold: f64, overbought: f64 },
}
