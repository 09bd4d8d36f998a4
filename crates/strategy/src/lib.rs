pub mod error;
pub mod indicators;
pub mod services;
pub mod signal;

pub use error::StrategyError;
pub use indicators::IndicatorSnapshot;
pub use services::strategy_service::{Evaluation, StrategyService};
pub use signal::SignalThresholds;
