pub mod candle;
pub mod signal;
pub mod wallet;

pub use candle::Candle;
pub use signal::{SignalAction, TradeSignal};
pub use wallet::{Wallet, WalletUpdate};
