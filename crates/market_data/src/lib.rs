pub mod backoff;
pub mod error;
pub mod remote;
pub mod services;
pub mod traits;

pub use backoff::ReconnectPolicy;
pub use error::{DecodeError, GatewayError, SinkClosed};
pub use services::market_gateway::MarketGateway;
pub use traits::CandleSink;
