pub mod paper_trading;
pub mod pipeline;
pub mod publisher;
pub mod ws_server;
