pub mod market_gateway;
