pub mod strategy_service;
