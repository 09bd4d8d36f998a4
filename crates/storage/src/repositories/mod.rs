pub mod candles_repo;
pub mod wallet_repo;

pub use candles_repo::CandlesRepository;
pub use wallet_repo::WalletRepository;
