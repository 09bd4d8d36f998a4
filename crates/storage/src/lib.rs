pub mod db;
pub mod error;
pub mod repositories;
pub mod traits;

pub use error::StorageError;
pub use repositories::{CandlesRepository, WalletRepository};
pub use traits::{CandleStore, WalletStore};
