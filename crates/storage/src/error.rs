use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("[Query] {0}")]
    Query(#[from] sqlx::Error),

    #[error("[Io] {0}")]
    Io(#[from] std::io::Error),

    #[error("{op} did not complete within {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("Wallet {0} not found")]
    WalletNotFound(String),

    #[error("Stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

pub type Result<T> = std::result::Result<T, StorageError>;
