use thiserror::Error;

use scout_core::ScoutError;

/// Errors raised by the TTL cache and its durable tier.
///
/// Durable-tier failures never reach callers of `TtlCache` read or write
/// paths; they are logged and treated as a miss. They surface only from the
/// `DurableStore` API itself.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("durable store error: {0}")]
    Storage(String),

    #[error("cache lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<CacheError> for ScoutError {
    fn from(err: CacheError) -> Self {
        ScoutError::Cache(err.to_string())
    }
}
