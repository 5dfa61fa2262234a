use thiserror::Error;

use crate::FailPoint;

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("stored date is malformed: {0}")]
    Date(#[from] chrono::ParseError),

    #[error("lock poisoned: {0}")]
    Poisoned(String),

    #[error("injected failure at {0:?}")]
    Injected(FailPoint),

    #[error("{0}")]
    Other(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned(err.to_string())
    }
}
