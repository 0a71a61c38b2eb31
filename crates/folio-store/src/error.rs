use folio_core::LifecycleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("write lost a race: {0}")]
    Conflict(String),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[cfg(feature = "duckdb")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
