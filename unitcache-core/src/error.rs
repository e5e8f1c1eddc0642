use thiserror::Error;

use crate::types::ExecutionId;

/// Failures of a data unit itself: creating, loading or releasing it.
#[derive(Debug, Error)]
pub enum DataUnitError {
    #[error("can't create data unit '{name}': {reason}")]
    Create { name: String, reason: String },

    #[error("can't load data unit '{name}': {reason}")]
    Load { name: String, reason: String },

    #[error("can't release data unit '{name}': {reason}")]
    Release { name: String, reason: String },

    #[error("data unit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("data unit storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The locator could not compute where a data unit lives.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("working directory is not configured")]
    MissingWorkingDir,

    #[error("no working directory for execution {execution_id}: {reason}")]
    Unavailable {
        execution_id: ExecutionId,
        reason: String,
    },
}

/// Errors surfaced to callers of the lease cache.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("can't open resource '{key}': {source}")]
    ResourceOpen {
        key: String,
        #[source]
        source: DataUnitError,
    },
}

impl From<LocateError> for LeaseError {
    fn from(err: LocateError) -> Self {
        LeaseError::InvalidArgument(err.to_string())
    }
}

/// The shared per-execution repository pool failed.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("can't release repository for execution {execution_id}: {reason}")]
    Release {
        execution_id: ExecutionId,
        reason: String,
    },

    #[error("repository storage is unavailable: {0}")]
    Unavailable(String),
}
