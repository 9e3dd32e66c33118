use thiserror::Error;

use crate::routes::Route;

/// Failures of the local offline machinery. Connectivity problems are not
/// errors at this level: they are absorbed into cache, default or queue results.
#[derive(Debug, Error)]
pub enum OfflineError {
    #[error("local database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no offline default registered for route {0:?}")]
    MissingDefault(Route),

    /// A DELETE (or other non-queueable write) could not reach the backend.
    #[error("offline: {method} {path} was deferred, not deleted")]
    NotApplied { method: String, path: String },

    #[error("corrupt local record: {0}")]
    Corrupt(String),
}

impl OfflineError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// The distinguishable "deferred, not deleted" signal.
    pub fn is_not_applied(&self) -> bool {
        matches!(self, Self::NotApplied { .. })
    }
}

pub type OfflineResult<T> = Result<T, OfflineError>;
