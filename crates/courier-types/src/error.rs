use thiserror::Error;
use tracing::error;

/// Every failure a store operation can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing or malformed input. Fix the input and retry.
    #[error("{0}")]
    Validation(String),

    /// The email is already registered.
    #[error("{0}")]
    Conflict(String),

    /// Unknown email or wrong password. Deliberately does not say which.
    #[error("invalid email or password")]
    Authentication,

    #[error("{0}")]
    NotFound(String),

    /// The persistence layer failed. The source is kept for logs only.
    #[error("internal storage failure")]
    Storage(#[source] anyhow::Error),
}

impl StoreError {
    /// Wrap an infrastructure failure, logging the full chain once.
    pub fn storage(err: anyhow::Error) -> Self {
        error!("storage failure: {:#}", err);
        Self::Storage(err)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
