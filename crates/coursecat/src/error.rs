//! Facade error types.

use coursecat_core::ErrorKind;
use thiserror::Error;

/// Service errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Engine error.
    #[error(transparent)]
    Engine(#[from] coursecat_core::Error),

    /// Database open or maintenance failure.
    #[error("database error: {0}")]
    Database(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Engine error kind, if this is an engine error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Engine(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Check if the error is a lost optimistic-concurrency race.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Engine(e) if e.is_retryable())
    }
}
