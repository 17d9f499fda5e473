//! Error taxonomy for the warmup engine.
//!
//! Lookup misses (unknown pool address, unknown thread) are not errors; they
//! surface as `Ok(None)` or an ignored outcome.

use thiserror::Error;

/// Errors raised by the warmup engine.
#[derive(Debug, Error)]
pub enum WarmupError {
    /// Missing secret or credential; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed webhook headers or payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// Webhook signature did not verify.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// No eligible pooled address for one side of a send.
    #[error("{0}")]
    EmptyPool(String),

    /// The email-delivery provider rejected a send.
    #[error("provider error: {0}")]
    Provider(String),

    /// A store read or write failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for WarmupError {
    fn from(err: sqlx::Error) -> Self {
        WarmupError::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for WarmupError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        WarmupError::Persistence(err.to_string())
    }
}

impl From<reqwest::Error> for WarmupError {
    fn from(err: reqwest::Error) -> Self {
        WarmupError::Provider(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WarmupError>;
