//! Storage layer error types

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage errors
///
/// Only `Unavailable` is fatal to a whole calculation run; every other
/// variant is surfaced as a per-metric failure by the engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown logical data-source name
    #[error("Unknown data source: {0}")]
    UnknownSource(String),

    /// Unknown logical field on a known data source
    ///
    /// The field is `source_name`, not `source`: thiserror reserves
    /// `source` for the error-source chain.
    #[error("Unknown field '{field}' on data source '{source_name}'")]
    UnknownField { source_name: String, field: String },

    /// Query-level failure (bad statement, decode error, constraint)
    #[error("Query error: {0}")]
    Query(String),

    /// Store-wide outage (pool closed, connection refused)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether this error should abort the whole run rather than fail
    /// one metric
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    pub fn unknown_field(source_name: impl Into<String>, field: impl Into<String>) -> Self {
        StoreError::UnknownField {
            source_name: source_name.into(),
            field: field.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
