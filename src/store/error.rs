//! Store-level error types

use diesel_async::pooled_connection::PoolError;
use thiserror::Error;

/// Errors raised by a [`Store`](super::Store) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same key already exists
    #[error("Duplicate key in {collection}: {key}")]
    Conflict { collection: String, key: String },

    /// Replace or remove matched no row
    #[error("Row {key} in {collection} no longer exists")]
    StaleRecord { collection: String, key: String },

    /// Remove rejected because dependents still reference the row
    #[error("Row {key} in {collection} is still referenced by {dependent}")]
    Referenced {
        collection: String,
        key: String,
        dependent: String,
    },

    /// The request could not be expressed against this backend
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A record did not have the expected JSON shape
    #[error("Malformed record in {collection}: {reason}")]
    MalformedRecord { collection: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// The backing store could not hand out a connection
    #[error("Store unavailable")]
    Unavailable {
        #[source]
        source: anyhow::Error,
    },
}

impl StoreError {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    pub fn malformed(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}

impl From<bb8::RunError<PoolError>> for StoreError {
    fn from(error: bb8::RunError<PoolError>) -> Self {
        Self::Unavailable {
            source: anyhow::Error::new(error),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
