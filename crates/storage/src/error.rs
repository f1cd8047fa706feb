//! Storage error system.
//!
//! Transient database errors abort the current indexing run cleanly; the
//! cursor stays put and the next scheduled tick retries the same window.

use thiserror::Error;

/// Storage result type for all operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Main error type for store and cache operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Configuration errors
    #[error("Storage configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Database operation errors
    #[error("Database operation failed: {operation} - {reason}")]
    Database {
        /// Operation that failed
        operation: String,
        /// Reason for failure
        reason: String,
    },

    /// Cache operation errors
    #[error("Cache operation failed: {operation} - {reason}")]
    Cache {
        /// Operation that failed
        operation: String,
        /// Reason for failure
        reason: String,
    },

    /// Referenced entity does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind
        entity: String,
        /// Lookup key
        key: String,
    },

    /// Value encoding errors (amount/address round trips)
    #[error("Encoding error for {field}: {reason}")]
    Encoding {
        /// Field being encoded or decoded
        field: String,
        /// Reason for failure
        reason: String,
    },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `PostgreSQL` errors
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl StorageError {
    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create database error
    pub fn database(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create cache error
    pub fn cache(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cache {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create not-found error
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Create encoding error
    pub fn encoding(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encoding {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable on a later tick
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Database { .. } | Self::Cache { .. } | Self::Postgres(_) => true,
            Self::Configuration { .. }
            | Self::NotFound { .. }
            | Self::Encoding { .. }
            | Self::Serialization(_) => false,
        }
    }
}
