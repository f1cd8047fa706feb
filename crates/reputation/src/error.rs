//! Reputation engine error system.

use thiserror::Error;

use chainwatch_storage::error::StorageError;

/// Reputation result type for all operations
pub type ReputationResult<T> = Result<T, ReputationError>;

/// Main error type for reputation operations
#[derive(Error, Debug)]
pub enum ReputationError {
    /// Store errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Snapshot persistence failed after the configured retry attempts
    #[error("Failed to persist score snapshot for '{subject_id}' after {attempts} attempts: {reason}")]
    SnapshotExhausted {
        /// Scored subject
        subject_id: String,
        /// Attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },
}

impl ReputationError {
    /// Check if a later run may succeed where this one failed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::SnapshotExhausted { .. } => true,
        }
    }
}
