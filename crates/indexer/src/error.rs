//! Indexer error system.
//!
//! Decode errors on individual logs are logged and skipped without failing
//! the batch. Every other mid-run error aborts the run with the cursor
//! untouched; the next scheduled tick retries the same window. No error in
//! one job ever propagates into another job's schedule.

use thiserror::Error;

use chainwatch_chain::error::ChainError;
use chainwatch_storage::error::StorageError;

/// Indexer result type for all operations
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Main error type for indexing operations
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Chain RPC errors
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Store errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Log decode errors; skipped per log, never fatal for the batch
    #[error("Failed to decode {event} log: {reason}")]
    Decode {
        /// Event signature being decoded
        event: String,
        /// Reason for failure
        reason: String,
    },

    /// Job lifecycle errors
    #[error("Indexer job '{job}' failed: {reason}")]
    Job {
        /// Job name
        job: String,
        /// Reason for failure
        reason: String,
    },
}

impl IndexerError {
    /// Create decode error
    pub fn decode(event: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            event: event.into(),
            reason: reason.into(),
        }
    }

    /// Create job error
    pub fn job(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Job {
            job: job.into(),
            reason: reason.into(),
        }
    }

    /// Check if the next scheduled tick may succeed where this run failed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Chain(e) => e.is_retryable(),
            Self::Storage(e) => e.is_retryable(),
            Self::Decode { .. } => false,
            Self::Job { .. } => true,
        }
    }
}
