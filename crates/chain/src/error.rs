//! Chain boundary error system.
//!
//! RPC failures surface to the calling job as a whole-run failure, never as
//! partial results; the job's next scheduled tick retries the same window.

use std::time::Duration;
use thiserror::Error;

/// Chain result type for all RPC-facing operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Main error type for chain RPC operations
#[derive(Error, Debug)]
pub enum ChainError {
    /// RPC provider errors
    #[error("RPC call failed: {operation} - {reason}")]
    Rpc {
        /// RPC operation that failed
        operation: String,
        /// Reason for failure
        reason: String,
    },

    /// Underlying provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    /// Timeout errors
    #[error("RPC operation timed out after {duration:?}: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration before timeout
        duration: Duration,
    },

    /// Requested data is missing on the node (pruned or not yet mined)
    #[error("Block {block} not available from provider")]
    BlockUnavailable {
        /// Missing block number
        block: u64,
    },

    /// Invalid scan range
    #[error("Invalid block range: from {from} > to {to}")]
    InvalidRange {
        /// Range start
        from: u64,
        /// Range end
        to: u64,
    },

    /// Configuration errors (bad endpoint URL and similar)
    #[error("Chain configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },
}

impl ChainError {
    /// Create RPC error
    pub fn rpc(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rpc {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if error is retryable on a later tick
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc { .. }
            | Self::Provider(_)
            | Self::Timeout { .. }
            | Self::BlockUnavailable { .. } => true,
            Self::InvalidRange { .. } | Self::Configuration { .. } => false,
        }
    }
}
