//! Log processors: decode a raw log and apply it to storage.
//!
//! One processor per watched contract. A processor is pure application
//! logic; the scan window, timestamp resolution, and cursor handling all
//! live in the job layer.

pub mod escrow;
pub mod registry;
pub mod transfers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, Log};

use chainwatch_chain::scanner::TopicFilter;

use crate::error::IndexerResult;

pub use escrow::EscrowProcessor;
pub use registry::RegistryProcessor;
pub use transfers::TransferProcessor;

/// What applying one log did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Log was new; rows were written
    Processed,
    /// Log was seen in an earlier run; nothing was written
    AlreadySeen,
}

/// Decode-and-apply logic for one watched contract.
///
/// `process` must be idempotent under re-delivery: applying the same log
/// twice writes once and returns [`Applied::AlreadySeen`] the second time.
/// Aggregate updates derived from a log are only applied when its ledger
/// row was freshly inserted.
#[async_trait]
pub trait LogProcessor: Send + Sync {
    /// Contract address this processor watches
    fn contract(&self) -> Address;

    /// Topic filter combinations to scan with
    fn filters(&self) -> Vec<TopicFilter>;

    /// Decode one log and apply it to storage.
    ///
    /// # Errors
    ///
    /// Decode errors mean the log is skippable; storage errors abort the
    /// run so the cursor stays behind the failed write.
    async fn process(&self, log: &Log, timestamp: DateTime<Utc>) -> IndexerResult<Applied>;
}
