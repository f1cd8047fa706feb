//! Bounded chain log scanner.
//!
//! A scan covers one `[from, to]` batch window with `to` capped at
//! `from + max_blocks_per_run - 1` and at the chain head. Most RPCs accept a
//! single indexed-parameter filter set per `eth_getLogs` call, so a scan may
//! fan out into one call per topic-filter combination; results are merged
//! and de-duplicated by `(tx_hash, log_index)`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethers::types::{Address, Filter, Log, ValueOrArray, H256};
use tracing::{debug, warn};

use crate::client::ChainClient;
use crate::error::{ChainError, ChainResult};

/// One indexed-parameter filter combination for `eth_getLogs`
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    /// Event signatures (topic0); multiple signatures share one call
    pub signatures: Vec<H256>,

    /// First indexed parameter, when filtered
    pub topic1: Option<H256>,

    /// Second indexed parameter, when filtered
    pub topic2: Option<H256>,
}

impl TopicFilter {
    /// Filter on event signatures only
    #[must_use]
    pub fn signatures(signatures: Vec<H256>) -> Self {
        Self {
            signatures,
            topic1: None,
            topic2: None,
        }
    }

    /// Restrict the first indexed parameter
    #[must_use]
    pub fn with_topic1(mut self, topic: H256) -> Self {
        self.topic1 = Some(topic);
        self
    }

    /// Restrict the second indexed parameter
    #[must_use]
    pub fn with_topic2(mut self, topic: H256) -> Self {
        self.topic2 = Some(topic);
        self
    }
}

/// Left-pad an address to a 32-byte topic, per the chain's indexed-parameter
/// encoding
#[must_use]
pub fn address_topic(address: Address) -> H256 {
    H256::from(address)
}

/// Compute the bounded batch window for a run.
///
/// Returns `None` when the chain has not advanced past `from` yet (no-op
/// tick for the caller).
#[must_use]
pub fn batch_window(from: u64, head: u64, max_blocks_per_run: u64) -> Option<(u64, u64)> {
    if from > head {
        return None;
    }
    let span = max_blocks_per_run.max(1);
    let to = from.saturating_add(span - 1).min(head);
    Some((from, to))
}

/// Bounded log scanner over a [`ChainClient`]
pub struct LogScanner {
    client: Arc<dyn ChainClient>,
}

impl LogScanner {
    /// Create a scanner over a chain client
    #[must_use]
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    /// Scan one contract for the given filter combinations over `[from, to]`.
    ///
    /// Runs one `eth_getLogs` per combination, merges the results, drops
    /// duplicates by `(tx_hash, log_index)`, and returns logs sorted by
    /// `(block_number, log_index)`.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid range or any failing RPC call; a failing
    /// call fails the scan as a whole, partial results are never returned.
    pub async fn scan(
        &self,
        address: Address,
        filters: &[TopicFilter],
        from: u64,
        to: u64,
    ) -> ChainResult<Vec<Log>> {
        if from > to {
            return Err(ChainError::InvalidRange { from, to });
        }

        let mut seen: HashSet<(H256, u64)> = HashSet::new();
        let mut merged: Vec<Log> = Vec::new();

        for topic_filter in filters {
            let mut filter = Filter::new()
                .address(address)
                .from_block(from)
                .to_block(to)
                .topic0(ValueOrArray::Array(topic_filter.signatures.clone()));

            if let Some(topic1) = topic_filter.topic1 {
                filter = filter.topic1(topic1);
            }
            if let Some(topic2) = topic_filter.topic2 {
                filter = filter.topic2(topic2);
            }

            let logs = self.client.get_logs(&filter).await?;
            debug!(
                contract = %address,
                from,
                to,
                count = logs.len(),
                "fetched log batch"
            );

            for log in logs {
                let Some(key) = log_key(&log) else {
                    warn!(contract = %address, "skipping log without tx hash / log index");
                    continue;
                };
                if seen.insert(key) {
                    merged.push(log);
                }
            }
        }

        merged.sort_by_key(|log| {
            (
                log.block_number.map_or(u64::MAX, |n| n.as_u64()),
                log.log_index.map_or(u64::MAX, |i| i.as_u64()),
            )
        });

        Ok(merged)
    }
}

/// Natural key of a mined log
#[must_use]
pub fn log_key(log: &Log) -> Option<(H256, u64)> {
    let tx_hash = log.transaction_hash?;
    let log_index = log.log_index?.as_u64();
    Some((tx_hash, log_index))
}

/// Per-batch memo of block timestamps.
///
/// A batch usually holds several logs from the same block; the timestamp is
/// fetched once per unique block number and reused for its siblings.
#[derive(Default)]
pub struct BlockTimestamps {
    cache: HashMap<u64, DateTime<Utc>>,
}

impl BlockTimestamps {
    /// Create an empty memo
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of `block`, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns error if the timestamp fetch fails.
    pub async fn get(
        &mut self,
        client: &dyn ChainClient,
        block: u64,
    ) -> ChainResult<DateTime<Utc>> {
        if let Some(ts) = self.cache.get(&block) {
            return Ok(*ts);
        }
        let ts = client.block_timestamp(block).await?;
        self.cache.insert(block, ts);
        Ok(ts)
    }
}
