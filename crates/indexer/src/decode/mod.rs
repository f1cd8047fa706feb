//! Event decoders.
//!
//! One decoder per event signature. Each decoder receives a raw log plus
//! that log's block timestamp and returns a typed domain event or a decode
//! error. A decode error for one log never aborts its siblings in the same
//! batch.

pub mod escrow;
pub mod registry;
pub mod transfer;

use chrono::{DateTime, Utc};
use ethers::types::{Address, Log, H256, U256};

use crate::error::{IndexerError, IndexerResult};

/// Chain coordinates of a mined log, shared by every decoder
#[derive(Debug, Clone, Copy)]
pub struct LogMeta {
    /// Emitting transaction
    pub tx_hash: H256,

    /// Log index within the block
    pub log_index: u64,

    /// Emitting block number
    pub block_number: u64,

    /// Emitting block hash
    pub block_hash: H256,

    /// Block timestamp
    pub timestamp: DateTime<Utc>,
}

impl LogMeta {
    /// Extract coordinates from a mined log.
    ///
    /// # Errors
    ///
    /// Returns a decode error for pending logs (missing block or tx data).
    pub fn try_from_log(log: &Log, timestamp: DateTime<Utc>) -> IndexerResult<Self> {
        Ok(Self {
            tx_hash: log
                .transaction_hash
                .ok_or_else(|| IndexerError::decode("log", "missing transaction hash"))?,
            log_index: log
                .log_index
                .ok_or_else(|| IndexerError::decode("log", "missing log index"))?
                .as_u64(),
            block_number: log
                .block_number
                .ok_or_else(|| IndexerError::decode("log", "missing block number"))?
                .as_u64(),
            block_hash: log
                .block_hash
                .ok_or_else(|| IndexerError::decode("log", "missing block hash"))?,
            timestamp,
        })
    }
}

/// Event signature topic for a canonical signature string
#[must_use]
pub fn event_topic(signature: &str) -> H256 {
    H256::from(ethers::utils::keccak256(signature.as_bytes()))
}

/// Indexed address parameter from a topic (right-most 20 bytes)
pub(crate) fn topic_address(event: &str, log: &Log, index: usize) -> IndexerResult<Address> {
    let topic = log
        .topics
        .get(index)
        .ok_or_else(|| IndexerError::decode(event, format!("missing topic {index}")))?;
    Ok(Address::from_slice(&topic.as_bytes()[12..]))
}

/// Indexed bytes32 parameter from a topic
pub(crate) fn topic_bytes32(event: &str, log: &Log, index: usize) -> IndexerResult<H256> {
    log.topics
        .get(index)
        .copied()
        .ok_or_else(|| IndexerError::decode(event, format!("missing topic {index}")))
}

/// Session identifiers are bytes32 on chain, persisted hex-encoded
#[must_use]
pub fn session_id_string(raw: H256) -> String {
    format!("{raw:#x}")
}

/// Decode the non-indexed data section against expected parameter types
pub(crate) fn decode_data(
    event: &str,
    log: &Log,
    params: &[ethers::abi::ParamType],
) -> IndexerResult<Vec<ethers::abi::Token>> {
    ethers::abi::decode(params, log.data.as_ref())
        .map_err(|e| IndexerError::decode(event, e.to_string()))
}

pub(crate) fn token_uint(
    event: &str,
    token: Option<ethers::abi::Token>,
    field: &str,
) -> IndexerResult<U256> {
    token
        .and_then(ethers::abi::Token::into_uint)
        .ok_or_else(|| IndexerError::decode(event, format!("expected uint for {field}")))
}

pub(crate) fn token_string(
    event: &str,
    token: Option<ethers::abi::Token>,
    field: &str,
) -> IndexerResult<String> {
    token
        .and_then(ethers::abi::Token::into_string)
        .ok_or_else(|| IndexerError::decode(event, format!("expected string for {field}")))
}

/// Convert a uint256 seconds timestamp from event data
pub(crate) fn uint_timestamp(event: &str, value: U256) -> IndexerResult<DateTime<Utc>> {
    if value > U256::from(i64::MAX) {
        return Err(IndexerError::decode(event, "timestamp out of range"));
    }
    let secs = i64::try_from(value.low_u64())
        .map_err(|_| IndexerError::decode(event, "timestamp out of range"))?;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| IndexerError::decode(event, "timestamp out of range"))
}
