//! ERC-20 `Transfer(address indexed from, address indexed to, uint256
//! value)` decoder.

use ethers::abi::ParamType;
use ethers::types::{Address, Log, H256, U256};

use crate::decode::{decode_data, event_topic, token_uint, topic_address};
use crate::error::{IndexerError, IndexerResult};

pub const TRANSFER: &str = "Transfer(address,address,uint256)";

/// The `Transfer` signature topic
#[must_use]
pub fn transfer_topic() -> H256 {
    event_topic(TRANSFER)
}

/// Typed token transfer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer {
    /// Sender
    pub from: Address,

    /// Recipient
    pub to: Address,

    /// Transferred value in token base units
    pub value: U256,
}

/// Decode one ERC-20 transfer log.
///
/// # Errors
///
/// Returns a decode error for a wrong signature or malformed topics/data.
pub fn decode_transfer_log(log: &Log) -> IndexerResult<TokenTransfer> {
    let signature = log
        .topics
        .first()
        .copied()
        .ok_or_else(|| IndexerError::decode(TRANSFER, "log has no topics"))?;
    if signature != transfer_topic() {
        return Err(IndexerError::decode(
            TRANSFER,
            format!("unknown signature {signature:#x}"),
        ));
    }

    let mut data = decode_data(TRANSFER, log, &[ParamType::Uint(256)])?.into_iter();
    Ok(TokenTransfer {
        from: topic_address(TRANSFER, log, 1)?,
        to: topic_address(TRANSFER, log, 2)?,
        value: token_uint(TRANSFER, data.next(), "value")?,
    })
}
