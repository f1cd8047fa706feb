//! ERC-20 transfer processor for the escrow-backed payment token.
//!
//! Only transfers touching the escrow contract matter, so the scan runs
//! two filter combinations against the token contract: `from == escrow`
//! and `to == escrow`. A self-transfer would match both; the scanner's
//! `(tx_hash, log_index)` dedupe collapses it to one log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, Log};
use serde_json::json;

use chainwatch_chain::scanner::{address_topic, TopicFilter};
use chainwatch_core::types::{OnChainTransaction, TransactionStatus, TransactionType};
use chainwatch_storage::stores::TransactionStore;

use crate::decode::transfer::{decode_transfer_log, transfer_topic};
use crate::decode::LogMeta;
use crate::error::IndexerResult;
use crate::process::{Applied, LogProcessor};

/// Applies payment-token transfer events to the transaction ledger
pub struct TransferProcessor {
    token_address: Address,
    escrow_address: Address,
    transactions: Arc<dyn TransactionStore>,
}

impl TransferProcessor {
    /// Create a processor for `token_address` transfers touching
    /// `escrow_address`
    pub fn new(
        token_address: Address,
        escrow_address: Address,
        transactions: Arc<dyn TransactionStore>,
    ) -> Self {
        Self {
            token_address,
            escrow_address,
            transactions,
        }
    }
}

#[async_trait]
impl LogProcessor for TransferProcessor {
    fn contract(&self) -> Address {
        self.token_address
    }

    fn filters(&self) -> Vec<TopicFilter> {
        let escrow = address_topic(self.escrow_address);
        vec![
            TopicFilter::signatures(vec![transfer_topic()]).with_topic1(escrow),
            TopicFilter::signatures(vec![transfer_topic()]).with_topic2(escrow),
        ]
    }

    async fn process(&self, log: &Log, timestamp: DateTime<Utc>) -> IndexerResult<Applied> {
        let meta = LogMeta::try_from_log(log, timestamp)?;
        let transfer = decode_transfer_log(log)?;

        let row = OnChainTransaction {
            tx_hash: meta.tx_hash,
            log_index: meta.log_index,
            from_address: transfer.from,
            to_address: transfer.to,
            value: transfer.value,
            tx_type: TransactionType::Transfer,
            status: TransactionStatus::Confirmed,
            timestamp: meta.timestamp,
            block_number: meta.block_number,
            block_hash: meta.block_hash,
            metadata: json!({ "token": format!("{:#x}", self.token_address) }),
        };

        let outcome = self.transactions.insert_transaction(&row).await?;
        Ok(if outcome.inserted() {
            Applied::Processed
        } else {
            Applied::AlreadySeen
        })
    }
}
