//! Agent and feedback registry processor.
//!
//! Registrations and feedback carry no token value; both land as
//! zero-value rows in the transaction ledger with their payload in the
//! metadata column.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, Log, U256};
use serde_json::json;

use chainwatch_chain::scanner::TopicFilter;
use chainwatch_core::types::{OnChainTransaction, TransactionStatus, TransactionType};
use chainwatch_storage::stores::TransactionStore;

use crate::decode::registry::{decode_registry_log, signatures, RegistryEvent};
use crate::decode::LogMeta;
use crate::error::IndexerResult;
use crate::process::{Applied, LogProcessor};

/// Applies registry contract events to the transaction ledger
pub struct RegistryProcessor {
    registry_address: Address,
    transactions: Arc<dyn TransactionStore>,
}

impl RegistryProcessor {
    /// Create a processor for the registry contract at `registry_address`
    pub fn new(registry_address: Address, transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            registry_address,
            transactions,
        }
    }
}

#[async_trait]
impl LogProcessor for RegistryProcessor {
    fn contract(&self) -> Address {
        self.registry_address
    }

    fn filters(&self) -> Vec<TopicFilter> {
        vec![TopicFilter::signatures(signatures())]
    }

    async fn process(&self, log: &Log, timestamp: DateTime<Utc>) -> IndexerResult<Applied> {
        let meta = LogMeta::try_from_log(log, timestamp)?;

        let row = match decode_registry_log(log)? {
            RegistryEvent::AgentRegistered {
                agent,
                metadata_uri,
            } => OnChainTransaction {
                tx_hash: meta.tx_hash,
                log_index: meta.log_index,
                from_address: agent,
                to_address: self.registry_address,
                value: U256::zero(),
                tx_type: TransactionType::AgentRegistration,
                status: TransactionStatus::Confirmed,
                timestamp: meta.timestamp,
                block_number: meta.block_number,
                block_hash: meta.block_hash,
                metadata: json!({ "metadata_uri": metadata_uri }),
            },
            RegistryEvent::FeedbackSubmitted {
                agent,
                reviewer,
                rating,
                comment,
            } => OnChainTransaction {
                tx_hash: meta.tx_hash,
                log_index: meta.log_index,
                from_address: reviewer,
                to_address: agent,
                value: U256::zero(),
                tx_type: TransactionType::Feedback,
                status: TransactionStatus::Confirmed,
                timestamp: meta.timestamp,
                block_number: meta.block_number,
                block_hash: meta.block_hash,
                metadata: json!({ "rating": rating, "comment": comment }),
            },
        };

        let outcome = self.transactions.insert_transaction(&row).await?;
        Ok(if outcome.inserted() {
            Applied::Processed
        } else {
            Applied::AlreadySeen
        })
    }
}
