//! Escrow contract event decoders.
//!
//! Event schemas are a fixed external contract:
//!
//! - `SessionCreated(bytes32 indexed sessionId, address indexed owner,
//!   address indexed escrowAgent, uint256 maxSpend, uint256 expiry)`
//! - `FundsDeposited(bytes32 indexed sessionId, address indexed depositor,
//!   uint256 amount)`
//! - `FundsReleased(bytes32 indexed sessionId, address indexed recipient,
//!   uint256 amount)`
//! - `FundsRefunded(bytes32 indexed sessionId, address indexed recipient,
//!   uint256 amount)`
//! - `SessionClosed(bytes32 indexed sessionId, address indexed closedBy)`
//! - `ExecutionAuthorized(bytes32 indexed sessionId, bytes32 indexed
//!   executionId, address indexed executor)`
//! - `AuthorizationRevoked(bytes32 indexed sessionId, bytes32 indexed
//!   executionId)`

use chrono::{DateTime, Utc};
use ethers::abi::ParamType;
use ethers::types::{Address, Log, H256, U256};

use crate::decode::{
    decode_data, event_topic, token_uint, topic_address, topic_bytes32, uint_timestamp,
};
use crate::error::{IndexerError, IndexerResult};

pub const SESSION_CREATED: &str = "SessionCreated(bytes32,address,address,uint256,uint256)";
pub const FUNDS_DEPOSITED: &str = "FundsDeposited(bytes32,address,uint256)";
pub const FUNDS_RELEASED: &str = "FundsReleased(bytes32,address,uint256)";
pub const FUNDS_REFUNDED: &str = "FundsRefunded(bytes32,address,uint256)";
pub const SESSION_CLOSED: &str = "SessionClosed(bytes32,address)";
pub const EXECUTION_AUTHORIZED: &str = "ExecutionAuthorized(bytes32,bytes32,address)";
pub const AUTHORIZATION_REVOKED: &str = "AuthorizationRevoked(bytes32,bytes32)";

/// All escrow event signature topics, in one scan filter
#[must_use]
pub fn signatures() -> Vec<H256> {
    [
        SESSION_CREATED,
        FUNDS_DEPOSITED,
        FUNDS_RELEASED,
        FUNDS_REFUNDED,
        SESSION_CLOSED,
        EXECUTION_AUTHORIZED,
        AUTHORIZATION_REVOKED,
    ]
    .iter()
    .map(|sig| event_topic(sig))
    .collect()
}

/// Typed escrow session lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowEvent {
    /// New session opened
    SessionCreated {
        /// Session identifier (raw bytes32)
        session_id: H256,
        /// Session owner
        owner: Address,
        /// Serving agent
        escrow_agent: Address,
        /// Maximum authorized spend
        max_spend: U256,
        /// Session expiry
        expiry: DateTime<Utc>,
    },
    /// Funds deposited into a session
    FundsDeposited {
        /// Session identifier
        session_id: H256,
        /// Depositing address
        depositor: Address,
        /// Deposited amount
        amount: U256,
    },
    /// Funds released to the agent
    FundsReleased {
        /// Session identifier
        session_id: H256,
        /// Receiving address
        recipient: Address,
        /// Released amount
        amount: U256,
    },
    /// Funds refunded to the owner
    FundsRefunded {
        /// Session identifier
        session_id: H256,
        /// Receiving address
        recipient: Address,
        /// Refunded amount
        amount: U256,
    },
    /// Session closed
    SessionClosed {
        /// Session identifier
        session_id: H256,
        /// Closing address
        closed_by: Address,
    },
    /// Execution authorized against a session
    ExecutionAuthorized {
        /// Session identifier
        session_id: H256,
        /// Execution identifier
        execution_id: H256,
        /// Authorized executor
        executor: Address,
    },
    /// Execution authorization revoked
    AuthorizationRevoked {
        /// Session identifier
        session_id: H256,
        /// Execution identifier
        execution_id: H256,
    },
}

/// Decode one escrow contract log into a typed event.
///
/// # Errors
///
/// Returns a decode error for unknown signatures or malformed topics/data;
/// the caller logs and skips without failing the batch.
pub fn decode_escrow_log(log: &Log) -> IndexerResult<EscrowEvent> {
    let signature = log
        .topics
        .first()
        .copied()
        .ok_or_else(|| IndexerError::decode("escrow", "log has no topics"))?;

    if signature == event_topic(SESSION_CREATED) {
        let mut data = decode_data(
            SESSION_CREATED,
            log,
            &[ParamType::Uint(256), ParamType::Uint(256)],
        )?
        .into_iter();
        let max_spend = token_uint(SESSION_CREATED, data.next(), "maxSpend")?;
        let expiry_raw = token_uint(SESSION_CREATED, data.next(), "expiry")?;
        Ok(EscrowEvent::SessionCreated {
            session_id: topic_bytes32(SESSION_CREATED, log, 1)?,
            owner: topic_address(SESSION_CREATED, log, 2)?,
            escrow_agent: topic_address(SESSION_CREATED, log, 3)?,
            max_spend,
            expiry: uint_timestamp(SESSION_CREATED, expiry_raw)?,
        })
    } else if signature == event_topic(FUNDS_DEPOSITED) {
        let mut data = decode_data(FUNDS_DEPOSITED, log, &[ParamType::Uint(256)])?.into_iter();
        Ok(EscrowEvent::FundsDeposited {
            session_id: topic_bytes32(FUNDS_DEPOSITED, log, 1)?,
            depositor: topic_address(FUNDS_DEPOSITED, log, 2)?,
            amount: token_uint(FUNDS_DEPOSITED, data.next(), "amount")?,
        })
    } else if signature == event_topic(FUNDS_RELEASED) {
        let mut data = decode_data(FUNDS_RELEASED, log, &[ParamType::Uint(256)])?.into_iter();
        Ok(EscrowEvent::FundsReleased {
            session_id: topic_bytes32(FUNDS_RELEASED, log, 1)?,
            recipient: topic_address(FUNDS_RELEASED, log, 2)?,
            amount: token_uint(FUNDS_RELEASED, data.next(), "amount")?,
        })
    } else if signature == event_topic(FUNDS_REFUNDED) {
        let mut data = decode_data(FUNDS_REFUNDED, log, &[ParamType::Uint(256)])?.into_iter();
        Ok(EscrowEvent::FundsRefunded {
            session_id: topic_bytes32(FUNDS_REFUNDED, log, 1)?,
            recipient: topic_address(FUNDS_REFUNDED, log, 2)?,
            amount: token_uint(FUNDS_REFUNDED, data.next(), "amount")?,
        })
    } else if signature == event_topic(SESSION_CLOSED) {
        Ok(EscrowEvent::SessionClosed {
            session_id: topic_bytes32(SESSION_CLOSED, log, 1)?,
            closed_by: topic_address(SESSION_CLOSED, log, 2)?,
        })
    } else if signature == event_topic(EXECUTION_AUTHORIZED) {
        Ok(EscrowEvent::ExecutionAuthorized {
            session_id: topic_bytes32(EXECUTION_AUTHORIZED, log, 1)?,
            execution_id: topic_bytes32(EXECUTION_AUTHORIZED, log, 2)?,
            executor: topic_address(EXECUTION_AUTHORIZED, log, 3)?,
        })
    } else if signature == event_topic(AUTHORIZATION_REVOKED) {
        Ok(EscrowEvent::AuthorizationRevoked {
            session_id: topic_bytes32(AUTHORIZATION_REVOKED, log, 1)?,
            execution_id: topic_bytes32(AUTHORIZATION_REVOKED, log, 2)?,
        })
    } else {
        Err(IndexerError::decode(
            "escrow",
            format!("unknown signature {signature:#x}"),
        ))
    }
}
