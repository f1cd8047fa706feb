//! Domain types for the Chainwatch indexing and reputation layers.
//!
//! Token amounts are `U256` base units (6-decimal USDC-style) end to end.
//! Aggregate math is unsigned 256-bit integer arithmetic; floats appear only
//! in reputation scores, which are unitless values in `[0, 100]`.

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Escrow session lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionEventType {
    /// Session opened
    Create,
    /// Funds deposited into the session
    Deposit,
    /// Funds released to the serving agent
    Release,
    /// Funds refunded to the owner
    Refund,
    /// Session closed
    Close,
    /// Execution authorized for the session
    Authorize,
    /// Execution authorization revoked
    Revoke,
}

impl SessionEventType {
    /// Stable string form used for persistence
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Deposit => "DEPOSIT",
            Self::Release => "RELEASE",
            Self::Refund => "REFUND",
            Self::Close => "CLOSE",
            Self::Authorize => "AUTHORIZE",
            Self::Revoke => "REVOKE",
        }
    }

    /// Parse the stable string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(Self::Create),
            "DEPOSIT" => Some(Self::Deposit),
            "RELEASE" => Some(Self::Release),
            "REFUND" => Some(Self::Refund),
            "CLOSE" => Some(Self::Close),
            "AUTHORIZE" => Some(Self::Authorize),
            "REVOKE" => Some(Self::Revoke),
            _ => None,
        }
    }
}

/// An escrow session with its running balance aggregates.
///
/// `deposited` and `released` are derived from the `SessionEvent` ledger by
/// atomic increments; the indexer does not enforce
/// `released <= deposited <= max_spend` at write time, it only logs
/// violations (the chain is the source of truth).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSession {
    /// Session identifier (bytes32 on chain, hex-encoded)
    pub session_id: String,

    /// Session owner (payer)
    pub owner: Address,

    /// Serving escrow agent
    pub escrow_agent: Address,

    /// Maximum spend authorized for the session
    pub max_spend: U256,

    /// Session expiry
    pub expiry: DateTime<Utc>,

    /// Running total of deposits
    pub deposited: U256,

    /// Running total of releases
    pub released: U256,

    /// False once a `SessionClosed` event is indexed
    pub is_active: bool,

    /// Block timestamp of the creating event
    pub created_at: DateTime<Utc>,

    /// Transaction that created the session
    pub created_tx_hash: H256,

    /// Block that created the session
    pub created_block: u64,
}

/// Append-only ledger row: one chain event, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session the event belongs to
    pub session_id: String,

    /// Event kind
    pub event_type: SessionEventType,

    /// Acting address, when the event carries one
    pub actor: Option<Address>,

    /// Amount, for value-bearing events
    pub amount: Option<U256>,

    /// Execution identifier, for authorize/revoke events
    pub execution_id: Option<H256>,

    /// Block timestamp
    pub timestamp: DateTime<Utc>,

    /// Emitting transaction
    pub tx_hash: H256,

    /// Log index within the transaction's block
    pub log_index: u64,

    /// Emitting block
    pub block_number: u64,
}

impl SessionEvent {
    /// Natural key used for idempotent inserts
    #[must_use]
    pub const fn natural_key(&self) -> (H256, u64) {
        (self.tx_hash, self.log_index)
    }
}

/// Kind of an indexed on-chain transaction row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// ERC-20 token transfer touching the escrow contract
    Transfer,
    /// Agent registry entry
    AgentRegistration,
    /// Feedback submitted against an agent
    Feedback,
}

impl TransactionType {
    /// Stable string form used for persistence
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transfer => "TRANSFER",
            Self::AgentRegistration => "AGENT_REGISTRATION",
            Self::Feedback => "FEEDBACK",
        }
    }

    /// Parse the stable string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TRANSFER" => Some(Self::Transfer),
            "AGENT_REGISTRATION" => Some(Self::AgentRegistration),
            "FEEDBACK" => Some(Self::Feedback),
            _ => None,
        }
    }
}

/// Confirmation status of an indexed transaction row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Mined and observed in a log
    Confirmed,
    /// Observed then dropped by a reorg (kept for operator tooling)
    Orphaned,
}

impl TransactionStatus {
    /// Stable string form used for persistence
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Orphaned => "ORPHANED",
        }
    }
}

/// Indexed on-chain transaction ledger row.
///
/// Natural key is `(tx_hash, log_index)`: several transfers can share one
/// transaction, each with its own log index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainTransaction {
    /// Transaction hash
    pub tx_hash: H256,

    /// Log index within the block
    pub log_index: u64,

    /// Sender
    pub from_address: Address,

    /// Recipient
    pub to_address: Address,

    /// Transferred value in token base units
    pub value: U256,

    /// Row kind
    pub tx_type: TransactionType,

    /// Confirmation status
    pub status: TransactionStatus,

    /// Block timestamp
    pub timestamp: DateTime<Utc>,

    /// Emitting block number
    pub block_number: u64,

    /// Emitting block hash
    pub block_hash: H256,

    /// Opaque extension payload; business logic is never decoded out of it
    pub metadata: serde_json::Value,
}

impl OnChainTransaction {
    /// Natural key used for idempotent inserts
    #[must_use]
    pub const fn natural_key(&self) -> (H256, u64) {
        (self.tx_hash, self.log_index)
    }
}

/// Per-agent earnings aggregate, incremented on release events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEarnings {
    /// Earning agent
    pub agent: Address,

    /// Total released to the agent, in token base units
    pub total_earned: U256,

    /// Number of release events credited
    pub sessions_served: u64,

    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one payment, as recorded by the settlement layer.
///
/// Read-only input to the reputation engine; this layer never writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    /// Scored subject (service or agent identifier)
    pub subject_id: String,

    /// Terminal status
    pub status: PaymentStatus,

    /// Observed settlement latency in milliseconds
    pub latency_ms: u64,

    /// Paying address
    pub payer: Address,

    /// Payment amount in token base units
    pub amount: U256,

    /// Settlement time
    pub occurred_at: DateTime<Utc>,
}

/// Terminal status of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Settled successfully
    Succeeded,
    /// Failed terminally
    Failed,
    /// Timed out before settlement
    TimedOut,
}

/// Aggregated payment metrics for one subject, recomputed per scoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationMetrics {
    /// Total payments observed
    pub total_payments: u64,

    /// Successful payments
    pub successful_payments: u64,

    /// Failed payments
    pub failed_payments: u64,

    /// Timed-out payments
    pub timeout_payments: u64,

    /// Mean settlement latency in milliseconds
    pub avg_latency_ms: f64,

    /// Median settlement latency in milliseconds
    pub median_latency_ms: f64,

    /// 95th-percentile settlement latency in milliseconds
    pub p95_latency_ms: f64,

    /// Distinct paying addresses
    pub unique_payers: u64,

    /// Payers with more than one payment
    pub repeat_customers: u64,

    /// Total volume in token base units
    pub total_volume: U256,

    /// Earliest payment time
    pub first_payment_at: Option<DateTime<Utc>>,

    /// Latest payment time
    pub last_payment_at: Option<DateTime<Utc>>,
}

/// Computed reputation snapshot for one subject.
///
/// Upserted (superseded in place) on each run; `calculation_version` tags
/// the algorithm revision that produced the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationScore {
    /// Scored subject
    pub subject_id: String,

    /// Composite score in `[0, 100]`
    pub reputation_score: f64,

    /// Raw success ratio in `[0, 1]`
    pub success_rate: f64,

    /// Penalty-weighted reliability component in `[0, 100]`
    pub reliability_score: f64,

    /// Latency component in `[0, 100]`
    pub speed_score: f64,

    /// Volume component in `[0, 100]`
    pub volume_score: f64,

    /// Inactivity decay multiplier in `[0.5, 1.0]`
    pub recency_weight: f64,

    /// Computation time
    pub calculated_at: DateTime<Utc>,

    /// Algorithm revision that produced this row
    pub calculation_version: u32,
}
