//! Store traits for the indexed record model.
//!
//! The indexing layer is the sole writer of cursors, sessions, session
//! events, and on-chain transactions; the reputation layer is the sole
//! writer of score snapshots. Payment outcomes are written by the
//! settlement layer and read-only here. Correctness across concurrently
//! running jobs relies on this disjoint ownership, not on cross-job
//! transactions.

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};

use chainwatch_core::types::{
    AgentEarnings, EscrowSession, OnChainTransaction, PaymentOutcome, ReputationScore,
    SessionEvent,
};

use crate::error::StorageResult;

/// Result of an idempotent insert against a natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Row was written
    Inserted,
    /// Row already existed; nothing was written
    AlreadySeen,
}

impl UpsertOutcome {
    /// True when the row was actually written
    #[must_use]
    pub const fn inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Per-job scan cursor persistence.
///
/// `get` returning `None` means the job has never completed a run; callers
/// pick a safe starting block (deployment block or `head - lookback`), never
/// genesis. `set` must be called strictly after all writes for the scanned
/// range succeeded: re-scanning after a crash re-applies idempotently, but a
/// cursor advanced past unwritten events silently skips them.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last fully processed block for a named job
    async fn get(&self, name: &str) -> StorageResult<Option<u64>>;

    /// Advance the cursor; implementations never move it backward
    async fn set(&self, name: &str, block: u64) -> StorageResult<()>;
}

/// Escrow sessions, their append-only event ledger, and derived aggregates.
///
/// Aggregate increments are NOT idempotent, so every increment rides inside
/// the same atomic unit as its ledger-row insert: `AlreadySeen` skips the
/// increment, and a failure mid-operation leaves neither the row nor the
/// increment behind. A ledger row can never exist without its aggregate
/// effect, which is what makes crash-recovery re-scans safe.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Idempotently insert a session created by a chain event
    async fn insert_session(&self, session: &EscrowSession) -> StorageResult<UpsertOutcome>;

    /// Fetch a session by identifier
    async fn get_session(&self, session_id: &str) -> StorageResult<Option<EscrowSession>>;

    /// Idempotently append a ledger row, keyed by `(tx_hash, log_index)`.
    ///
    /// For rows with no aggregate effect (create, refund, authorize,
    /// revoke); deposit, release, and close rows go through their
    /// `record_*` counterparts.
    async fn append_event(&self, event: &SessionEvent) -> StorageResult<UpsertOutcome>;

    /// Ledger rows for a session, ordered by `(block_number, log_index)`
    async fn session_events(&self, session_id: &str) -> StorageResult<Vec<SessionEvent>>;

    /// Atomically append a deposit ledger row and increment the session's
    /// deposited aggregate. `amount` matches the row's amount field.
    async fn record_deposit(
        &self,
        event: &SessionEvent,
        amount: U256,
    ) -> StorageResult<UpsertOutcome>;

    /// Atomically append a release ledger row, increment the session's
    /// released aggregate, and credit the serving agent's earnings.
    async fn record_release(
        &self,
        event: &SessionEvent,
        amount: U256,
        agent: Address,
    ) -> StorageResult<UpsertOutcome>;

    /// Atomically append a close ledger row and flip `is_active` to false
    async fn record_close(&self, event: &SessionEvent) -> StorageResult<UpsertOutcome>;

    /// Fetch an agent's earnings aggregate
    async fn agent_earnings(&self, agent: Address) -> StorageResult<Option<AgentEarnings>>;
}

/// Indexed on-chain transaction ledger
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Idempotently insert a row, keyed by `(tx_hash, log_index)`
    async fn insert_transaction(&self, tx: &OnChainTransaction) -> StorageResult<UpsertOutcome>;

    /// Fetch a row by its natural key
    async fn get_transaction(
        &self,
        tx_hash: H256,
        log_index: u64,
    ) -> StorageResult<Option<OnChainTransaction>>;

    /// Total rows indexed
    async fn transaction_count(&self) -> StorageResult<u64>;
}

/// Read-only access to payment outcome records written by the settlement
/// layer
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// All payment outcomes for a subject, ordered by occurrence time
    async fn payments_for_subject(&self, subject_id: &str) -> StorageResult<Vec<PaymentOutcome>>;

    /// Every subject with at least one payment outcome
    async fn active_subjects(&self) -> StorageResult<Vec<String>>;
}

/// Reputation score snapshots and ranking materialization
#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Supersede the stored snapshot for a subject
    async fn upsert_score(&self, score: &ReputationScore) -> StorageResult<()>;

    /// Fetch the stored snapshot for a subject
    async fn get_score(&self, subject_id: &str) -> StorageResult<Option<ReputationScore>>;

    /// Refresh the downstream ranking materialization
    async fn refresh_rankings(&self) -> StorageResult<()>;
}
