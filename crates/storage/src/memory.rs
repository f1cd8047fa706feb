//! In-memory store implementation.
//!
//! Backs tests and degraded local development runs with the same trait
//! surface as the PostgreSQL store. All maps live behind one lock; no await
//! point ever holds it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, H256, U256};
use parking_lot::RwLock;
use tracing::warn;

use chainwatch_core::types::{
    AgentEarnings, EscrowSession, OnChainTransaction, PaymentOutcome, ReputationScore,
    SessionEvent,
};

use crate::error::{StorageError, StorageResult};
use crate::stores::{
    CursorStore, PaymentStore, ReputationStore, SessionStore, TransactionStore, UpsertOutcome,
};

#[derive(Default)]
struct Inner {
    cursors: HashMap<String, u64>,
    sessions: HashMap<String, EscrowSession>,
    session_events: HashMap<(H256, u64), SessionEvent>,
    transactions: HashMap<(H256, u64), OnChainTransaction>,
    earnings: HashMap<Address, AgentEarnings>,
    payments: HashMap<String, Vec<PaymentOutcome>>,
    scores: HashMap<String, ReputationScore>,
    ranking_refreshes: u64,
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a payment outcome (settlement layer stand-in for tests and
    /// backfills)
    pub fn push_payment(&self, payment: PaymentOutcome) {
        let mut inner = self.inner.write();
        inner
            .payments
            .entry(payment.subject_id.clone())
            .or_default()
            .push(payment);
    }

    /// Number of ranking refreshes triggered so far
    #[must_use]
    pub fn ranking_refreshes(&self) -> u64 {
        self.inner.read().ranking_refreshes
    }

    /// Number of session event ledger rows
    #[must_use]
    pub fn session_event_count(&self) -> u64 {
        self.inner.read().session_events.len() as u64
    }
}

fn checked_add(current: U256, amount: U256, field: &str) -> StorageResult<U256> {
    current
        .checked_add(amount)
        .ok_or_else(|| StorageError::encoding(field, "aggregate overflow"))
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get(&self, name: &str) -> StorageResult<Option<u64>> {
        Ok(self.inner.read().cursors.get(name).copied())
    }

    async fn set(&self, name: &str, block: u64) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let entry = inner.cursors.entry(name.to_string()).or_insert(block);
        if block < *entry {
            warn!(
                name,
                block,
                stored = *entry,
                "ignoring backward cursor move"
            );
        } else {
            *entry = block;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &EscrowSession) -> StorageResult<UpsertOutcome> {
        let mut inner = self.inner.write();
        if inner.sessions.contains_key(&session.session_id) {
            return Ok(UpsertOutcome::AlreadySeen);
        }
        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn get_session(&self, session_id: &str) -> StorageResult<Option<EscrowSession>> {
        Ok(self.inner.read().sessions.get(session_id).cloned())
    }

    async fn append_event(&self, event: &SessionEvent) -> StorageResult<UpsertOutcome> {
        let mut inner = self.inner.write();
        let key = event.natural_key();
        if inner.session_events.contains_key(&key) {
            return Ok(UpsertOutcome::AlreadySeen);
        }
        inner.session_events.insert(key, event.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn session_events(&self, session_id: &str) -> StorageResult<Vec<SessionEvent>> {
        let inner = self.inner.read();
        let mut events: Vec<SessionEvent> = inner
            .session_events
            .values()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn record_deposit(
        &self,
        event: &SessionEvent,
        amount: U256,
    ) -> StorageResult<UpsertOutcome> {
        let mut inner = self.inner.write();
        let key = event.natural_key();
        if inner.session_events.contains_key(&key) {
            return Ok(UpsertOutcome::AlreadySeen);
        }
        // One lock scope: the ledger row and the increment land together
        // or not at all.
        let session = inner
            .sessions
            .get_mut(&event.session_id)
            .ok_or_else(|| StorageError::not_found("EscrowSession", &event.session_id))?;
        session.deposited = checked_add(session.deposited, amount, "deposited")?;
        inner.session_events.insert(key, event.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn record_release(
        &self,
        event: &SessionEvent,
        amount: U256,
        agent: Address,
    ) -> StorageResult<UpsertOutcome> {
        let mut inner = self.inner.write();
        let key = event.natural_key();
        if inner.session_events.contains_key(&key) {
            return Ok(UpsertOutcome::AlreadySeen);
        }
        let released = {
            let session = inner
                .sessions
                .get(&event.session_id)
                .ok_or_else(|| StorageError::not_found("EscrowSession", &event.session_id))?;
            checked_add(session.released, amount, "released")?
        };
        let total_earned = checked_add(
            inner
                .earnings
                .get(&agent)
                .map_or_else(U256::zero, |e| e.total_earned),
            amount,
            "total_earned",
        )?;
        // All sums computed; now apply everything under the one lock.
        if let Some(session) = inner.sessions.get_mut(&event.session_id) {
            session.released = released;
        }
        let entry = inner.earnings.entry(agent).or_insert_with(|| AgentEarnings {
            agent,
            total_earned: U256::zero(),
            sessions_served: 0,
            updated_at: Utc::now(),
        });
        entry.total_earned = total_earned;
        entry.sessions_served += 1;
        entry.updated_at = Utc::now();
        inner.session_events.insert(key, event.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn record_close(&self, event: &SessionEvent) -> StorageResult<UpsertOutcome> {
        let mut inner = self.inner.write();
        let key = event.natural_key();
        if inner.session_events.contains_key(&key) {
            return Ok(UpsertOutcome::AlreadySeen);
        }
        let session = inner
            .sessions
            .get_mut(&event.session_id)
            .ok_or_else(|| StorageError::not_found("EscrowSession", &event.session_id))?;
        session.is_active = false;
        inner.session_events.insert(key, event.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn agent_earnings(&self, agent: Address) -> StorageResult<Option<AgentEarnings>> {
        Ok(self.inner.read().earnings.get(&agent).cloned())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, tx: &OnChainTransaction) -> StorageResult<UpsertOutcome> {
        let mut inner = self.inner.write();
        let key = tx.natural_key();
        if inner.transactions.contains_key(&key) {
            return Ok(UpsertOutcome::AlreadySeen);
        }
        inner.transactions.insert(key, tx.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn get_transaction(
        &self,
        tx_hash: H256,
        log_index: u64,
    ) -> StorageResult<Option<OnChainTransaction>> {
        Ok(self
            .inner
            .read()
            .transactions
            .get(&(tx_hash, log_index))
            .cloned())
    }

    async fn transaction_count(&self) -> StorageResult<u64> {
        Ok(self.inner.read().transactions.len() as u64)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn payments_for_subject(&self, subject_id: &str) -> StorageResult<Vec<PaymentOutcome>> {
        let inner = self.inner.read();
        let mut payments = inner.payments.get(subject_id).cloned().unwrap_or_default();
        payments.sort_by_key(|p| p.occurred_at);
        Ok(payments)
    }

    async fn active_subjects(&self) -> StorageResult<Vec<String>> {
        let inner = self.inner.read();
        let mut subjects: Vec<String> = inner.payments.keys().cloned().collect();
        subjects.sort();
        Ok(subjects)
    }
}

#[async_trait]
impl ReputationStore for MemoryStore {
    async fn upsert_score(&self, score: &ReputationScore) -> StorageResult<()> {
        self.inner
            .write()
            .scores
            .insert(score.subject_id.clone(), score.clone());
        Ok(())
    }

    async fn get_score(&self, subject_id: &str) -> StorageResult<Option<ReputationScore>> {
        Ok(self.inner.read().scores.get(subject_id).cloned())
    }

    async fn refresh_rankings(&self) -> StorageResult<()> {
        self.inner.write().ranking_refreshes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwatch_core::types::SessionEventType;

    fn sample_session(id: &str) -> EscrowSession {
        EscrowSession {
            session_id: id.to_string(),
            owner: Address::repeat_byte(0x01),
            escrow_agent: Address::repeat_byte(0x02),
            max_spend: U256::from(10_000_000u64),
            expiry: Utc::now(),
            deposited: U256::zero(),
            released: U256::zero(),
            is_active: true,
            created_at: Utc::now(),
            created_tx_hash: H256::repeat_byte(0xaa),
            created_block: 100,
        }
    }

    fn sample_event(
        session_id: &str,
        event_type: SessionEventType,
        tx_byte: u8,
        log_index: u64,
    ) -> SessionEvent {
        SessionEvent {
            session_id: session_id.to_string(),
            event_type,
            actor: Some(Address::repeat_byte(0x01)),
            amount: Some(U256::from(1_000_000u64)),
            execution_id: None,
            timestamp: Utc::now(),
            tx_hash: H256::repeat_byte(tx_byte),
            log_index,
            block_number: 101,
        }
    }

    #[tokio::test]
    async fn cursor_never_moves_backward() {
        let store = MemoryStore::new();
        CursorStore::set(&store, "escrow-sessions", 100).await.unwrap();
        CursorStore::set(&store, "escrow-sessions", 90).await.unwrap();
        assert_eq!(
            CursorStore::get(&store, "escrow-sessions").await.unwrap(),
            Some(100)
        );
        CursorStore::set(&store, "escrow-sessions", 150).await.unwrap();
        assert_eq!(
            CursorStore::get(&store, "escrow-sessions").await.unwrap(),
            Some(150)
        );
    }

    #[tokio::test]
    async fn missing_cursor_means_never_run() {
        let store = MemoryStore::new();
        assert_eq!(CursorStore::get(&store, "token-transfers").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ledger_rows_dedupe_by_natural_key() {
        let store = MemoryStore::new();
        store.insert_session(&sample_session("s1")).await.unwrap();

        let event = sample_event("s1", SessionEventType::Refund, 0xbb, 0);
        assert_eq!(
            store.append_event(&event).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.append_event(&event).await.unwrap(),
            UpsertOutcome::AlreadySeen
        );

        // Same tx, different log index: a distinct row.
        let sibling = sample_event("s1", SessionEventType::Refund, 0xbb, 1);
        assert_eq!(
            store.append_event(&sibling).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(store.session_events("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deposits_land_with_their_ledger_row_exactly_once() {
        let store = MemoryStore::new();
        store.insert_session(&sample_session("s1")).await.unwrap();

        let event = sample_event("s1", SessionEventType::Deposit, 0xbb, 0);
        assert_eq!(
            store
                .record_deposit(&event, U256::from(3_000_000u64))
                .await
                .unwrap(),
            UpsertOutcome::Inserted
        );
        // Re-applying the same chain event changes nothing.
        assert_eq!(
            store
                .record_deposit(&event, U256::from(3_000_000u64))
                .await
                .unwrap(),
            UpsertOutcome::AlreadySeen
        );

        let sibling = sample_event("s1", SessionEventType::Deposit, 0xbb, 1);
        store
            .record_deposit(&sibling, U256::from(2_500_000u64))
            .await
            .unwrap();

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.deposited, U256::from(5_500_000u64));
        assert_eq!(store.session_event_count(), 2);
    }

    #[tokio::test]
    async fn failed_deposit_record_leaves_no_ledger_row() {
        let store = MemoryStore::new();

        // Unknown session: the operation must not write a ledger row either,
        // or a later re-scan would dedupe away the increment forever.
        let event = sample_event("ghost", SessionEventType::Deposit, 0xbb, 0);
        let err = store
            .record_deposit(&event, U256::from(1_250_000u64))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert_eq!(store.session_event_count(), 0);

        // Once the session exists, the same event applies in full.
        store.insert_session(&sample_session("ghost")).await.unwrap();
        assert_eq!(
            store
                .record_deposit(&event, U256::from(1_250_000u64))
                .await
                .unwrap(),
            UpsertOutcome::Inserted
        );
        let session = store.get_session("ghost").await.unwrap().unwrap();
        assert_eq!(session.deposited, U256::from(1_250_000u64));
        assert_eq!(store.session_event_count(), 1);
    }

    #[tokio::test]
    async fn releases_credit_session_and_agent_together() {
        let store = MemoryStore::new();
        let agent = Address::repeat_byte(0x02);
        store.insert_session(&sample_session("s1")).await.unwrap();

        let first = sample_event("s1", SessionEventType::Release, 0xcc, 0);
        store
            .record_release(&first, U256::from(700_000u64), agent)
            .await
            .unwrap();
        let second = sample_event("s1", SessionEventType::Release, 0xcc, 1);
        store
            .record_release(&second, U256::from(300_000u64), agent)
            .await
            .unwrap();
        // Replay credits nothing twice.
        assert_eq!(
            store
                .record_release(&second, U256::from(300_000u64), agent)
                .await
                .unwrap(),
            UpsertOutcome::AlreadySeen
        );

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.released, U256::from(1_000_000u64));
        let earnings = store.agent_earnings(agent).await.unwrap().unwrap();
        assert_eq!(earnings.total_earned, U256::from(1_000_000u64));
        assert_eq!(earnings.sessions_served, 2);
    }

    #[tokio::test]
    async fn close_record_deactivates_once() {
        let store = MemoryStore::new();
        store.insert_session(&sample_session("s1")).await.unwrap();

        let event = sample_event("s1", SessionEventType::Close, 0xdd, 0);
        assert_eq!(
            store.record_close(&event).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.record_close(&event).await.unwrap(),
            UpsertOutcome::AlreadySeen
        );

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert!(!session.is_active);
        assert_eq!(store.session_event_count(), 1);
    }
}
