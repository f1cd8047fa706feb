//! Escrow session lifecycle processor.
//!
//! Every escrow event becomes one append-only ledger row. Balance
//! aggregates (`deposited`, `released`, agent earnings) land atomically
//! with their ledger row through the store's `record_*` operations, so a
//! replayed row is a pure no-op and a failed write strands nothing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, Log, H256, U256};
use tracing::{debug, warn};

use chainwatch_chain::scanner::TopicFilter;
use chainwatch_core::types::{EscrowSession, SessionEvent, SessionEventType};
use chainwatch_storage::stores::SessionStore;

use crate::decode::escrow::{decode_escrow_log, signatures, EscrowEvent};
use crate::decode::{session_id_string, LogMeta};
use crate::error::IndexerResult;
use crate::process::{Applied, LogProcessor};

/// Applies escrow contract events to the session store
pub struct EscrowProcessor {
    escrow_address: Address,
    sessions: Arc<dyn SessionStore>,
}

impl EscrowProcessor {
    /// Create a processor for the escrow contract at `escrow_address`
    pub fn new(escrow_address: Address, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            escrow_address,
            sessions,
        }
    }

    async fn apply(
        &self,
        event: EscrowEvent,
        meta: LogMeta,
    ) -> IndexerResult<Applied> {
        match event {
            EscrowEvent::SessionCreated {
                session_id,
                owner,
                escrow_agent,
                max_spend,
                expiry,
            } => {
                let session_id = session_id_string(session_id);
                let session = EscrowSession {
                    session_id: session_id.clone(),
                    owner,
                    escrow_agent,
                    max_spend,
                    expiry,
                    deposited: U256::zero(),
                    released: U256::zero(),
                    is_active: true,
                    created_at: meta.timestamp,
                    created_tx_hash: meta.tx_hash,
                    created_block: meta.block_number,
                };
                self.sessions.insert_session(&session).await?;
                let outcome = self
                    .sessions
                    .append_event(&self.ledger_row(
                        &session_id,
                        SessionEventType::Create,
                        Some(owner),
                        None,
                        None,
                        meta,
                    ))
                    .await?;
                Ok(applied(outcome))
            }
            EscrowEvent::FundsDeposited {
                session_id,
                depositor,
                amount,
            } => {
                let session_id = session_id_string(session_id);
                let outcome = self
                    .sessions
                    .record_deposit(
                        &self.ledger_row(
                            &session_id,
                            SessionEventType::Deposit,
                            Some(depositor),
                            Some(amount),
                            None,
                            meta,
                        ),
                        amount,
                    )
                    .await?;
                if outcome.inserted() {
                    self.check_balances(&session_id).await?;
                }
                Ok(applied(outcome))
            }
            EscrowEvent::FundsReleased {
                session_id,
                recipient,
                amount,
            } => {
                let session_id = session_id_string(session_id);
                let outcome = self
                    .sessions
                    .record_release(
                        &self.ledger_row(
                            &session_id,
                            SessionEventType::Release,
                            Some(recipient),
                            Some(amount),
                            None,
                            meta,
                        ),
                        amount,
                        recipient,
                    )
                    .await?;
                if outcome.inserted() {
                    self.check_balances(&session_id).await?;
                }
                Ok(applied(outcome))
            }
            EscrowEvent::FundsRefunded {
                session_id,
                recipient,
                amount,
            } => {
                // Refunds reduce nothing here: `deposited` stays the gross
                // total and the refund is visible through the ledger row.
                let session_id = session_id_string(session_id);
                let outcome = self
                    .sessions
                    .append_event(&self.ledger_row(
                        &session_id,
                        SessionEventType::Refund,
                        Some(recipient),
                        Some(amount),
                        None,
                        meta,
                    ))
                    .await?;
                Ok(applied(outcome))
            }
            EscrowEvent::SessionClosed {
                session_id,
                closed_by,
            } => {
                let session_id = session_id_string(session_id);
                let outcome = self
                    .sessions
                    .record_close(&self.ledger_row(
                        &session_id,
                        SessionEventType::Close,
                        Some(closed_by),
                        None,
                        None,
                        meta,
                    ))
                    .await?;
                Ok(applied(outcome))
            }
            EscrowEvent::ExecutionAuthorized {
                session_id,
                execution_id,
                executor,
            } => {
                let session_id = session_id_string(session_id);
                let outcome = self
                    .sessions
                    .append_event(&self.ledger_row(
                        &session_id,
                        SessionEventType::Authorize,
                        Some(executor),
                        None,
                        Some(execution_id),
                        meta,
                    ))
                    .await?;
                Ok(applied(outcome))
            }
            EscrowEvent::AuthorizationRevoked {
                session_id,
                execution_id,
            } => {
                let session_id = session_id_string(session_id);
                let outcome = self
                    .sessions
                    .append_event(&self.ledger_row(
                        &session_id,
                        SessionEventType::Revoke,
                        None,
                        None,
                        Some(execution_id),
                        meta,
                    ))
                    .await?;
                Ok(applied(outcome))
            }
        }
    }

    #[allow(clippy::unused_self)]
    fn ledger_row(
        &self,
        session_id: &str,
        event_type: SessionEventType,
        actor: Option<Address>,
        amount: Option<U256>,
        execution_id: Option<H256>,
        meta: LogMeta,
    ) -> SessionEvent {
        SessionEvent {
            session_id: session_id.to_string(),
            event_type,
            actor,
            amount,
            execution_id,
            timestamp: meta.timestamp,
            tx_hash: meta.tx_hash,
            log_index: meta.log_index,
            block_number: meta.block_number,
        }
    }

    /// The chain is the source of truth; balance invariant violations are
    /// logged for operators, never rejected.
    async fn check_balances(&self, session_id: &str) -> IndexerResult<()> {
        let Some(session) = self.sessions.get_session(session_id).await? else {
            warn!(session_id, "event applied to unknown session");
            return Ok(());
        };
        if session.released > session.deposited {
            warn!(
                session_id,
                released = %session.released,
                deposited = %session.deposited,
                "released exceeds deposited"
            );
        }
        if session.deposited > session.max_spend {
            warn!(
                session_id,
                deposited = %session.deposited,
                max_spend = %session.max_spend,
                "deposited exceeds max spend"
            );
        }
        Ok(())
    }
}

const fn applied(outcome: chainwatch_storage::stores::UpsertOutcome) -> Applied {
    if outcome.inserted() {
        Applied::Processed
    } else {
        Applied::AlreadySeen
    }
}

#[async_trait]
impl LogProcessor for EscrowProcessor {
    fn contract(&self) -> Address {
        self.escrow_address
    }

    fn filters(&self) -> Vec<TopicFilter> {
        vec![TopicFilter::signatures(signatures())]
    }

    async fn process(&self, log: &Log, timestamp: DateTime<Utc>) -> IndexerResult<Applied> {
        let meta = LogMeta::try_from_log(log, timestamp)?;
        let event = decode_escrow_log(log)?;
        debug!(
            tx_hash = %meta.tx_hash,
            log_index = meta.log_index,
            "applying escrow event"
        );
        self.apply(event, meta).await
    }
}
