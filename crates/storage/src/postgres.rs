//! PostgreSQL store implementation.
//!
//! One deadpool-managed connection pool shared by all jobs and the
//! reputation engine. Token amounts are stored as `NUMERIC(78, 0)` and
//! round-tripped through decimal strings, so aggregate increments happen in
//! exact integer arithmetic on the database side.
//!
//! Idempotent inserts use `ON CONFLICT DO NOTHING` against the natural key;
//! the reported row count distinguishes `Inserted` from `AlreadySeen`.
//! Ledger rows with an aggregate effect commit inside one transaction with
//! their increment, so no crash can strand a row without its effect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use ethers::types::{Address, H256, U256};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::info;

use chainwatch_core::config::{DatabaseConfig, ReputationConfig};
use chainwatch_core::types::{
    AgentEarnings, EscrowSession, OnChainTransaction, PaymentOutcome, PaymentStatus,
    ReputationScore, SessionEvent, SessionEventType, TransactionStatus, TransactionType,
};

use crate::error::{StorageError, StorageResult};
use crate::stores::{
    CursorStore, PaymentStore, ReputationStore, SessionStore, TransactionStore, UpsertOutcome,
};

/// Schema applied at startup. The payment_outcomes table is owned by the
/// settlement layer; it is created here only so local development works
/// against an empty database.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS indexer_cursors (
    name        TEXT PRIMARY KEY,
    last_block  BIGINT NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS escrow_sessions (
    session_id       TEXT PRIMARY KEY,
    owner_address    TEXT NOT NULL,
    escrow_agent     TEXT NOT NULL,
    max_spend        NUMERIC(78, 0) NOT NULL,
    expiry           TIMESTAMPTZ NOT NULL,
    deposited        NUMERIC(78, 0) NOT NULL DEFAULT 0,
    released         NUMERIC(78, 0) NOT NULL DEFAULT 0,
    is_active        BOOLEAN NOT NULL DEFAULT TRUE,
    created_at       TIMESTAMPTZ NOT NULL,
    created_tx_hash  TEXT NOT NULL,
    created_block    BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_events (
    tx_hash          TEXT NOT NULL,
    log_index        BIGINT NOT NULL,
    session_id       TEXT NOT NULL,
    event_type       TEXT NOT NULL,
    actor            TEXT,
    amount           NUMERIC(78, 0),
    execution_id     TEXT,
    event_timestamp  TIMESTAMPTZ NOT NULL,
    block_number     BIGINT NOT NULL,
    PRIMARY KEY (tx_hash, log_index)
);
CREATE INDEX IF NOT EXISTS session_events_session_idx
    ON session_events (session_id, block_number, log_index);

CREATE TABLE IF NOT EXISTS onchain_transactions (
    tx_hash       TEXT NOT NULL,
    log_index     BIGINT NOT NULL,
    from_address  TEXT NOT NULL,
    to_address    TEXT NOT NULL,
    value         NUMERIC(78, 0) NOT NULL,
    tx_type       TEXT NOT NULL,
    status        TEXT NOT NULL,
    tx_timestamp  TIMESTAMPTZ NOT NULL,
    block_number  BIGINT NOT NULL,
    block_hash    TEXT NOT NULL,
    metadata      JSONB NOT NULL DEFAULT '{}'::jsonb,
    PRIMARY KEY (tx_hash, log_index)
);

CREATE TABLE IF NOT EXISTS agent_earnings (
    agent            TEXT PRIMARY KEY,
    total_earned     NUMERIC(78, 0) NOT NULL DEFAULT 0,
    sessions_served  BIGINT NOT NULL DEFAULT 0,
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS payment_outcomes (
    id           BIGSERIAL PRIMARY KEY,
    subject_id   TEXT NOT NULL,
    status       TEXT NOT NULL,
    latency_ms   BIGINT NOT NULL,
    payer        TEXT NOT NULL,
    amount       NUMERIC(78, 0) NOT NULL,
    occurred_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS payment_outcomes_subject_idx
    ON payment_outcomes (subject_id, occurred_at);

CREATE TABLE IF NOT EXISTS reputation_scores (
    subject_id           TEXT PRIMARY KEY,
    reputation_score     DOUBLE PRECISION NOT NULL,
    success_rate         DOUBLE PRECISION NOT NULL,
    reliability_score    DOUBLE PRECISION NOT NULL,
    speed_score          DOUBLE PRECISION NOT NULL,
    volume_score         DOUBLE PRECISION NOT NULL,
    recency_weight       DOUBLE PRECISION NOT NULL,
    calculated_at        TIMESTAMPTZ NOT NULL,
    calculation_version  INTEGER NOT NULL
);
";

/// Ranking materialization: snapshot scores decayed for staleness, with the
/// per-week decay base and the staleness horizon taken from
/// `reputation.time_decay_factor` and `reputation.days_for_full_decay`.
/// Built at migrate time from validated configuration, so interpolation is
/// safe here.
fn rankings_view_sql(reputation: &ReputationConfig) -> String {
    format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS agent_rankings AS \
         SELECT \
             subject_id, \
             reputation_score, \
             reputation_score \
                 * POWER({factor}, \
                         GREATEST(EXTRACT(EPOCH FROM (now() - calculated_at)) / 604800.0, 0.0)) \
                 AS decayed_score, \
             calculated_at \
         FROM reputation_scores \
         WHERE calculated_at > now() - make_interval(days => {horizon}) \
         ORDER BY decayed_score DESC",
        factor = reputation.time_decay_factor,
        horizon = reputation.days_for_full_decay,
    )
}

/// PostgreSQL-backed implementation of every store trait
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// Create a store over a fresh connection pool.
    ///
    /// # Errors
    ///
    /// Returns error if the pool cannot be created.
    pub fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let mut pg_config = Config::new();
        pg_config.url = Some(config.url.clone());
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(
            config.max_connections as usize,
        ));

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::database("create_pool", e.to_string()))?;

        Ok(Self { pool })
    }

    /// Apply the schema and the ranking materialization.
    ///
    /// # Errors
    ///
    /// Returns error if a DDL statement fails.
    pub async fn migrate(&self, reputation: &ReputationConfig) -> StorageResult<()> {
        let client = self.client().await?;
        client.batch_execute(SCHEMA).await?;
        client.batch_execute(&rankings_view_sql(reputation)).await?;
        info!("database schema up to date");
        Ok(())
    }

    async fn client(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::database("pool_acquire", e.to_string()))
    }
}

fn address_to_text(address: Address) -> String {
    format!("{address:#x}")
}

fn text_to_address(field: &str, s: &str) -> StorageResult<Address> {
    s.parse::<Address>()
        .map_err(|e| StorageError::encoding(field, e.to_string()))
}

fn hash_to_text(hash: H256) -> String {
    format!("{hash:#x}")
}

fn text_to_hash(field: &str, s: &str) -> StorageResult<H256> {
    s.parse::<H256>()
        .map_err(|e| StorageError::encoding(field, e.to_string()))
}

fn text_to_u256(field: &str, s: &str) -> StorageResult<U256> {
    U256::from_dec_str(s).map_err(|e| StorageError::encoding(field, e.to_string()))
}

fn block_to_db(field: &str, block: u64) -> StorageResult<i64> {
    i64::try_from(block).map_err(|_| StorageError::encoding(field, "block number out of range"))
}

fn db_to_block(field: &str, value: i64) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| StorageError::encoding(field, "negative block number"))
}

/// Idempotent ledger-row insert shared by `append_event` and the compound
/// `record_*` operations.
const EVENT_INSERT: &str = "INSERT INTO session_events \
         (tx_hash, log_index, session_id, event_type, actor, amount, execution_id, \
          event_timestamp, block_number) \
     VALUES ($1, $2, $3, $4, $5, $6::numeric, $7, $8, $9) \
     ON CONFLICT (tx_hash, log_index) DO NOTHING";

/// Owned parameter set for [`EVENT_INSERT`]
struct EventInsertParams {
    tx_hash: String,
    log_index: i64,
    session_id: String,
    event_type: &'static str,
    actor: Option<String>,
    amount: Option<String>,
    execution_id: Option<String>,
    timestamp: DateTime<Utc>,
    block_number: i64,
}

impl EventInsertParams {
    fn as_params(&self) -> [&(dyn ToSql + Sync); 9] {
        [
            &self.tx_hash,
            &self.log_index,
            &self.session_id,
            &self.event_type,
            &self.actor,
            &self.amount,
            &self.execution_id,
            &self.timestamp,
            &self.block_number,
        ]
    }
}

fn event_insert_params(event: &SessionEvent) -> StorageResult<EventInsertParams> {
    Ok(EventInsertParams {
        tx_hash: hash_to_text(event.tx_hash),
        log_index: block_to_db("log_index", event.log_index)?,
        session_id: event.session_id.clone(),
        event_type: event.event_type.as_str(),
        actor: event.actor.map(address_to_text),
        amount: event.amount.map(|a| a.to_string()),
        execution_id: event.execution_id.map(hash_to_text),
        timestamp: event.timestamp,
        block_number: block_to_db("block_number", event.block_number)?,
    })
}

async fn insert_event_row(
    tx: &deadpool_postgres::Transaction<'_>,
    event: &SessionEvent,
) -> StorageResult<u64> {
    let params = event_insert_params(event)?;
    Ok(tx.execute(EVENT_INSERT, &params.as_params()).await?)
}

fn outcome_from_count(count: u64) -> UpsertOutcome {
    if count == 0 {
        UpsertOutcome::AlreadySeen
    } else {
        UpsertOutcome::Inserted
    }
}

fn parse_session(row: &Row) -> StorageResult<EscrowSession> {
    Ok(EscrowSession {
        session_id: row.try_get("session_id")?,
        owner: text_to_address("owner_address", row.try_get("owner_address")?)?,
        escrow_agent: text_to_address("escrow_agent", row.try_get("escrow_agent")?)?,
        max_spend: text_to_u256("max_spend", row.try_get("max_spend")?)?,
        expiry: row.try_get("expiry")?,
        deposited: text_to_u256("deposited", row.try_get("deposited")?)?,
        released: text_to_u256("released", row.try_get("released")?)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        created_tx_hash: text_to_hash("created_tx_hash", row.try_get("created_tx_hash")?)?,
        created_block: db_to_block("created_block", row.try_get("created_block")?)?,
    })
}

fn parse_session_event(row: &Row) -> StorageResult<SessionEvent> {
    let event_type: String = row.try_get("event_type")?;
    let actor: Option<String> = row.try_get("actor")?;
    let amount: Option<String> = row.try_get("amount")?;
    let execution_id: Option<String> = row.try_get("execution_id")?;

    Ok(SessionEvent {
        session_id: row.try_get("session_id")?,
        event_type: SessionEventType::parse(&event_type)
            .ok_or_else(|| StorageError::encoding("event_type", event_type.clone()))?,
        actor: actor
            .map(|a| text_to_address("actor", &a))
            .transpose()?,
        amount: amount.map(|a| text_to_u256("amount", &a)).transpose()?,
        execution_id: execution_id
            .map(|e| text_to_hash("execution_id", &e))
            .transpose()?,
        timestamp: row.try_get("event_timestamp")?,
        tx_hash: text_to_hash("tx_hash", row.try_get("tx_hash")?)?,
        log_index: db_to_block("log_index", row.try_get("log_index")?)?,
        block_number: db_to_block("block_number", row.try_get("block_number")?)?,
    })
}

fn parse_transaction(row: &Row) -> StorageResult<OnChainTransaction> {
    let tx_type: String = row.try_get("tx_type")?;
    let status: String = row.try_get("status")?;

    Ok(OnChainTransaction {
        tx_hash: text_to_hash("tx_hash", row.try_get("tx_hash")?)?,
        log_index: db_to_block("log_index", row.try_get("log_index")?)?,
        from_address: text_to_address("from_address", row.try_get("from_address")?)?,
        to_address: text_to_address("to_address", row.try_get("to_address")?)?,
        value: text_to_u256("value", row.try_get("value")?)?,
        tx_type: TransactionType::parse(&tx_type)
            .ok_or_else(|| StorageError::encoding("tx_type", tx_type.clone()))?,
        status: match status.as_str() {
            "CONFIRMED" => TransactionStatus::Confirmed,
            "ORPHANED" => TransactionStatus::Orphaned,
            other => return Err(StorageError::encoding("status", other)),
        },
        timestamp: row.try_get("tx_timestamp")?,
        block_number: db_to_block("block_number", row.try_get("block_number")?)?,
        block_hash: text_to_hash("block_hash", row.try_get("block_hash")?)?,
        metadata: row.try_get("metadata")?,
    })
}

fn parse_payment(row: &Row) -> StorageResult<PaymentOutcome> {
    let status: String = row.try_get("status")?;
    let latency: i64 = row.try_get("latency_ms")?;

    Ok(PaymentOutcome {
        subject_id: row.try_get("subject_id")?,
        status: match status.as_str() {
            "SUCCEEDED" => PaymentStatus::Succeeded,
            "FAILED" => PaymentStatus::Failed,
            "TIMED_OUT" => PaymentStatus::TimedOut,
            other => return Err(StorageError::encoding("status", other)),
        },
        latency_ms: u64::try_from(latency)
            .map_err(|_| StorageError::encoding("latency_ms", "negative latency"))?,
        payer: text_to_address("payer", row.try_get("payer")?)?,
        amount: text_to_u256("amount", row.try_get("amount")?)?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn parse_score(row: &Row) -> StorageResult<ReputationScore> {
    let version: i32 = row.try_get("calculation_version")?;
    Ok(ReputationScore {
        subject_id: row.try_get("subject_id")?,
        reputation_score: row.try_get("reputation_score")?,
        success_rate: row.try_get("success_rate")?,
        reliability_score: row.try_get("reliability_score")?,
        speed_score: row.try_get("speed_score")?,
        volume_score: row.try_get("volume_score")?,
        recency_weight: row.try_get("recency_weight")?,
        calculated_at: row.try_get("calculated_at")?,
        calculation_version: u32::try_from(version)
            .map_err(|_| StorageError::encoding("calculation_version", "negative version"))?,
    })
}

#[async_trait]
impl CursorStore for PostgresStore {
    async fn get(&self, name: &str) -> StorageResult<Option<u64>> {
        const SQL: &str = "SELECT last_block FROM indexer_cursors WHERE name = $1";
        let client = self.client().await?;
        let row = client.query_opt(SQL, &[&name]).await?;
        row.map(|r| db_to_block("last_block", r.try_get(0)?)).transpose()
    }

    async fn set(&self, name: &str, block: u64) -> StorageResult<()> {
        // GREATEST keeps the cursor monotone even if an operator replays an
        // old range by hand.
        const SQL: &str = "INSERT INTO indexer_cursors (name, last_block, updated_at) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (name) DO UPDATE SET \
                 last_block = GREATEST(indexer_cursors.last_block, EXCLUDED.last_block), \
                 updated_at = now()";
        let client = self.client().await?;
        client
            .execute(SQL, &[&name, &block_to_db("last_block", block)?])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn insert_session(&self, session: &EscrowSession) -> StorageResult<UpsertOutcome> {
        const SQL: &str = "INSERT INTO escrow_sessions \
                 (session_id, owner_address, escrow_agent, max_spend, expiry, deposited, \
                  released, is_active, created_at, created_tx_hash, created_block) \
             VALUES ($1, $2, $3, $4::numeric, $5, 0, 0, TRUE, $6, $7, $8) \
             ON CONFLICT (session_id) DO NOTHING";
        let client = self.client().await?;
        let count = client
            .execute(
                SQL,
                &[
                    &session.session_id,
                    &address_to_text(session.owner),
                    &address_to_text(session.escrow_agent),
                    &session.max_spend.to_string(),
                    &session.expiry,
                    &session.created_at,
                    &hash_to_text(session.created_tx_hash),
                    &block_to_db("created_block", session.created_block)?,
                ],
            )
            .await?;
        Ok(outcome_from_count(count))
    }

    async fn get_session(&self, session_id: &str) -> StorageResult<Option<EscrowSession>> {
        const SQL: &str = "SELECT session_id, owner_address, escrow_agent, max_spend::text, expiry, \
                    deposited::text, released::text, is_active, created_at, created_tx_hash, \
                    created_block \
             FROM escrow_sessions WHERE session_id = $1";
        let client = self.client().await?;
        let row = client.query_opt(SQL, &[&session_id]).await?;
        row.as_ref().map(parse_session).transpose()
    }

    async fn append_event(&self, event: &SessionEvent) -> StorageResult<UpsertOutcome> {
        let client = self.client().await?;
        let count = client
            .execute(EVENT_INSERT, &event_insert_params(event)?.as_params())
            .await?;
        Ok(outcome_from_count(count))
    }

    async fn session_events(&self, session_id: &str) -> StorageResult<Vec<SessionEvent>> {
        const SQL: &str = "SELECT tx_hash, log_index, session_id, event_type, actor, amount::text, \
                    execution_id, event_timestamp, block_number \
             FROM session_events WHERE session_id = $1 \
             ORDER BY block_number, log_index";
        let client = self.client().await?;
        let rows = client.query(SQL, &[&session_id]).await?;
        rows.iter().map(parse_session_event).collect()
    }

    async fn record_deposit(
        &self,
        event: &SessionEvent,
        amount: U256,
    ) -> StorageResult<UpsertOutcome> {
        const BUMP: &str = "UPDATE escrow_sessions SET deposited = deposited + $2::numeric \
             WHERE session_id = $1";
        // Ledger insert and increment commit together; if the increment
        // fails the dropped transaction rolls the row back, so a re-scan
        // re-applies the event in full.
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        let count = insert_event_row(&tx, event).await?;
        if count > 0 {
            let updated = tx
                .execute(BUMP, &[&event.session_id, &amount.to_string()])
                .await?;
            if updated == 0 {
                return Err(StorageError::not_found("EscrowSession", &event.session_id));
            }
        }
        tx.commit().await?;
        Ok(outcome_from_count(count))
    }

    async fn record_release(
        &self,
        event: &SessionEvent,
        amount: U256,
        agent: Address,
    ) -> StorageResult<UpsertOutcome> {
        const BUMP: &str = "UPDATE escrow_sessions SET released = released + $2::numeric \
             WHERE session_id = $1";
        const CREDIT: &str = "INSERT INTO agent_earnings (agent, total_earned, sessions_served, updated_at) \
             VALUES ($1, $2::numeric, 1, now()) \
             ON CONFLICT (agent) DO UPDATE SET \
                 total_earned = agent_earnings.total_earned + EXCLUDED.total_earned, \
                 sessions_served = agent_earnings.sessions_served + 1, \
                 updated_at = now()";
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        let count = insert_event_row(&tx, event).await?;
        if count > 0 {
            let updated = tx
                .execute(BUMP, &[&event.session_id, &amount.to_string()])
                .await?;
            if updated == 0 {
                return Err(StorageError::not_found("EscrowSession", &event.session_id));
            }
            tx.execute(CREDIT, &[&address_to_text(agent), &amount.to_string()])
                .await?;
        }
        tx.commit().await?;
        Ok(outcome_from_count(count))
    }

    async fn record_close(&self, event: &SessionEvent) -> StorageResult<UpsertOutcome> {
        const DEACTIVATE: &str =
            "UPDATE escrow_sessions SET is_active = FALSE WHERE session_id = $1";
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        let count = insert_event_row(&tx, event).await?;
        if count > 0 {
            let updated = tx.execute(DEACTIVATE, &[&event.session_id]).await?;
            if updated == 0 {
                return Err(StorageError::not_found("EscrowSession", &event.session_id));
            }
        }
        tx.commit().await?;
        Ok(outcome_from_count(count))
    }

    async fn agent_earnings(&self, agent: Address) -> StorageResult<Option<AgentEarnings>> {
        const SQL: &str = "SELECT agent, total_earned::text, sessions_served, updated_at \
             FROM agent_earnings WHERE agent = $1";
        let client = self.client().await?;
        let row = client.query_opt(SQL, &[&address_to_text(agent)]).await?;
        row.map(|r| {
            let served: i64 = r.try_get("sessions_served")?;
            Ok(AgentEarnings {
                agent: text_to_address("agent", r.try_get("agent")?)?,
                total_earned: text_to_u256("total_earned", r.try_get("total_earned")?)?,
                sessions_served: u64::try_from(served)
                    .map_err(|_| StorageError::encoding("sessions_served", "negative count"))?,
                updated_at: r.try_get("updated_at")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl TransactionStore for PostgresStore {
    async fn insert_transaction(&self, tx: &OnChainTransaction) -> StorageResult<UpsertOutcome> {
        const SQL: &str = "INSERT INTO onchain_transactions \
                 (tx_hash, log_index, from_address, to_address, value, tx_type, status, \
                  tx_timestamp, block_number, block_hash, metadata) \
             VALUES ($1, $2, $3, $4, $5::numeric, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (tx_hash, log_index) DO NOTHING";
        let client = self.client().await?;
        let count = client
            .execute(
                SQL,
                &[
                    &hash_to_text(tx.tx_hash),
                    &block_to_db("log_index", tx.log_index)?,
                    &address_to_text(tx.from_address),
                    &address_to_text(tx.to_address),
                    &tx.value.to_string(),
                    &tx.tx_type.as_str(),
                    &tx.status.as_str(),
                    &tx.timestamp,
                    &block_to_db("block_number", tx.block_number)?,
                    &hash_to_text(tx.block_hash),
                    &tx.metadata,
                ],
            )
            .await?;
        Ok(outcome_from_count(count))
    }

    async fn get_transaction(
        &self,
        tx_hash: H256,
        log_index: u64,
    ) -> StorageResult<Option<OnChainTransaction>> {
        const SQL: &str = "SELECT tx_hash, log_index, from_address, to_address, value::text, tx_type, \
                    status, tx_timestamp, block_number, block_hash, metadata \
             FROM onchain_transactions WHERE tx_hash = $1 AND log_index = $2";
        let client = self.client().await?;
        let row = client
            .query_opt(
                SQL,
                &[&hash_to_text(tx_hash), &block_to_db("log_index", log_index)?],
            )
            .await?;
        row.as_ref().map(parse_transaction).transpose()
    }

    async fn transaction_count(&self) -> StorageResult<u64> {
        const SQL: &str = "SELECT COUNT(*) FROM onchain_transactions";
        let client = self.client().await?;
        let row = client.query_one(SQL, &[]).await?;
        let count: i64 = row.try_get(0)?;
        u64::try_from(count).map_err(|_| StorageError::encoding("count", "negative count"))
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn payments_for_subject(&self, subject_id: &str) -> StorageResult<Vec<PaymentOutcome>> {
        const SQL: &str = "SELECT subject_id, status, latency_ms, payer, amount::text, occurred_at \
             FROM payment_outcomes WHERE subject_id = $1 ORDER BY occurred_at";
        let client = self.client().await?;
        let rows = client.query(SQL, &[&subject_id]).await?;
        rows.iter().map(parse_payment).collect()
    }

    async fn active_subjects(&self) -> StorageResult<Vec<String>> {
        const SQL: &str = "SELECT DISTINCT subject_id FROM payment_outcomes ORDER BY subject_id";
        let client = self.client().await?;
        let rows = client.query(SQL, &[]).await?;
        rows.iter()
            .map(|r| r.try_get(0).map_err(StorageError::from))
            .collect()
    }
}

#[async_trait]
impl ReputationStore for PostgresStore {
    async fn upsert_score(&self, score: &ReputationScore) -> StorageResult<()> {
        const SQL: &str = "INSERT INTO reputation_scores \
                 (subject_id, reputation_score, success_rate, reliability_score, speed_score, \
                  volume_score, recency_weight, calculated_at, calculation_version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (subject_id) DO UPDATE SET \
                 reputation_score = EXCLUDED.reputation_score, \
                 success_rate = EXCLUDED.success_rate, \
                 reliability_score = EXCLUDED.reliability_score, \
                 speed_score = EXCLUDED.speed_score, \
                 volume_score = EXCLUDED.volume_score, \
                 recency_weight = EXCLUDED.recency_weight, \
                 calculated_at = EXCLUDED.calculated_at, \
                 calculation_version = EXCLUDED.calculation_version";
        let client = self.client().await?;
        let version = i32::try_from(score.calculation_version)
            .map_err(|_| StorageError::encoding("calculation_version", "version out of range"))?;
        client
            .execute(
                SQL,
                &[
                    &score.subject_id,
                    &score.reputation_score,
                    &score.success_rate,
                    &score.reliability_score,
                    &score.speed_score,
                    &score.volume_score,
                    &score.recency_weight,
                    &score.calculated_at,
                    &version,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_score(&self, subject_id: &str) -> StorageResult<Option<ReputationScore>> {
        const SQL: &str = "SELECT subject_id, reputation_score, success_rate, reliability_score, \
                    speed_score, volume_score, recency_weight, calculated_at, \
                    calculation_version \
             FROM reputation_scores WHERE subject_id = $1";
        let client = self.client().await?;
        let row = client.query_opt(SQL, &[&subject_id]).await?;
        row.as_ref().map(parse_score).transpose()
    }

    async fn refresh_rankings(&self) -> StorageResult<()> {
        const SQL: &str = "REFRESH MATERIALIZED VIEW agent_rankings";
        let client = self.client().await?;
        client.batch_execute(SQL).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_round_trip_hex_text() {
        let address = Address::repeat_byte(0x7f);
        let text = address_to_text(address);
        assert!(text.starts_with("0x"));
        assert_eq!(text_to_address("addr", &text).unwrap(), address);
    }

    #[test]
    fn amounts_round_trip_decimal_text() {
        let amount = U256::from_dec_str("123456789012345678901234567890").unwrap();
        let text = amount.to_string();
        assert_eq!(text_to_u256("amount", &text).unwrap(), amount);
    }

    #[test]
    fn zero_row_count_means_already_seen() {
        assert_eq!(outcome_from_count(0), UpsertOutcome::AlreadySeen);
        assert_eq!(outcome_from_count(1), UpsertOutcome::Inserted);
    }

    #[test]
    fn rankings_view_embeds_decay_settings() {
        let reputation = ReputationConfig::default();
        let sql = rankings_view_sql(&reputation);
        assert!(sql.contains("POWER(0.95"));
        assert!(sql.contains("make_interval(days => 90)"));
    }

    #[test]
    fn block_conversion_rejects_out_of_range() {
        assert!(block_to_db("block", u64::MAX).is_err());
        assert!(db_to_block("block", -1).is_err());
        assert_eq!(db_to_block("block", 42).unwrap(), 42);
    }
}
