//! Chainwatch Core - Shared Domain Model
//!
//! Shared types, configuration, and core errors for the Chainwatch on-chain
//! indexing and reputation-scoring subsystem.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Chainwatch Workspace                     │
//! ├──────────┬──────────────┬───────────────┬───────────────────┤
//! │  chain   │   storage    │    indexer    │    reputation     │
//! │ (RPC +   │ (Postgres /  │ (jobs, decode │ (weighted decayed │
//! │ scanner) │  memory +    │  + upsert +   │  composite score) │
//! │          │  TTL cache)  │  scheduler)   │                   │
//! ├──────────┴──────────────┴───────────────┴───────────────────┤
//! │              core (types, config, core errors)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! This core only observes chain state: it never executes or signs
//! transactions, and it never serves API requests.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ChainConfig, ChainwatchConfig, DatabaseConfig, IndexerSettings, ReputationConfig,
};
pub use error::{CoreError, CoreResult};
pub use types::{
    AgentEarnings, EscrowSession, OnChainTransaction, PaymentOutcome,
    PaymentStatus, ReputationMetrics, ReputationScore, SessionEvent, SessionEventType,
    TransactionStatus, TransactionType,
};
