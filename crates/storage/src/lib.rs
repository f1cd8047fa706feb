//! Chainwatch Storage - Relational Store and Cache Layer
//!
//! Store traits over the indexed record model with two implementations: a
//! PostgreSQL store for production and an in-memory store for tests and
//! degraded local runs. Plus a TTL cache layer used by the reputation
//! engine.
//!
//! Idempotency contract: ledger-style rows (`session_events`,
//! `onchain_transactions`) insert against their natural key and report
//! whether the row was new; aggregate columns (`deposited`, `released`,
//! agent earnings) are atomic increments that callers apply only for new
//! rows. Re-scanning an already-processed block range therefore changes
//! nothing.

pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod stores;

pub use cache::{safe_ratio, u64_to_f64_safe, Cache, CacheStats, MemoryCache};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use stores::{
    CursorStore, PaymentStore, ReputationStore, SessionStore, TransactionStore, UpsertOutcome,
};
