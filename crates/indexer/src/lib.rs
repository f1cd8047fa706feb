//! Scheduled on-chain event indexing for Chainwatch.
//!
//! Three jobs watch three contracts:
//!
//! - `escrow-sessions` indexes session lifecycle events into the session
//!   store and its append-only event ledger
//! - `token-transfers` indexes payment-token transfers touching the escrow
//!   contract into the transaction ledger
//! - `agent-registry` indexes agent registrations and feedback into the
//!   transaction ledger
//!
//! Each job scans bounded block windows from a persistent cursor, applies
//! logs idempotently (natural key `(tx_hash, log_index)`), and only then
//! advances the cursor. Crash recovery is a re-scan; duplicate deliveries
//! are absorbed by the stores.

pub mod decode;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod process;
pub mod scheduler;

pub use error::{IndexerError, IndexerResult};
pub use job::{IndexerJob, RunOutcome, RunSummary, ScanJob};
pub use orchestrator::{build_suite, IndexerSuite, ESCROW_JOB, REGISTRY_JOB, TRANSFER_JOB};
pub use process::{Applied, LogProcessor};
pub use scheduler::Scheduler;
