//! Chainwatch Chain - RPC Boundary
//!
//! Read-only chain access for the indexing jobs: an injectable client trait
//! over `eth_blockNumber` / `eth_getLogs` / `eth_getBlockByNumber`, a bounded
//! log scanner with multi-filter merge and de-duplication, a per-batch block
//! timestamp memo, and a retry policy for transient failures.

pub mod client;
pub mod error;
pub mod retry;
pub mod scanner;

pub use client::{ChainClient, RpcClient};
pub use error::{ChainError, ChainResult};
pub use retry::RetryPolicy;
pub use scanner::{address_topic, batch_window, log_key, BlockTimestamps, LogScanner, TopicFilter};
