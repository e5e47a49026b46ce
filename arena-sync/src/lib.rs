//! # Arena Sync Service
//!
//! Keeps a relational mirror of the on-chain arena prediction game and
//! drives round lifecycles as the elected leader:
//!
//! - **indexer**: checkpointed transaction poller plus account refresh,
//!   writing decoded state into the [`arena_db`] mirror
//! - **election**: TTL-lock leader election over Redis (or in-memory)
//! - **orchestrator**: starts and ends rounds by submitting signed
//!   lifecycle transactions, priced through the oracle cache
//! - **jobs**: durable retryable shadow of every transition
//! - **server**: operational HTTP endpoints for probes and metrics
//!
//! [`service::SyncService`] wires it all together; `main.rs` adds the
//! CLI.

pub mod config;
pub mod election;
pub mod error;
pub mod indexer;
pub mod jobs;
pub mod metrics;
pub mod oracle;
pub mod orchestrator;
pub mod retry;
pub mod rpc;
pub mod server;
pub mod service;
pub mod signer;

pub use config::AppConfig;
pub use error::{SyncError, SyncResult};
pub use service::SyncService;
