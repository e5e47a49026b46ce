//! Arena Mirror Database Layer
//!
//! Relational mirror of the on-chain arena program state. The sync service
//! writes decoded accounts and transactions here; the API and orchestrator
//! read from it instead of hammering the chain.
//!
//! Two backends implement the same [`MirrorStore`] trait:
//! - [`MemoryStore`] for tests and development runs
//! - [`PostgresStore`] for deployments, schema in [`schema::MIRROR_SCHEMA`]
//!
//! # Usage
//!
//! ```ignore
//! use arena_db::{MirrorStore, PostgresStore};
//!
//! async fn example() -> arena_db::StoreResult<()> {
//!     let store = PostgresStore::connect("postgres://localhost/arena", 10).await?;
//!     store.initialize_schema().await?;
//!     let stats = store.stats().await?;
//!     println!("{} arenas mirrored", stats.arenas_total);
//!     Ok(())
//! }
//! ```

pub mod entities;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;

// Re-export main types
pub use entities::*;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use schema::MIRROR_SCHEMA;
pub use store::{MirrorStats, MirrorStore};
