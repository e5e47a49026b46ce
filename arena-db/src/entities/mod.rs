//! Mirror entities
//!
//! Row types for the relational mirror. Chain-derived fields are written
//! only by the indexer; mirror-only bookkeeping (first entry sighting,
//! processing state, jobs) belongs to the orchestrator side.

mod arena;
mod job;
mod player;
mod processing;
mod sync;

pub use arena::{ArenaRow, GlobalStateRow, TokenRow};
pub use job::{JobStatus, LifecycleJobRow};
pub use player::PlayerEntryRow;
pub use processing::{PhaseState, PhaseStatus, ProcessingStateRow};
pub use sync::{ArenaEvent, SyncCheckpoint, TransactionRecord};

use chrono::{DateTime, Utc};

/// Unix seconds to timestamp; 0 means "unset" on the wire.
pub(crate) fn ts_opt(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        None
    } else {
        DateTime::from_timestamp(secs, 0)
    }
}
