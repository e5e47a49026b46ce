//! Indexing bookkeeping rows: transactions, events, checkpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied transaction. Its presence is the idempotence ledger: a
/// signature with a row here is never re-applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<DateTime<Utc>>,
    /// Instruction kind names decoded from this transaction, in order.
    pub actions: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        signature: &str,
        slot: u64,
        block_time: Option<DateTime<Utc>>,
        actions: Vec<String>,
    ) -> Self {
        Self {
            signature: signature.to_string(),
            slot,
            block_time,
            actions,
            processed_at: Utc::now(),
        }
    }
}

/// Append-only audit of one decoded instruction effect. Keyed by
/// (signature, ix_index) so replays collapse into one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaEvent {
    pub signature: String,
    pub ix_index: u32,
    pub arena_id: Option<u64>,
    pub kind: String,
    /// JSON of the decoded instruction arguments.
    pub data: String,
    pub slot: u64,
    pub created_at: DateTime<Utc>,
}

impl ArenaEvent {
    pub fn new(
        signature: &str,
        ix_index: u32,
        arena_id: Option<u64>,
        kind: &str,
        data: String,
        slot: u64,
    ) -> Self {
        Self {
            signature: signature.to_string(),
            ix_index,
            arena_id,
            kind: kind.to_string(),
            data,
            slot,
            created_at: Utc::now(),
        }
    }
}

/// Singleton indexing progress marker. Slot is monotonic; the store
/// ignores saves that would move it backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub signature: String,
    pub slot: u64,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    pub fn new(signature: &str, slot: u64) -> Self {
        Self {
            signature: signature.to_string(),
            slot,
            updated_at: Utc::now(),
        }
    }
}
