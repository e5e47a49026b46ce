//! Mirror storage abstraction
//!
//! One trait, two backends: `MemoryStore` for tests and development,
//! `PostgresStore` for deployments. All mutations are idempotent upserts
//! or compare-and-swap operations; callers never read-modify-write.

use arena_core::{ArenaStatus, PhaseKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{
    ArenaEvent, ArenaRow, GlobalStateRow, LifecycleJobRow, PlayerEntryRow, ProcessingStateRow,
    SyncCheckpoint, TokenRow, TransactionRecord,
};
use crate::error::StoreResult;

/// Aggregate counts for operational endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorStats {
    pub arenas_total: u64,
    pub arenas_waiting: u64,
    pub arenas_active: u64,
    pub arenas_ended: u64,
    pub arenas_canceled: u64,
    pub entries_total: u64,
    pub transactions_total: u64,
    pub jobs_queued: u64,
    pub jobs_running: u64,
    pub jobs_dead: u64,
    pub phases_processing: u64,
    pub phases_failed: u64,
    pub checkpoint_signature: Option<String>,
    pub checkpoint_slot: Option<u64>,
}

/// The mirror's storage surface.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    // ==================== arenas ====================

    /// Insert or overwrite chain-derived fields; mirror-only fields
    /// (`first_entry_at`, `created_at`) survive.
    async fn upsert_arena(&self, arena: &ArenaRow) -> StoreResult<()>;

    async fn get_arena(&self, arena_id: u64) -> StoreResult<Option<ArenaRow>>;

    async fn get_arena_by_address(&self, address: &str) -> StoreResult<Option<ArenaRow>>;

    async fn list_arenas_by_status(&self, status: ArenaStatus) -> StoreResult<Vec<ArenaRow>>;

    async fn list_non_terminal_arenas(&self) -> StoreResult<Vec<ArenaRow>>;

    /// Record the first entrant sighting; keeps the earliest time on
    /// repeats.
    async fn note_first_entry(&self, arena_id: u64, at: DateTime<Utc>) -> StoreResult<()>;

    /// Instruction-effect status write. No-op when the arena is unknown;
    /// the account refresh will create it.
    async fn set_arena_status(&self, arena_id: u64, status: ArenaStatus) -> StoreResult<()>;

    // ==================== entries ====================

    async fn upsert_player_entry(&self, entry: &PlayerEntryRow) -> StoreResult<()>;

    async fn get_player_entry(
        &self,
        arena_id: u64,
        player: &str,
    ) -> StoreResult<Option<PlayerEntryRow>>;

    /// All entries for one arena, ordered by player index.
    async fn list_entries_for_arena(&self, arena_id: u64) -> StoreResult<Vec<PlayerEntryRow>>;

    /// Instruction-effect price write (absolute value, chronological
    /// last-write-wins).
    async fn set_entry_price(
        &self,
        arena_id: u64,
        player_index: u8,
        phase: PhaseKind,
        price: u64,
    ) -> StoreResult<()>;

    async fn set_entry_claimed(&self, arena_id: u64, player: &str) -> StoreResult<()>;

    // ==================== global state & tokens ====================

    async fn upsert_global_state(&self, row: &GlobalStateRow) -> StoreResult<()>;

    async fn get_global_state(&self) -> StoreResult<Option<GlobalStateRow>>;

    async fn upsert_token(&self, row: &TokenRow) -> StoreResult<()>;

    async fn get_token_by_index(&self, asset_index: u8) -> StoreResult<Option<TokenRow>>;

    async fn list_active_tokens(&self) -> StoreResult<Vec<TokenRow>>;

    // ==================== transactions & events ====================

    /// Returns false when the signature was already recorded (replay).
    async fn record_transaction(&self, record: &TransactionRecord) -> StoreResult<bool>;

    async fn is_transaction_applied(&self, signature: &str) -> StoreResult<bool>;

    /// Returns false when the (signature, ix_index) pair already exists.
    async fn append_event(&self, event: &ArenaEvent) -> StoreResult<bool>;

    /// Events for one arena in chain order (slot, then insertion).
    async fn list_events_for_arena(
        &self,
        arena_id: u64,
        limit: usize,
    ) -> StoreResult<Vec<ArenaEvent>>;

    // ==================== checkpoint ====================

    async fn checkpoint(&self) -> StoreResult<Option<SyncCheckpoint>>;

    /// Monotonic: a save with a lower slot than the stored one is ignored.
    async fn save_checkpoint(&self, signature: &str, slot: u64) -> StoreResult<()>;

    // ==================== processing state ====================

    async fn processing_state(&self, arena_id: u64) -> StoreResult<Option<ProcessingStateRow>>;

    async fn list_processing_states(&self) -> StoreResult<Vec<ProcessingStateRow>>;

    /// Compare-and-swap claim. Creates the row when absent. True when this
    /// caller took the phase; false when it is already held, done, or not
    /// yet due.
    async fn claim_phase(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn complete_phase(&self, arena_id: u64, phase: PhaseKind) -> StoreResult<()>;

    async fn fail_phase(&self, arena_id: u64, phase: PhaseKind, error: &str) -> StoreResult<()>;

    async fn schedule_phase(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Demote phases processing since before `cutoff` to failed; returns
    /// the demoted (arena, phase) pairs.
    async fn demote_stuck_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<(u64, PhaseKind)>>;

    // ==================== jobs ====================

    /// Idempotent: an active (queued/running) job for (arena, phase) is
    /// returned as-is instead of enqueueing a duplicate.
    async fn enqueue_job(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        run_at: DateTime<Utc>,
        payload: &str,
    ) -> StoreResult<LifecycleJobRow>;

    /// Claim up to `limit` due jobs (queued and due, or running-stale).
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        stale_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LifecycleJobRow>>;

    async fn complete_job(&self, job_id: &str) -> StoreResult<()>;

    /// Requeue at `next_run`, or mark Dead when `next_run` is None.
    async fn fail_job(
        &self,
        job_id: &str,
        error: &str,
        next_run: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Reschedule without recording a failure.
    async fn delay_job(&self, job_id: &str, next_run: DateTime<Utc>) -> StoreResult<()>;

    /// Most recent job for (arena, phase), any status.
    async fn latest_job(
        &self,
        arena_id: u64,
        phase: PhaseKind,
    ) -> StoreResult<Option<LifecycleJobRow>>;

    /// Trim terminal job history to `keep` rows per status; returns the
    /// number deleted.
    async fn prune_jobs(&self, keep: usize) -> StoreResult<u64>;

    // ==================== stats ====================

    async fn stats(&self) -> StoreResult<MirrorStats>;
}
