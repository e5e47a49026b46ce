//! In-memory mirror store
//!
//! Backs tests and development runs. All maps live behind one RwLock so
//! compare-and-swap operations are atomic under the write guard.

use std::collections::HashMap;

use arena_core::{ArenaStatus, PhaseKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::entities::{
    ArenaEvent, ArenaRow, GlobalStateRow, JobStatus, LifecycleJobRow, PlayerEntryRow,
    ProcessingStateRow, SyncCheckpoint, TokenRow, TransactionRecord,
};
use crate::error::StoreResult;
use crate::store::{MirrorStats, MirrorStore};

#[derive(Default)]
struct Inner {
    arenas: HashMap<u64, ArenaRow>,
    arena_ids_by_address: HashMap<String, u64>,
    entries: HashMap<(u64, String), PlayerEntryRow>,
    global_state: Option<GlobalStateRow>,
    tokens: HashMap<u8, TokenRow>,
    transactions: HashMap<String, TransactionRecord>,
    events: Vec<ArenaEvent>,
    processing: HashMap<u64, ProcessingStateRow>,
    checkpoint: Option<SyncCheckpoint>,
    jobs: Vec<LifecycleJobRow>,
}

/// Thread-safe in-memory implementation of [`MirrorStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all data. Test helper.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = Inner::default();
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn upsert_arena(&self, arena: &ArenaRow) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .arena_ids_by_address
            .insert(arena.address.clone(), arena.arena_id);
        match inner.arenas.get_mut(&arena.arena_id) {
            Some(existing) => existing.absorb(arena),
            None => {
                inner.arenas.insert(arena.arena_id, arena.clone());
            }
        }
        Ok(())
    }

    async fn get_arena(&self, arena_id: u64) -> StoreResult<Option<ArenaRow>> {
        let inner = self.inner.read().await;
        Ok(inner.arenas.get(&arena_id).cloned())
    }

    async fn get_arena_by_address(&self, address: &str) -> StoreResult<Option<ArenaRow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .arena_ids_by_address
            .get(address)
            .and_then(|id| inner.arenas.get(id))
            .cloned())
    }

    async fn list_arenas_by_status(&self, status: ArenaStatus) -> StoreResult<Vec<ArenaRow>> {
        let inner = self.inner.read().await;
        let mut arenas: Vec<ArenaRow> = inner
            .arenas
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        arenas.sort_by_key(|a| a.arena_id);
        Ok(arenas)
    }

    async fn list_non_terminal_arenas(&self) -> StoreResult<Vec<ArenaRow>> {
        let inner = self.inner.read().await;
        let mut arenas: Vec<ArenaRow> = inner
            .arenas
            .values()
            .filter(|a| !a.status.is_terminal())
            .cloned()
            .collect();
        arenas.sort_by_key(|a| a.arena_id);
        Ok(arenas)
    }

    async fn note_first_entry(&self, arena_id: u64, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(arena) = inner.arenas.get_mut(&arena_id) {
            match arena.first_entry_at {
                Some(existing) if existing <= at => {}
                _ => arena.first_entry_at = Some(at),
            }
            arena.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_arena_status(&self, arena_id: u64, status: ArenaStatus) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(arena) = inner.arenas.get_mut(&arena_id) {
            arena.status = status;
            arena.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_player_entry(&self, entry: &PlayerEntryRow) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = (entry.arena_id, entry.player.clone());
        match inner.entries.get_mut(&key) {
            // Keep known prices when a shell upsert carries none.
            Some(existing) => {
                let start_price = entry.start_price.or(existing.start_price);
                let end_price = entry.end_price.or(existing.end_price);
                let movement = entry.price_movement.or(existing.price_movement);
                *existing = entry.clone();
                existing.start_price = start_price;
                existing.end_price = end_price;
                existing.price_movement = movement;
            }
            None => {
                inner.entries.insert(key, entry.clone());
            }
        }
        Ok(())
    }

    async fn get_player_entry(
        &self,
        arena_id: u64,
        player: &str,
    ) -> StoreResult<Option<PlayerEntryRow>> {
        let inner = self.inner.read().await;
        Ok(inner.entries.get(&(arena_id, player.to_string())).cloned())
    }

    async fn list_entries_for_arena(&self, arena_id: u64) -> StoreResult<Vec<PlayerEntryRow>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<PlayerEntryRow> = inner
            .entries
            .values()
            .filter(|e| e.arena_id == arena_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.player_index);
        Ok(entries)
    }

    async fn set_entry_price(
        &self,
        arena_id: u64,
        player_index: u8,
        phase: PhaseKind,
        price: u64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entries
            .values_mut()
            .find(|e| e.arena_id == arena_id && e.player_index == player_index);
        if let Some(entry) = entry {
            match phase {
                PhaseKind::Start => entry.start_price = Some(price),
                PhaseKind::End => entry.end_price = Some(price),
            }
            if let (Some(start), Some(end)) = (entry.start_price, entry.end_price) {
                entry.price_movement = Some(PlayerEntryRow::price_delta(start, end));
            }
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_entry_claimed(&self, arena_id: u64, player: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get_mut(&(arena_id, player.to_string())) {
            entry.claimed = true;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_global_state(&self, row: &GlobalStateRow) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.global_state = Some(row.clone());
        Ok(())
    }

    async fn get_global_state(&self) -> StoreResult<Option<GlobalStateRow>> {
        let inner = self.inner.read().await;
        Ok(inner.global_state.clone())
    }

    async fn upsert_token(&self, row: &TokenRow) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.tokens.insert(row.asset_index, row.clone());
        Ok(())
    }

    async fn get_token_by_index(&self, asset_index: u8) -> StoreResult<Option<TokenRow>> {
        let inner = self.inner.read().await;
        Ok(inner.tokens.get(&asset_index).cloned())
    }

    async fn list_active_tokens(&self) -> StoreResult<Vec<TokenRow>> {
        let inner = self.inner.read().await;
        let mut tokens: Vec<TokenRow> =
            inner.tokens.values().filter(|t| t.active).cloned().collect();
        tokens.sort_by_key(|t| t.asset_index);
        Ok(tokens)
    }

    async fn record_transaction(&self, record: &TransactionRecord) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.transactions.contains_key(&record.signature) {
            return Ok(false);
        }
        inner
            .transactions
            .insert(record.signature.clone(), record.clone());
        Ok(true)
    }

    async fn is_transaction_applied(&self, signature: &str) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.transactions.contains_key(signature))
    }

    async fn append_event(&self, event: &ArenaEvent) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let exists = inner
            .events
            .iter()
            .any(|e| e.signature == event.signature && e.ix_index == event.ix_index);
        if exists {
            return Ok(false);
        }
        inner.events.push(event.clone());
        Ok(true)
    }

    async fn list_events_for_arena(
        &self,
        arena_id: u64,
        limit: usize,
    ) -> StoreResult<Vec<ArenaEvent>> {
        let inner = self.inner.read().await;
        let mut events: Vec<ArenaEvent> = inner
            .events
            .iter()
            .filter(|e| e.arena_id == Some(arena_id))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.slot.cmp(&b.slot));
        events.truncate(limit);
        Ok(events)
    }

    async fn checkpoint(&self) -> StoreResult<Option<SyncCheckpoint>> {
        let inner = self.inner.read().await;
        Ok(inner.checkpoint.clone())
    }

    async fn save_checkpoint(&self, signature: &str, slot: u64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = &inner.checkpoint {
            if existing.slot > slot {
                return Ok(());
            }
        }
        inner.checkpoint = Some(SyncCheckpoint::new(signature, slot));
        Ok(())
    }

    async fn processing_state(&self, arena_id: u64) -> StoreResult<Option<ProcessingStateRow>> {
        let inner = self.inner.read().await;
        Ok(inner.processing.get(&arena_id).cloned())
    }

    async fn list_processing_states(&self) -> StoreResult<Vec<ProcessingStateRow>> {
        let inner = self.inner.read().await;
        let mut states: Vec<ProcessingStateRow> = inner.processing.values().cloned().collect();
        states.sort_by_key(|s| s.arena_id);
        Ok(states)
    }

    async fn claim_phase(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let row = inner
            .processing
            .entry(arena_id)
            .or_insert_with(|| ProcessingStateRow::new(arena_id));
        let state = row.phase_mut(phase);
        if !state.claimable(now) {
            return Ok(false);
        }
        state.claim(now);
        row.updated_at = now;
        Ok(true)
    }

    async fn complete_phase(&self, arena_id: u64, phase: PhaseKind) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let row = inner
            .processing
            .entry(arena_id)
            .or_insert_with(|| ProcessingStateRow::new(arena_id));
        row.phase_mut(phase).complete();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn fail_phase(&self, arena_id: u64, phase: PhaseKind, error: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let row = inner
            .processing
            .entry(arena_id)
            .or_insert_with(|| ProcessingStateRow::new(arena_id));
        row.phase_mut(phase).fail(error);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn schedule_phase(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let row = inner
            .processing
            .entry(arena_id)
            .or_insert_with(|| ProcessingStateRow::new(arena_id));
        row.phase_mut(phase).schedule(at);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn demote_stuck_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<(u64, PhaseKind)>> {
        let mut inner = self.inner.write().await;
        let mut demoted = Vec::new();
        for row in inner.processing.values_mut() {
            for phase in [PhaseKind::Start, PhaseKind::End] {
                let state = row.phase_mut(phase);
                if state.is_stuck(cutoff) {
                    state.fail("stuck processing demoted by reconciliation");
                    demoted.push((row.arena_id, phase));
                }
            }
        }
        demoted.sort();
        Ok(demoted)
    }

    async fn enqueue_job(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        run_at: DateTime<Utc>,
        payload: &str,
    ) -> StoreResult<LifecycleJobRow> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .jobs
            .iter()
            .find(|j| j.arena_id == arena_id && j.phase == phase && j.status.is_active())
        {
            return Ok(existing.clone());
        }
        let job = LifecycleJobRow::new(arena_id, phase, run_at, payload.to_string());
        inner.jobs.push(job.clone());
        Ok(job)
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        stale_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LifecycleJobRow>> {
        let mut inner = self.inner.write().await;
        let mut claimed = Vec::new();
        for job in inner.jobs.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if job.claimable(now, stale_cutoff) {
                job.mark_running(now);
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_job(&self, job_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == job_id) {
            job.mark_completed();
        }
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: &str,
        error: &str,
        next_run: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == job_id) {
            job.mark_failed(error, next_run);
        }
        Ok(())
    }

    async fn delay_job(&self, job_id: &str, next_run: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == job_id) {
            job.delay_until(next_run);
        }
        Ok(())
    }

    async fn latest_job(
        &self,
        arena_id: u64,
        phase: PhaseKind,
    ) -> StoreResult<Option<LifecycleJobRow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .iter()
            .filter(|j| j.arena_id == arena_id && j.phase == phase)
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn prune_jobs(&self, keep: usize) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let mut removed = 0u64;
        for status in [JobStatus::Completed, JobStatus::Dead] {
            let mut terminal: Vec<(usize, DateTime<Utc>)> = inner
                .jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| j.status == status)
                .map(|(i, j)| (i, j.updated_at))
                .collect();
            if terminal.len() <= keep {
                continue;
            }
            // Oldest first; drop everything beyond the keep budget.
            terminal.sort_by_key(|(_, at)| *at);
            let drop_ids: Vec<usize> = terminal
                .iter()
                .take(terminal.len() - keep)
                .map(|(i, _)| *i)
                .collect();
            let mut index = 0usize;
            inner.jobs.retain(|_| {
                let drop = drop_ids.contains(&index);
                index += 1;
                !drop
            });
            removed += drop_ids.len() as u64;
        }
        Ok(removed)
    }

    async fn stats(&self) -> StoreResult<MirrorStats> {
        let inner = self.inner.read().await;
        let count_status = |status: ArenaStatus| {
            inner.arenas.values().filter(|a| a.status == status).count() as u64
        };
        let count_job = |status: JobStatus| {
            inner.jobs.iter().filter(|j| j.status == status).count() as u64
        };
        let phases = inner.processing.values().flat_map(|row| {
            [PhaseKind::Start, PhaseKind::End]
                .into_iter()
                .map(move |p| row.phase(p).status)
        });
        let mut phases_processing = 0u64;
        let mut phases_failed = 0u64;
        for status in phases {
            match status {
                crate::entities::PhaseStatus::Processing => phases_processing += 1,
                crate::entities::PhaseStatus::Failed => phases_failed += 1,
                _ => {}
            }
        }
        Ok(MirrorStats {
            arenas_total: inner.arenas.len() as u64,
            arenas_waiting: count_status(ArenaStatus::Waiting),
            arenas_active: count_status(ArenaStatus::Active),
            arenas_ended: count_status(ArenaStatus::Ended),
            arenas_canceled: count_status(ArenaStatus::Canceled),
            entries_total: inner.entries.len() as u64,
            transactions_total: inner.transactions.len() as u64,
            jobs_queued: count_job(JobStatus::Queued),
            jobs_running: count_job(JobStatus::Running),
            jobs_dead: count_job(JobStatus::Dead),
            phases_processing,
            phases_failed,
            checkpoint_signature: inner.checkpoint.as_ref().map(|c| c.signature.clone()),
            checkpoint_slot: inner.checkpoint.as_ref().map(|c| c.slot),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn arena(id: u64, status: ArenaStatus) -> ArenaRow {
        let mut row = ArenaRow::shell(id, &format!("arena-addr-{id}"), 5_000_000, 8);
        row.status = status;
        row
    }

    #[tokio::test]
    async fn arena_upsert_preserves_first_entry() {
        let store = MemoryStore::new();
        store.upsert_arena(&arena(1, ArenaStatus::Waiting)).await.unwrap();
        let t0 = Utc::now() - Duration::seconds(90);
        store.note_first_entry(1, t0).await.unwrap();
        // Later sighting must not move it forward.
        store.note_first_entry(1, t0 + Duration::seconds(5)).await.unwrap();

        let mut update = arena(1, ArenaStatus::Active);
        update.observed_slot = 10;
        store.upsert_arena(&update).await.unwrap();

        let row = store.get_arena(1).await.unwrap().unwrap();
        assert_eq!(row.status, ArenaStatus::Active);
        assert_eq!(row.first_entry_at, Some(t0));
        assert_eq!(row.observed_slot, 10);
    }

    #[tokio::test]
    async fn transaction_replay_is_detected() {
        let store = MemoryStore::new();
        let record = TransactionRecord::new("sig-1", 5, None, vec!["join_arena".into()]);
        assert!(store.record_transaction(&record).await.unwrap());
        assert!(!store.record_transaction(&record).await.unwrap());
        assert!(store.is_transaction_applied("sig-1").await.unwrap());
        assert!(!store.is_transaction_applied("sig-2").await.unwrap());
    }

    #[tokio::test]
    async fn checkpoint_never_regresses() {
        let store = MemoryStore::new();
        store.save_checkpoint("sig-a", 100).await.unwrap();
        store.save_checkpoint("sig-b", 90).await.unwrap();
        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.signature, "sig-a");
        assert_eq!(cp.slot, 100);

        store.save_checkpoint("sig-c", 101).await.unwrap();
        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.signature, "sig-c");
    }

    #[tokio::test]
    async fn phase_claim_admits_exactly_one() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut results = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            results.push(tokio::spawn(async move {
                store.claim_phase(42, PhaseKind::Start, now).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in results {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn stuck_processing_is_demoted_then_reclaimable() {
        let store = MemoryStore::new();
        let long_ago = Utc::now() - Duration::minutes(10);
        assert!(store.claim_phase(7, PhaseKind::End, long_ago).await.unwrap());

        let cutoff = Utc::now() - Duration::minutes(2);
        let demoted = store.demote_stuck_processing(cutoff).await.unwrap();
        assert_eq!(demoted, vec![(7, PhaseKind::End)]);

        let row = store.processing_state(7).await.unwrap().unwrap();
        assert_eq!(row.end.status, crate::entities::PhaseStatus::Failed);
        assert!(store.claim_phase(7, PhaseKind::End, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn scheduled_phase_claims_only_after_due_time() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert!(store.claim_phase(3, PhaseKind::End, now).await.unwrap());
        store
            .schedule_phase(3, PhaseKind::End, now + Duration::seconds(10))
            .await
            .unwrap();
        assert!(!store.claim_phase(3, PhaseKind::End, now).await.unwrap());
        assert!(store
            .claim_phase(3, PhaseKind::End, now + Duration::seconds(11))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn job_queue_is_idempotent_and_bounded() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.enqueue_job(42, PhaseKind::Start, now, "{}").await.unwrap();
        let second = store.enqueue_job(42, PhaseKind::Start, now, "{}").await.unwrap();
        assert_eq!(first.id, second.id);

        let claimed = store
            .claim_due_jobs(now, now - Duration::minutes(2), 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);

        // Running job is not claimable again until stale.
        let claimed = store
            .claim_due_jobs(now, now - Duration::minutes(2), 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());

        store
            .fail_job(&first.id, "rpc down", Some(now + Duration::seconds(2)))
            .await
            .unwrap();
        let claimed = store
            .claim_due_jobs(now + Duration::seconds(3), now - Duration::minutes(2), 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 2);

        store.fail_job(&first.id, "gave up", None).await.unwrap();
        let job = store.latest_job(42, PhaseKind::Start).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dead);
    }

    #[tokio::test]
    async fn job_history_is_pruned() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for id in 0..10u64 {
            let job = store.enqueue_job(id, PhaseKind::Start, now, "{}").await.unwrap();
            store.complete_job(&job.id).await.unwrap();
        }
        let removed = store.prune_jobs(3).await.unwrap();
        assert_eq!(removed, 7);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.jobs_queued, 0);
    }

    #[tokio::test]
    async fn entry_prices_merge_latest_wins() {
        let store = MemoryStore::new();
        store.upsert_arena(&arena(1, ArenaStatus::Waiting)).await.unwrap();
        let entry = PlayerEntryRow::shell(1, "player-a", "entry-a", 0, 0, None);
        store.upsert_player_entry(&entry).await.unwrap();

        store
            .set_entry_price(1, 0, PhaseKind::Start, 100)
            .await
            .unwrap();
        store
            .set_entry_price(1, 0, PhaseKind::Start, 120)
            .await
            .unwrap();
        store.set_entry_price(1, 0, PhaseKind::End, 90).await.unwrap();

        let row = store.get_player_entry(1, "player-a").await.unwrap().unwrap();
        assert_eq!(row.start_price, Some(120));
        assert_eq!(row.end_price, Some(90));
        assert_eq!(row.price_movement, Some(-30));

        // A shell re-upsert (replayed join) must not erase prices.
        store.upsert_player_entry(&entry).await.unwrap();
        let row = store.get_player_entry(1, "player-a").await.unwrap().unwrap();
        assert_eq!(row.start_price, Some(120));
    }

    #[tokio::test]
    async fn extreme_prices_clamp_movement_instead_of_wrapping() {
        let store = MemoryStore::new();
        store.upsert_arena(&arena(1, ArenaStatus::Waiting)).await.unwrap();
        let entry = PlayerEntryRow::shell(1, "player-a", "entry-a", 0, 0, None);
        store.upsert_player_entry(&entry).await.unwrap();

        store
            .set_entry_price(1, 0, PhaseKind::Start, u64::MAX)
            .await
            .unwrap();
        store.set_entry_price(1, 0, PhaseKind::End, 0).await.unwrap();
        let row = store.get_player_entry(1, "player-a").await.unwrap().unwrap();
        assert_eq!(row.price_movement, Some(i64::MIN));

        store.set_entry_price(1, 0, PhaseKind::Start, 0).await.unwrap();
        store
            .set_entry_price(1, 0, PhaseKind::End, u64::MAX)
            .await
            .unwrap();
        let row = store.get_player_entry(1, "player-a").await.unwrap().unwrap();
        assert_eq!(row.price_movement, Some(i64::MAX));
    }
}
