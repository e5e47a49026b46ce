//! Checkpointed transaction indexer
//!
//! Keeps the mirror caught up with every confirmed transaction touching
//! the arena program, at-least-once with idempotent effects. Each tick
//! pages the newest signatures until it meets the persisted checkpoint,
//! applies the unseen suffix in chronological order, then advances the
//! checkpoint only after the whole batch landed. A slower account-refresh
//! timer re-reads every program account through the same
//! [`Indexer::apply_account_update`] entry point the poll path uses, so
//! neither path special-cases anything.
//!
//! Account ordering conventions per instruction (positions within the
//! observed account list):
//!
//! | instruction                  | accounts                          |
//! |------------------------------|-----------------------------------|
//! | create_arena                 | authority, global_state, arena    |
//! | join_arena / claim_winnings  | player, arena, entry              |
//! | start_arena / end_arena      | authority, arena                  |
//! | cancel_arena                 | authority, arena                  |
//! | set_start_price / set_end_price | authority, arena, entry        |
//! | finalize_arena               | authority, arena, entries...      |
//! | whitelist_token              | authority, token                  |

use std::collections::BTreeSet;
use std::sync::Arc;

use arena_core::{AccountDecoder, AccountRecord, ArenaInstruction, InstructionCodec};
use arena_db::{
    ArenaEvent, ArenaRow, GlobalStateRow, MirrorStore, PlayerEntryRow, SyncCheckpoint, TokenRow,
    TransactionRecord,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::IndexerConfig;
use crate::error::SyncResult;
use crate::metrics::SyncMetrics;
use crate::retry::{with_retries, RetryPolicy};
use crate::rpc::{ChainClient, ObservedInstruction, SignatureInfo, TransactionDetail};

/// Shutdown handle for the indexer loops.
pub struct IndexerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl IndexerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// The indexer. Cheap to share behind an `Arc`; ticks are mutually
/// exclusive through an internal guard.
pub struct Indexer {
    store: Arc<dyn MirrorStore>,
    chain: Arc<dyn ChainClient>,
    decoder: AccountDecoder,
    codec: InstructionCodec,
    program_id: String,
    config: IndexerConfig,
    retry: RetryPolicy,
    metrics: Arc<SyncMetrics>,
    tick_guard: Mutex<()>,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        chain: Arc<dyn ChainClient>,
        program_id: String,
        config: IndexerConfig,
        retry: RetryPolicy,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            store,
            chain,
            decoder: AccountDecoder::new(),
            codec: InstructionCodec::new(),
            program_id,
            config,
            retry,
            metrics,
            tick_guard: Mutex::new(()),
        }
    }

    /// One poll tick: returns the number of transactions applied. A
    /// returned error means the checkpoint did not advance; the next
    /// timer retries the whole batch.
    pub async fn tick(&self) -> SyncResult<usize> {
        let _guard = self.tick_guard.lock().await;
        let result = self.run_tick().await;
        match &result {
            Ok(_) => self.metrics.tick_completed(),
            Err(e) => {
                self.metrics.tick_failed();
                warn!("indexer tick failed, checkpoint unchanged: {}", e);
            }
        }
        result
    }

    async fn run_tick(&self) -> SyncResult<usize> {
        let checkpoint = self.store.checkpoint().await?;
        let unseen = self.collect_unseen(checkpoint.as_ref()).await?;
        if unseen.is_empty() {
            return Ok(0);
        }

        // Newest entry becomes the checkpoint once the batch is durable.
        let newest = unseen[0].clone();
        let mut applied = 0;

        for info in unseen.iter().rev() {
            if self.apply_signature(info).await? {
                applied += 1;
            }
        }

        self.store
            .save_checkpoint(&newest.signature, newest.slot)
            .await?;
        debug!(
            "indexer tick applied {} transactions, checkpoint at slot {}",
            applied, newest.slot
        );
        Ok(applied)
    }

    /// Page newest-first until the checkpoint signature appears or the
    /// pages run out. Without a checkpoint only the newest page is taken;
    /// history belongs to backfill.
    async fn collect_unseen(
        &self,
        checkpoint: Option<&SyncCheckpoint>,
    ) -> SyncResult<Vec<SignatureInfo>> {
        let mut unseen: Vec<SignatureInfo> = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let page = with_retries(&self.retry, &self.metrics, "list signatures", || {
                self.chain.signatures_for_program(
                    &self.program_id,
                    before.as_deref(),
                    self.config.page_limit,
                )
            })
            .await?;
            if page.is_empty() {
                break;
            }
            let full_page = page.len() >= self.config.page_limit;

            let mut reached_checkpoint = false;
            for info in page {
                if let Some(cp) = checkpoint {
                    if info.signature == cp.signature || info.slot < cp.slot {
                        reached_checkpoint = true;
                        break;
                    }
                }
                unseen.push(info);
            }

            if reached_checkpoint || !full_page || checkpoint.is_none() {
                break;
            }
            before = unseen.last().map(|info| info.signature.clone());
        }

        Ok(unseen)
    }

    /// Apply one signature. Fetch failures (after retries) log and skip,
    /// returning `Ok(false)`; store failures propagate and fail the tick.
    async fn apply_signature(&self, info: &SignatureInfo) -> SyncResult<bool> {
        if info.failed() {
            debug!("skipping failed transaction {}", info.signature);
            self.metrics.signature_skipped();
            return Ok(false);
        }
        if self.store.is_transaction_applied(&info.signature).await? {
            debug!("skipping already applied transaction {}", info.signature);
            return Ok(false);
        }

        let detail = match with_retries(&self.retry, &self.metrics, "fetch transaction", || {
            self.chain.fetch_transaction(&info.signature)
        })
        .await
        {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                warn!("confirmed signature {} not found, skipping", info.signature);
                self.metrics.signature_skipped();
                return Ok(false);
            }
            Err(e) => {
                error!("giving up on transaction {}: {}", info.signature, e);
                self.metrics.signature_skipped();
                return Ok(false);
            }
        };

        if detail.failed {
            self.metrics.signature_skipped();
            return Ok(false);
        }

        self.apply_transaction(&detail).await?;
        Ok(true)
    }

    /// Decode and apply a confirmed transaction's program instructions,
    /// then re-read the touched accounts so the mirror carries their
    /// current state.
    pub async fn apply_transaction(&self, detail: &TransactionDetail) -> SyncResult<()> {
        let block_time = detail.block_time.and_then(|t| DateTime::from_timestamp(t, 0));
        let mut actions = Vec::new();
        let mut touched: BTreeSet<String> = BTreeSet::new();

        for (ix_index, ix) in detail.instructions.iter().enumerate() {
            if ix.program != self.program_id {
                continue;
            }
            let Some(parsed) = self.parse_instruction(ix) else {
                continue;
            };

            self.apply_instruction_effects(&parsed, ix, detail, block_time)
                .await?;

            let event = ArenaEvent::new(
                &detail.signature,
                ix_index as u32,
                parsed.arena_id(),
                parsed.kind().name(),
                instruction_json(&parsed),
                detail.slot,
            );
            self.store.append_event(&event).await?;
            actions.push(parsed.kind().name().to_string());
            touched.extend(ix.accounts.iter().cloned());
        }

        if actions.is_empty() {
            return Ok(());
        }

        // Latest-wins refresh of every touched account; a fetch failure
        // here is healed by the periodic refresh.
        for address in &touched {
            match with_retries(&self.retry, &self.metrics, "fetch account", || {
                self.chain.fetch_account(address)
            })
            .await
            {
                Ok(Some(account)) => {
                    self.apply_account_update(&account.address, &account.data, account.slot)
                        .await?;
                }
                Ok(None) => debug!("account {} not on chain (closed?)", address),
                Err(e) => warn!("account refresh for {} failed: {}", address, e),
            }
        }

        let record = TransactionRecord::new(&detail.signature, detail.slot, block_time, actions);
        self.store.record_transaction(&record).await?;
        self.metrics.transaction_indexed();
        Ok(())
    }

    fn parse_instruction(&self, ix: &ObservedInstruction) -> Option<ArenaInstruction> {
        match self.codec.parse(&ix.data) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("unparseable program instruction: {}", e);
                self.metrics.decode_failure();
                None
            }
        }
    }

    /// Instruction-level mirror writes: enough to keep the mirror
    /// chronologically consistent even before the account refresh lands.
    async fn apply_instruction_effects(
        &self,
        parsed: &ArenaInstruction,
        ix: &ObservedInstruction,
        detail: &TransactionDetail,
        block_time: Option<DateTime<Utc>>,
    ) -> SyncResult<()> {
        use arena_core::{ArenaStatus, PhaseKind};

        match parsed {
            ArenaInstruction::CreateArena {
                arena_id,
                entry_fee,
                max_players,
            } => {
                if self.store.get_arena(*arena_id).await?.is_none() {
                    let address = ix.accounts.get(2).cloned().unwrap_or_default();
                    let shell = ArenaRow::shell(*arena_id, &address, *entry_fee, *max_players);
                    self.store.upsert_arena(&shell).await?;
                    debug!("arena {} mirrored from create at {}", arena_id, detail.slot);
                }
            }
            ArenaInstruction::JoinArena { arena_id, .. } => {
                let at = block_time.unwrap_or_else(Utc::now);
                self.store.note_first_entry(*arena_id, at).await?;
            }
            ArenaInstruction::StartArena { arena_id } => {
                self.store
                    .set_arena_status(*arena_id, ArenaStatus::Active)
                    .await?;
            }
            ArenaInstruction::EndArena { arena_id } => {
                self.store
                    .set_arena_status(*arena_id, ArenaStatus::Ended)
                    .await?;
            }
            ArenaInstruction::CancelArena { arena_id } => {
                self.store
                    .set_arena_status(*arena_id, ArenaStatus::Canceled)
                    .await?;
            }
            ArenaInstruction::SetStartPrice {
                arena_id,
                player_index,
                price,
            } => {
                self.store
                    .set_entry_price(*arena_id, *player_index, PhaseKind::Start, *price)
                    .await?;
            }
            ArenaInstruction::SetEndPrice {
                arena_id,
                player_index,
                price,
            } => {
                self.store
                    .set_entry_price(*arena_id, *player_index, PhaseKind::End, *price)
                    .await?;
            }
            ArenaInstruction::ClaimWinnings { arena_id } => {
                if let Some(player) = ix.accounts.first() {
                    self.store.set_entry_claimed(*arena_id, player).await?;
                }
            }
            // Winner flags and token rows carry state the instruction
            // data alone cannot provide; the account refresh writes them.
            ArenaInstruction::FinalizeArena { .. } | ArenaInstruction::WhitelistToken { .. } => {}
        }
        Ok(())
    }

    /// The single entry point both the poll path and the refresh stream
    /// use to write observed account state. Latest wins, unconditionally.
    /// Returns whether the buffer was a program account and got applied.
    pub async fn apply_account_update(
        &self,
        address: &str,
        data: &[u8],
        slot: u64,
    ) -> SyncResult<bool> {
        let record = match self.decoder.decode(data) {
            Ok(record) => record,
            Err(e) => {
                debug!("account {} not decodable: {}", address, e);
                self.metrics.decode_failure();
                return Ok(false);
            }
        };

        match record {
            AccountRecord::GlobalState(r) => {
                self.store
                    .upsert_global_state(&GlobalStateRow::from_record(&r, address, slot))
                    .await?;
            }
            AccountRecord::Arena(r) => {
                self.store
                    .upsert_arena(&ArenaRow::from_record(&r, address, slot))
                    .await?;
            }
            AccountRecord::PlayerEntry(r) => {
                let arena_address = r.arena.to_base58();
                let Some(arena) = self.store.get_arena_by_address(&arena_address).await? else {
                    debug!(
                        "entry {} references unmirrored arena {}, deferring",
                        address, arena_address
                    );
                    return Ok(false);
                };
                let row = PlayerEntryRow::from_record(&r, arena.arena_id, address, slot);
                let first_seen = row.entry_ts.unwrap_or_else(Utc::now);
                self.store.upsert_player_entry(&row).await?;
                self.store.note_first_entry(arena.arena_id, first_seen).await?;
            }
            AccountRecord::WhitelistedToken(r) => {
                self.store
                    .upsert_token(&TokenRow::from_record(&r, address))
                    .await?;
            }
        }
        self.metrics.account_applied();
        Ok(true)
    }

    /// Full program-account refresh, the low-latency complement to the
    /// poller. Returns the number of accounts applied.
    pub async fn refresh_accounts(&self) -> SyncResult<usize> {
        let accounts = with_retries(&self.retry, &self.metrics, "list program accounts", || {
            self.chain.program_accounts(&self.program_id)
        })
        .await?;

        let mut applied = 0;
        for account in accounts {
            if self
                .apply_account_update(&account.address, &account.data, account.slot)
                .await?
            {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Walk history strictly backward from the tip, applying each page
    /// chronologically with the same idempotent per-signature logic. The
    /// checkpoint is never touched. `slot_floor` bounds the walk.
    pub async fn backfill(&self, slot_floor: Option<u64>) -> SyncResult<usize> {
        let _guard = self.tick_guard.lock().await;
        let mut applied = 0;
        let mut before: Option<String> = None;

        loop {
            let page = with_retries(&self.retry, &self.metrics, "list signatures", || {
                self.chain.signatures_for_program(
                    &self.program_id,
                    before.as_deref(),
                    self.config.page_limit,
                )
            })
            .await?;
            if page.is_empty() {
                break;
            }
            let full_page = page.len() >= self.config.page_limit;
            before = page.last().map(|info| info.signature.clone());

            let mut floor_reached = false;
            let mut keep: Vec<SignatureInfo> = Vec::new();
            for info in page {
                if let Some(floor) = slot_floor {
                    if info.slot < floor {
                        floor_reached = true;
                        break;
                    }
                }
                keep.push(info);
            }

            for info in keep.iter().rev() {
                if self.apply_signature(info).await? {
                    applied += 1;
                }
            }

            if floor_reached || !full_page {
                break;
            }
        }

        info!("backfill applied {} transactions", applied);
        Ok(applied)
    }

    /// Spawn the poll and refresh timers.
    pub fn start(self: &Arc<Self>) -> IndexerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let indexer = self.clone();

        let task = tokio::spawn(async move {
            let mut poll_timer = interval(indexer.config.poll_interval());
            let mut refresh_timer = interval(indexer.config.account_refresh_interval());

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("indexer stopped");
                        break;
                    }
                    _ = poll_timer.tick() => {
                        // errors already logged and counted by tick()
                        let _ = indexer.tick().await;
                    }
                    _ = refresh_timer.tick() => {
                        match indexer.refresh_accounts().await {
                            Ok(count) if count > 0 => {
                                debug!("account refresh applied {} accounts", count);
                            }
                            Ok(_) => {}
                            Err(e) => warn!("account refresh failed: {}", e),
                        }
                    }
                }
            }
        });

        IndexerHandle { shutdown_tx, task }
    }
}

/// JSON rendering of instruction arguments for the event audit log.
fn instruction_json(instruction: &ArenaInstruction) -> String {
    let value = match instruction {
        ArenaInstruction::CreateArena {
            arena_id,
            entry_fee,
            max_players,
        } => json!({ "arena_id": arena_id, "entry_fee": entry_fee, "max_players": max_players }),
        ArenaInstruction::JoinArena {
            arena_id,
            asset_index,
        } => json!({ "arena_id": arena_id, "asset_index": asset_index }),
        ArenaInstruction::StartArena { arena_id }
        | ArenaInstruction::EndArena { arena_id }
        | ArenaInstruction::FinalizeArena { arena_id }
        | ArenaInstruction::CancelArena { arena_id }
        | ArenaInstruction::ClaimWinnings { arena_id } => json!({ "arena_id": arena_id }),
        ArenaInstruction::SetStartPrice {
            arena_id,
            player_index,
            price,
        }
        | ArenaInstruction::SetEndPrice {
            arena_id,
            player_index,
            price,
        } => json!({ "arena_id": arena_id, "player_index": player_index, "price": price }),
        ArenaInstruction::WhitelistToken {
            asset_index,
            symbol,
            decimals,
        } => json!({ "asset_index": asset_index, "symbol": symbol, "decimals": decimals }),
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::{
        AccountKey, ArenaRecord, ArenaStatus, InstructionCodec, PlayerEntryRecord,
        WhitelistedTokenRecord,
    };
    use crate::rpc::{AccountData, MockChainClient};
    use arena_db::MemoryStore;

    const PROGRAM: &str = "ArenaProg1111111111111111111111111111111111";

    fn indexer(
        store: Arc<MemoryStore>,
        chain: Arc<MockChainClient>,
    ) -> Indexer {
        Indexer::new(
            store,
            chain,
            PROGRAM.to_string(),
            IndexerConfig {
                poll_interval_ms: 50,
                page_limit: 100,
                account_refresh_interval_ms: 50,
            },
            RetryPolicy {
                max_retries: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
            },
            Arc::new(SyncMetrics::new()),
        )
    }

    fn arena_key(id: u64) -> AccountKey {
        let mut bytes = [7u8; 32];
        bytes[..8].copy_from_slice(&id.to_le_bytes());
        AccountKey::new(bytes)
    }

    fn arena_record(id: u64, status: ArenaStatus, players: u8) -> ArenaRecord {
        ArenaRecord {
            arena_id: id,
            status,
            player_count: players,
            winning_asset: None,
            canceled: false,
            treasury_claimed: false,
            bump: 254,
            start_ts: 0,
            end_ts: 0,
            total_pool: 0,
            entry_fee: 1_000_000,
            max_players: 4,
            vault: AccountKey::new([3u8; 32]),
        }
    }

    fn ix(instruction: &ArenaInstruction, accounts: Vec<String>) -> ObservedInstruction {
        ObservedInstruction {
            program: PROGRAM.to_string(),
            accounts,
            data: InstructionCodec::new().encode(instruction),
        }
    }

    fn tx(signature: &str, slot: u64, instructions: Vec<ObservedInstruction>) -> TransactionDetail {
        TransactionDetail {
            signature: signature.to_string(),
            slot,
            block_time: Some(1_700_000_000 + slot as i64),
            failed: false,
            instructions,
        }
    }

    async fn seed_create(chain: &MockChainClient, id: u64, slot: u64) -> String {
        let address = arena_key(id).to_base58();
        let create = ArenaInstruction::CreateArena {
            arena_id: id,
            entry_fee: 1_000_000,
            max_players: 4,
        };
        chain
            .push_transaction(tx(
                &format!("create-{id}"),
                slot,
                vec![ix(
                    &create,
                    vec!["auth".to_string(), "global".to_string(), address.clone()],
                )],
            ))
            .await;
        chain
            .set_account(
                PROGRAM,
                AccountData {
                    address: address.clone(),
                    data: arena_record(id, ArenaStatus::Waiting, 0).to_bytes(),
                    slot,
                },
            )
            .await;
        address
    }

    #[tokio::test]
    async fn tick_applies_and_advances_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        seed_create(&chain, 1, 10).await;
        assert_eq!(idx.tick().await.unwrap(), 1);

        let arena = store.get_arena(1).await.unwrap().unwrap();
        assert_eq!(arena.status, ArenaStatus::Waiting);

        let checkpoint = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(checkpoint.signature, "create-1");
        assert_eq!(checkpoint.slot, 10);

        // nothing new: no work, checkpoint intact
        assert_eq!(idx.tick().await.unwrap(), 0);
        assert_eq!(store.checkpoint().await.unwrap().unwrap().slot, 10);
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        seed_create(&chain, 1, 10).await;
        idx.tick().await.unwrap();
        let stats_once = store.stats().await.unwrap();

        // re-apply the same transaction directly (as a replayed fetch would)
        let detail = chain.fetch_transaction("create-1").await.unwrap().unwrap();
        idx.apply_transaction(&detail).await.unwrap();

        let stats_twice = store.stats().await.unwrap();
        assert_eq!(stats_once.arenas_total, stats_twice.arenas_total);
        assert_eq!(stats_once.transactions_total, stats_twice.transactions_total);
        assert_eq!(
            store.list_events_for_arena(1, 100).await.unwrap().len(),
            1,
            "replay must not duplicate events"
        );
    }

    #[tokio::test]
    async fn newest_first_pages_cut_at_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        seed_create(&chain, 1, 10).await;
        idx.tick().await.unwrap();

        seed_create(&chain, 2, 11).await;
        seed_create(&chain, 3, 12).await;
        assert_eq!(idx.tick().await.unwrap(), 2, "only the unseen prefix applies");

        let checkpoint = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(checkpoint.signature, "create-3");
        assert_eq!(checkpoint.slot, 12);
    }

    #[tokio::test]
    async fn effects_apply_in_chronological_order() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        let address = seed_create(&chain, 5, 20).await;
        chain
            .push_transaction(tx(
                "start-5",
                21,
                vec![ix(
                    &ArenaInstruction::StartArena { arena_id: 5 },
                    vec!["auth".to_string(), address.clone()],
                )],
            ))
            .await;
        // account state on chain already reflects the start
        chain
            .set_account(
                PROGRAM,
                AccountData {
                    address: address.clone(),
                    data: arena_record(5, ArenaStatus::Active, 2).to_bytes(),
                    slot: 21,
                },
            )
            .await;

        idx.tick().await.unwrap();
        let arena = store.get_arena(5).await.unwrap().unwrap();
        assert_eq!(arena.status, ArenaStatus::Active);

        let events = store.list_events_for_arena(5, 100).await.unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["create_arena", "start_arena"]);
    }

    #[tokio::test]
    async fn failed_signatures_are_skipped_but_checkpoint_advances() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        seed_create(&chain, 1, 10).await;
        let mut failed = tx(
            "failed-join",
            11,
            vec![ix(
                &ArenaInstruction::JoinArena {
                    arena_id: 1,
                    asset_index: 0,
                },
                vec!["player".to_string(), arena_key(1).to_base58(), "entry".to_string()],
            )],
        );
        failed.failed = true;
        chain.push_transaction(failed).await;

        assert_eq!(idx.tick().await.unwrap(), 1);
        let checkpoint = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(checkpoint.signature, "failed-join");

        let arena = store.get_arena(1).await.unwrap().unwrap();
        assert!(arena.first_entry_at.is_none(), "failed join must not count");
    }

    #[tokio::test]
    async fn transport_failure_fails_tick_and_keeps_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        seed_create(&chain, 1, 10).await;
        idx.tick().await.unwrap();

        seed_create(&chain, 2, 11).await;
        chain.set_fail_mode(true);
        assert!(idx.tick().await.is_err());

        let checkpoint = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(checkpoint.signature, "create-1", "checkpoint must not advance");

        chain.set_fail_mode(false);
        assert_eq!(idx.tick().await.unwrap(), 1);
        assert_eq!(
            store.checkpoint().await.unwrap().unwrap().signature,
            "create-2"
        );
    }

    #[tokio::test]
    async fn checkpoint_never_regresses() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        for (id, slot) in [(1u64, 10u64), (2, 11), (3, 12)] {
            seed_create(&chain, id, slot).await;
            idx.tick().await.unwrap();
            assert_eq!(store.checkpoint().await.unwrap().unwrap().slot, slot);
        }

        // a stale save (as a replayed batch might attempt) is ignored
        store.save_checkpoint("create-1", 10).await.unwrap();
        assert_eq!(store.checkpoint().await.unwrap().unwrap().slot, 12);
    }

    #[tokio::test]
    async fn account_refresh_flows_through_same_entry_point() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        // arena + entry + token placed directly on chain, no transactions
        let arena_address = arena_key(9).to_base58();
        chain
            .set_account(
                PROGRAM,
                AccountData {
                    address: arena_address.clone(),
                    data: arena_record(9, ArenaStatus::Waiting, 1).to_bytes(),
                    slot: 30,
                },
            )
            .await;
        let entry = PlayerEntryRecord {
            arena: arena_key(9),
            player: AccountKey::new([4u8; 32]),
            asset_index: 0,
            player_index: 0,
            amount: 1_000_000,
            entry_ts: 1_700_000_100,
            start_price: 0,
            end_price: 0,
            price_movement: 0,
            is_winner: false,
            claimed: false,
            bump: 255,
        };
        chain
            .set_account(
                PROGRAM,
                AccountData {
                    address: "entry-9-0".to_string(),
                    data: entry.to_bytes(),
                    slot: 30,
                },
            )
            .await;
        let token = WhitelistedTokenRecord {
            mint: AccountKey::new([5u8; 32]),
            symbol: "SOL".to_string(),
            asset_index: 0,
            decimals: 9,
            active: true,
            bump: 255,
        };
        chain
            .set_account(
                PROGRAM,
                AccountData {
                    address: "token-0".to_string(),
                    data: token.to_bytes(),
                    slot: 30,
                },
            )
            .await;

        let applied = idx.refresh_accounts().await.unwrap();
        assert_eq!(applied, 3);

        let arena = store.get_arena(9).await.unwrap().unwrap();
        assert_eq!(arena.player_count, 1);
        assert!(arena.first_entry_at.is_some(), "entry sighting drives countdown");
        let entries = store.list_entries_for_arena(9).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            store.get_token_by_index(0).await.unwrap().unwrap().symbol,
            "SOL"
        );
    }

    #[tokio::test]
    async fn foreign_account_bytes_are_rejected_not_guessed() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        let applied = idx
            .apply_account_update("mystery", &[0xde, 0xad, 0xbe, 0xef], 1)
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(store.stats().await.unwrap().arenas_total, 0);
    }

    #[tokio::test]
    async fn backfill_walks_back_to_slot_floor_without_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChainClient::new());
        let idx = indexer(store.clone(), chain.clone());

        seed_create(&chain, 1, 5).await;
        seed_create(&chain, 2, 10).await;
        seed_create(&chain, 3, 15).await;

        let applied = idx.backfill(Some(8)).await.unwrap();
        assert_eq!(applied, 2, "slots below the floor stay untouched");
        assert!(store.get_arena(1).await.unwrap().is_none());
        assert!(store.get_arena(2).await.unwrap().is_some());
        assert!(store.get_arena(3).await.unwrap().is_some());
        assert!(store.checkpoint().await.unwrap().is_none(), "backfill never checkpoints");
    }
}
