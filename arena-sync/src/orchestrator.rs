//! Round lifecycle orchestrator
//!
//! Drives arenas through Waiting → Active → Ended by submitting signed
//! lifecycle transactions as the authority. Two clocks are in play:
//! wall-clock decides when to act, the chain clock decides whether the
//! action will be accepted. Every transition is guarded by the per-arena
//! processing-state claim, so duplicate triggers (scan overlap, job
//! worker, promotion recovery) collapse to one on-chain submission.
//!
//! A transition runs inline for latency and is also enqueued as a durable
//! job; inline success completes the job immediately, inline failure
//! leaves it for the worker's backoff schedule.

use std::sync::Arc;

use arena_core::{
    AccountDecoder, AccountKey, AccountRecord, ArenaInstruction, ArenaStatus, InstructionCodec,
    PhaseKind,
};
use arena_db::{ArenaRow, MirrorStore, PlayerEntryRow};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use arena_core::envelope::{AccountMeta, Instruction, TransactionMessage};

use crate::config::LifecycleConfig;
use crate::error::{SyncError, SyncResult};
use crate::metrics::SyncMetrics;
use crate::oracle::PriceCache;
use crate::retry::{with_retries, RetryPolicy};
use crate::rpc::ChainClient;
use crate::signer::AuthoritySigner;

/// Result of executing one claimed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Transition confirmed submitted; phase completed.
    Completed,
    /// Chain says not yet; phase scheduled for the computed time.
    Rescheduled(DateTime<Utc>),
    /// Attempt failed; phase marked failed for re-drive.
    Failed(String),
}

/// Shutdown handle for the reconciliation scanner.
pub struct ScannerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ScannerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

pub struct Orchestrator {
    store: Arc<dyn MirrorStore>,
    chain: Arc<dyn ChainClient>,
    signer: AuthoritySigner,
    prices: Arc<PriceCache>,
    decoder: AccountDecoder,
    codec: InstructionCodec,
    program: AccountKey,
    config: LifecycleConfig,
    retry: RetryPolicy,
    metrics: Arc<SyncMetrics>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn MirrorStore>,
        chain: Arc<dyn ChainClient>,
        signer: AuthoritySigner,
        prices: Arc<PriceCache>,
        program_id: &str,
        config: LifecycleConfig,
        retry: RetryPolicy,
        metrics: Arc<SyncMetrics>,
    ) -> SyncResult<Self> {
        let program = AccountKey::from_base58(program_id).map_err(SyncError::Decode)?;
        Ok(Self {
            store,
            chain,
            signer,
            prices,
            decoder: AccountDecoder::new(),
            codec: InstructionCodec::new(),
            program,
            config,
            retry,
            metrics,
        })
    }

    // ==================== reconciliation ====================

    /// One reconciliation pass: demote stuck claims, trigger every due
    /// transition, prune terminal job history. Called on the scan timer
    /// and once on promotion.
    pub async fn scan_once(&self) -> SyncResult<()> {
        let now = Utc::now();

        let demoted = self
            .store
            .demote_stuck_processing(now - self.config.stuck_threshold())
            .await?;
        if !demoted.is_empty() {
            self.metrics.stuck_demoted(demoted.len() as u64);
            for (arena_id, phase) in &demoted {
                warn!(
                    "arena {} {} phase stuck in processing, demoted for re-drive",
                    arena_id,
                    phase.as_str()
                );
            }
        }

        for arena in self.store.list_non_terminal_arenas().await? {
            let due_phase = match arena.status {
                ArenaStatus::Waiting if self.start_due(&arena, now) => Some(PhaseKind::Start),
                ArenaStatus::Active if self.end_due(&arena, now) => Some(PhaseKind::End),
                _ => None,
            };
            if let Some(phase) = due_phase {
                if let Err(e) = self.trigger(arena.arena_id, phase).await {
                    error!(
                        "arena {} {} trigger failed: {}",
                        arena.arena_id,
                        phase.as_str(),
                        e
                    );
                }
            }
        }

        let pruned = self.store.prune_jobs(self.config.job_history_keep).await?;
        if pruned > 0 {
            self.metrics.jobs_pruned(pruned);
            debug!("pruned {} terminal job rows", pruned);
        }
        Ok(())
    }

    /// Promotion / restart recovery: one immediate pass over everything
    /// non-terminal.
    pub async fn recover(&self) -> SyncResult<()> {
        info!("lifecycle recovery pass");
        self.scan_once().await
    }

    /// Start is due at capacity, or when the join countdown has elapsed
    /// since the first entrant.
    fn start_due(&self, arena: &ArenaRow, now: DateTime<Utc>) -> bool {
        if arena.player_count == 0 {
            return false;
        }
        if arena.player_count >= arena.max_players {
            return true;
        }
        arena
            .first_entry_at
            .map(|at| at + self.config.countdown() <= now)
            .unwrap_or(false)
    }

    /// End is due once wall-clock passes the recorded end time plus the
    /// safety buffer. The chain clock still gets the final word in
    /// [`Orchestrator::execute_end`].
    fn end_due(&self, arena: &ArenaRow, now: DateTime<Utc>) -> bool {
        arena
            .end_ts
            .map(|end| end + self.config.end_buffer() <= now)
            .unwrap_or(false)
    }

    // ==================== transition entry points ====================

    /// Claim and run one transition. Returns false when the phase was not
    /// claimable (held, done, or deferred) — the expected branch under
    /// duplicate triggers.
    pub async fn trigger(&self, arena_id: u64, phase: PhaseKind) -> SyncResult<bool> {
        let now = Utc::now();
        if !self.store.claim_phase(arena_id, phase, now).await? {
            debug!(
                "arena {} {} phase not claimable, skipping",
                arena_id,
                phase.as_str()
            );
            return Ok(false);
        }
        info!("arena {} {} transition claimed", arena_id, phase.as_str());

        // Durable shadow of the inline attempt; a crash below this line is
        // recovered by the job worker.
        let payload = json!({ "arena_id": arena_id.to_string() }).to_string();
        let job = self
            .store
            .enqueue_job(arena_id, phase, now, &payload)
            .await?;

        match self.run_claimed_phase(arena_id, phase).await? {
            PhaseOutcome::Completed => {
                self.store.complete_job(&job.id).await?;
            }
            PhaseOutcome::Rescheduled(at) => {
                self.store.delay_job(&job.id, at).await?;
            }
            PhaseOutcome::Failed(error) => {
                let next = now + ChronoDuration::milliseconds(self.config.retry_backoff_ms as i64);
                self.store.fail_job(&job.id, &error, Some(next)).await?;
            }
        }
        Ok(true)
    }

    /// Execute a phase the caller has already claimed, and settle the
    /// processing state from the result. Chain-level failures become
    /// outcomes; store failures propagate.
    pub async fn run_claimed_phase(
        &self,
        arena_id: u64,
        phase: PhaseKind,
    ) -> SyncResult<PhaseOutcome> {
        let result = match phase {
            PhaseKind::Start => self.execute_start(arena_id).await,
            PhaseKind::End => self.execute_end(arena_id).await,
        };

        match result {
            Ok(()) => {
                self.store.complete_phase(arena_id, phase).await?;
                self.metrics.transition_completed();
                info!("arena {} {} transition completed", arena_id, phase.as_str());
                Ok(PhaseOutcome::Completed)
            }
            Err(e) if e.is_duration_not_complete() => {
                let at = self.compute_end_reschedule(arena_id).await;
                self.store.schedule_phase(arena_id, phase, at).await?;
                self.metrics.transition_rescheduled();
                info!(
                    "arena {} {} deferred by chain clock, rescheduled for {}",
                    arena_id,
                    phase.as_str(),
                    at
                );
                Ok(PhaseOutcome::Rescheduled(at))
            }
            Err(e) => {
                let message = e.to_string();
                self.store.fail_phase(arena_id, phase, &message).await?;
                self.metrics.transition_failed();
                warn!(
                    "arena {} {} transition failed: {}",
                    arena_id,
                    phase.as_str(),
                    message
                );
                Ok(PhaseOutcome::Failed(message))
            }
        }
    }

    // ==================== start ====================

    /// Start the round, then submit one priced entry per participant.
    /// Re-drive safe: an already-started arena skips the start
    /// instruction, already-priced entries are skipped.
    async fn execute_start(&self, arena_id: u64) -> SyncResult<()> {
        let arena = self.require_arena(arena_id).await?;
        let entries = self.store.list_entries_for_arena(arena_id).await?;
        if entries.is_empty() {
            return Err(SyncError::InvalidState(format!(
                "arena {arena_id} has no entries to start"
            )));
        }

        match arena.status {
            ArenaStatus::Waiting => {
                let arena_key = AccountKey::from_base58(&arena.address).map_err(SyncError::Decode)?;
                self.submit_one(
                    &ArenaInstruction::StartArena { arena_id },
                    vec![
                        AccountMeta::signer(self.signer.address()),
                        AccountMeta::writable(arena_key),
                    ],
                )
                .await?;
                tokio::time::sleep(self.config.inter_tx_delay()).await;
            }
            ArenaStatus::Active => {
                debug!("arena {} already active, driving prices only", arena_id);
            }
            other => {
                return Err(SyncError::InvalidState(format!(
                    "arena {arena_id} cannot start from {}",
                    other.as_str()
                )));
            }
        }

        self.submit_prices(&arena, &entries, PhaseKind::Start).await
    }

    // ==================== end ====================

    /// End the round: chain-clock guard, end instruction, end prices,
    /// then finalize with every entry account attached.
    async fn execute_end(&self, arena_id: u64) -> SyncResult<()> {
        let arena = self.require_arena(arena_id).await?;
        let entries = self.store.list_entries_for_arena(arena_id).await?;
        let arena_key = AccountKey::from_base58(&arena.address).map_err(SyncError::Decode)?;

        // The chain clock is authoritative. A mirror that believes the
        // round is over while the chain disagrees means local clock skew;
        // defer instead of burning an attempt on a certain rejection.
        if let Some(remaining) = self.chain_remaining_secs(&arena).await? {
            if remaining > 0 {
                return Err(SyncError::ChainRejection {
                    message: format!("Arena duration not complete: {remaining}s remaining"),
                });
            }
        }

        if arena.status == ArenaStatus::Active {
            self.submit_one(
                &ArenaInstruction::EndArena { arena_id },
                vec![
                    AccountMeta::signer(self.signer.address()),
                    AccountMeta::writable(arena_key),
                ],
            )
            .await?;
            tokio::time::sleep(self.config.inter_tx_delay()).await;
        }

        self.submit_prices(&arena, &entries, PhaseKind::End).await?;

        let mut accounts = vec![
            AccountMeta::signer(self.signer.address()),
            AccountMeta::writable(arena_key),
        ];
        for entry in &entries {
            let key = AccountKey::from_base58(&entry.address).map_err(SyncError::Decode)?;
            accounts.push(AccountMeta::writable(key));
        }
        self.submit_one(&ArenaInstruction::FinalizeArena { arena_id }, accounts)
            .await?;
        Ok(())
    }

    /// Seconds left on the round according to the chain's own account
    /// state and clock. `None` when the account is unreadable (the
    /// submission itself will then arbitrate).
    async fn chain_remaining_secs(&self, arena: &ArenaRow) -> SyncResult<Option<i64>> {
        let account = match with_retries(&self.retry, &self.metrics, "fetch arena account", || {
            self.chain.fetch_account(&arena.address)
        })
        .await
        {
            Ok(Some(account)) => account,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("chain-clock guard unavailable for arena {}: {}", arena.arena_id, e);
                return Ok(None);
            }
        };
        let Ok(AccountRecord::Arena(record)) = self.decoder.decode(&account.data) else {
            return Ok(None);
        };
        if record.end_ts == 0 {
            return Ok(None);
        }
        let chain_now = with_retries(&self.retry, &self.metrics, "chain time", || {
            self.chain.chain_time()
        })
        .await?;
        Ok(Some(record.end_ts - chain_now))
    }

    /// Reschedule time after a "duration not complete" rejection:
    /// now + authoritative remaining + buffer. Falls back to just the
    /// buffer when the chain cannot be consulted.
    async fn compute_end_reschedule(&self, arena_id: u64) -> DateTime<Utc> {
        let buffer = self.config.end_buffer();
        let remaining = match self.store.get_arena(arena_id).await {
            Ok(Some(arena)) => match self.chain_remaining_secs(&arena).await {
                Ok(Some(secs)) => secs.max(0),
                _ => 0,
            },
            _ => 0,
        };
        Utc::now() + ChronoDuration::seconds(remaining) + buffer
    }

    // ==================== submission plumbing ====================

    /// Price and submit one set-price instruction per entry that still
    /// lacks a price for `phase`, serialized with the inter-tx delay.
    async fn submit_prices(
        &self,
        arena: &ArenaRow,
        entries: &[PlayerEntryRow],
        phase: PhaseKind,
    ) -> SyncResult<()> {
        let arena_key = AccountKey::from_base58(&arena.address).map_err(SyncError::Decode)?;
        let mut submitted = 0;

        for entry in entries {
            let already_priced = match phase {
                PhaseKind::Start => entry.start_price.is_some(),
                PhaseKind::End => entry.end_price.is_some(),
            };
            if already_priced {
                continue;
            }

            let price = self.price_for_asset(entry.asset_index).await?;
            let instruction = match phase {
                PhaseKind::Start => ArenaInstruction::SetStartPrice {
                    arena_id: arena.arena_id,
                    player_index: entry.player_index,
                    price,
                },
                PhaseKind::End => ArenaInstruction::SetEndPrice {
                    arena_id: arena.arena_id,
                    player_index: entry.player_index,
                    price,
                },
            };
            let entry_key = AccountKey::from_base58(&entry.address).map_err(SyncError::Decode)?;
            if submitted > 0 {
                tokio::time::sleep(self.config.inter_tx_delay()).await;
            }
            self.submit_one(
                &instruction,
                vec![
                    AccountMeta::signer(self.signer.address()),
                    AccountMeta::writable(arena_key),
                    AccountMeta::writable(entry_key),
                ],
            )
            .await?;
            submitted += 1;
        }

        if submitted > 0 {
            tokio::time::sleep(self.config.inter_tx_delay()).await;
            debug!(
                "arena {} submitted {} {} prices",
                arena.arena_id,
                submitted,
                phase.as_str()
            );
        }
        Ok(())
    }

    /// Resolve an asset index to a current price through the token
    /// registry and the price cache.
    async fn price_for_asset(&self, asset_index: u8) -> SyncResult<u64> {
        let token = self
            .store
            .get_token_by_index(asset_index)
            .await?
            .filter(|t| t.active)
            .ok_or_else(|| {
                SyncError::InvalidState(format!("no active token for asset index {asset_index}"))
            })?;
        self.prices
            .price_for(&token.symbol)
            .await?
            .ok_or_else(|| SyncError::Oracle(format!("no price coverage for {}", token.symbol)))
    }

    /// Sign and submit a one-instruction transaction. Transient transport
    /// errors retry; program rejections surface to the caller.
    async fn submit_one(
        &self,
        instruction: &ArenaInstruction,
        accounts: Vec<AccountMeta>,
    ) -> SyncResult<String> {
        let blockhash = with_retries(&self.retry, &self.metrics, "latest blockhash", || {
            self.chain.latest_blockhash()
        })
        .await?;
        let message = TransactionMessage::new(self.signer.address(), blockhash).with_instruction(
            Instruction {
                program: self.program,
                accounts,
                data: self.codec.encode(instruction),
            },
        );
        let tx = self.signer.sign_transaction(message)?;
        let signature = self.chain.submit_transaction(&tx).await?;
        debug!(
            "submitted {} as {}",
            instruction.kind().name(),
            signature
        );
        Ok(signature)
    }

    async fn require_arena(&self, arena_id: u64) -> SyncResult<ArenaRow> {
        self.store
            .get_arena(arena_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("arena {arena_id}")))
    }

    // ==================== scanner loop ====================

    /// Spawn the reconciliation scanner. The loop runs only while
    /// `is_leader` reads true; followers idle on the same timer.
    pub fn start<F>(self: &Arc<Self>, is_leader: F) -> ScannerHandle
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let orchestrator = self.clone();

        let task = tokio::spawn(async move {
            let mut timer = interval(orchestrator.config.scan_interval());
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("lifecycle scanner stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        if !is_leader() {
                            continue;
                        }
                        if let Err(e) = orchestrator.scan_once().await {
                            error!("reconciliation scan failed: {}", e);
                        }
                    }
                }
            }
        });

        ScannerHandle { shutdown_tx, task }
    }
}
