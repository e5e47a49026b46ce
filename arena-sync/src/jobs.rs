//! Durable lifecycle job worker
//!
//! Every transition the orchestrator triggers also lands in the job
//! queue; this worker is the crash-recovery path that re-drives anything
//! the inline attempt did not finish. Claimed jobs run through the same
//! per-arena phase claim as inline execution, so worker and scanner can
//! never double-submit.
//!
//! Failed attempts requeue with exponential backoff until the configured
//! attempt budget is spent, then go Dead and stay visible for operators.

use std::sync::Arc;

use arena_db::{LifecycleJobRow, MirrorStore, PhaseStatus};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::LifecycleConfig;
use crate::error::SyncResult;
use crate::metrics::SyncMetrics;
use crate::orchestrator::{Orchestrator, PhaseOutcome};

/// Jobs claimed per worker pass.
const CLAIM_BATCH: usize = 16;

/// Shutdown handle for the worker loop.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

pub struct JobWorker {
    store: Arc<dyn MirrorStore>,
    orchestrator: Arc<Orchestrator>,
    config: LifecycleConfig,
    metrics: Arc<SyncMetrics>,
}

impl JobWorker {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        orchestrator: Arc<Orchestrator>,
        config: LifecycleConfig,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            config,
            metrics,
        }
    }

    /// Exponential backoff for the next attempt after `attempts` tries.
    fn backoff_after(&self, attempts: u32) -> ChronoDuration {
        let shift = attempts.saturating_sub(1).min(16);
        let ms = self
            .config
            .retry_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.config.max_backoff_ms);
        ChronoDuration::milliseconds(ms as i64)
    }

    /// One worker pass: claim due jobs and drive each. Returns how many
    /// were claimed.
    pub async fn run_once(&self, now: DateTime<Utc>) -> SyncResult<usize> {
        let stale_cutoff = now - self.config.stuck_threshold();
        let jobs = self
            .store
            .claim_due_jobs(now, stale_cutoff, CLAIM_BATCH)
            .await?;
        let claimed = jobs.len();
        for job in jobs {
            if let Err(e) = self.run_job(&job, now).await {
                error!(
                    "job {} (arena {} {}) errored: {}",
                    job.id,
                    job.arena_id,
                    job.phase.as_str(),
                    e
                );
            }
        }
        Ok(claimed)
    }

    async fn run_job(&self, job: &LifecycleJobRow, now: DateTime<Utc>) -> SyncResult<()> {
        self.metrics.job_executed();
        debug!(
            "job {} running: arena {} {} attempt {}",
            job.id,
            job.arena_id,
            job.phase.as_str(),
            job.attempts
        );

        if !self.store.claim_phase(job.arena_id, job.phase, now).await? {
            return self.settle_unclaimable(job, now).await;
        }

        match self
            .orchestrator
            .run_claimed_phase(job.arena_id, job.phase)
            .await?
        {
            PhaseOutcome::Completed => {
                self.store.complete_job(&job.id).await?;
            }
            PhaseOutcome::Rescheduled(at) => {
                self.store.delay_job(&job.id, at).await?;
            }
            PhaseOutcome::Failed(error) => {
                if job.attempts >= self.config.max_attempts {
                    warn!(
                        "job {} dead after {} attempts: {}",
                        job.id, job.attempts, error
                    );
                    self.store.fail_job(&job.id, &error, None).await?;
                    self.metrics.job_dead();
                } else {
                    let next = now + self.backoff_after(job.attempts);
                    self.store.fail_job(&job.id, &error, Some(next)).await?;
                    self.metrics.job_retried();
                }
            }
        }
        Ok(())
    }

    /// The phase claim lost. Reconcile the job against what the phase
    /// state says instead of burning attempts.
    async fn settle_unclaimable(&self, job: &LifecycleJobRow, now: DateTime<Utc>) -> SyncResult<()> {
        let phase_status = self
            .store
            .processing_state(job.arena_id)
            .await?
            .map(|row| row.phase(job.phase).clone());

        match phase_status {
            Some(state) if state.status == PhaseStatus::Completed => {
                debug!("job {} obsolete, phase already completed", job.id);
                self.store.complete_job(&job.id).await?;
            }
            Some(state) if state.status == PhaseStatus::Scheduled => {
                let at = state.scheduled_at.unwrap_or(now);
                self.store.delay_job(&job.id, at).await?;
            }
            // another pass holds the phase; check back shortly
            _ => {
                let next = now + ChronoDuration::milliseconds(self.config.retry_backoff_ms as i64);
                self.store.delay_job(&job.id, next).await?;
            }
        }
        Ok(())
    }

    /// Spawn the worker loop; drives jobs only while `is_leader` reads
    /// true.
    pub fn start<F>(self: &Arc<Self>, is_leader: F) -> WorkerHandle
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let worker = self.clone();

        let task = tokio::spawn(async move {
            let mut timer = interval(worker.config.scan_interval());
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("job worker stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        if !is_leader() {
                            continue;
                        }
                        match worker.run_once(Utc::now()).await {
                            Ok(count) if count > 0 => {
                                debug!("job worker drove {} jobs", count);
                            }
                            Ok(_) => {}
                            Err(e) => error!("job worker pass failed: {}", e),
                        }
                    }
                }
            }
        });

        WorkerHandle { shutdown_tx, task }
    }
}
