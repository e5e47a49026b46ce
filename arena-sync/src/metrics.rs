//! Sync Service Metrics
//!
//! Monotonic counters for the indexer, election and orchestrator, readable
//! as a serializable snapshot through the operational API. Counters only;
//! anything derivable from the mirror (arena counts, job depths) comes
//! from [`arena_db::MirrorStats`] instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Counter collector, cheap to clone behind an `Arc`.
pub struct SyncMetrics {
    started_at: Instant,

    // indexer
    ticks_completed: AtomicU64,
    ticks_failed: AtomicU64,
    transactions_indexed: AtomicU64,
    signatures_skipped: AtomicU64,
    accounts_applied: AtomicU64,
    decode_failures: AtomicU64,

    // chain RPC
    rpc_retries: AtomicU64,
    rpc_failures: AtomicU64,

    // election
    promotions: AtomicU64,
    demotions: AtomicU64,
    heartbeat_errors: AtomicU64,

    // orchestrator
    transitions_completed: AtomicU64,
    transitions_rescheduled: AtomicU64,
    transitions_failed: AtomicU64,
    stuck_demotions: AtomicU64,

    // jobs
    jobs_executed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_dead: AtomicU64,
    jobs_pruned: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub ticks_completed: u64,
    pub ticks_failed: u64,
    pub transactions_indexed: u64,
    pub signatures_skipped: u64,
    pub accounts_applied: u64,
    pub decode_failures: u64,
    pub rpc_retries: u64,
    pub rpc_failures: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub heartbeat_errors: u64,
    pub transitions_completed: u64,
    pub transitions_rescheduled: u64,
    pub transitions_failed: u64,
    pub stuck_demotions: u64,
    pub jobs_executed: u64,
    pub jobs_retried: u64,
    pub jobs_dead: u64,
    pub jobs_pruned: u64,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            ticks_completed: AtomicU64::new(0),
            ticks_failed: AtomicU64::new(0),
            transactions_indexed: AtomicU64::new(0),
            signatures_skipped: AtomicU64::new(0),
            accounts_applied: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            rpc_retries: AtomicU64::new(0),
            rpc_failures: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            demotions: AtomicU64::new(0),
            heartbeat_errors: AtomicU64::new(0),
            transitions_completed: AtomicU64::new(0),
            transitions_rescheduled: AtomicU64::new(0),
            transitions_failed: AtomicU64::new(0),
            stuck_demotions: AtomicU64::new(0),
            jobs_executed: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            jobs_dead: AtomicU64::new(0),
            jobs_pruned: AtomicU64::new(0),
        }
    }

    pub fn tick_completed(&self) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failed(&self) {
        self.ticks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transaction_indexed(&self) {
        self.transactions_indexed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn signature_skipped(&self) {
        self.signatures_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn account_applied(&self) {
        self.accounts_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_retry(&self) {
        self.rpc_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_failure(&self) {
        self.rpc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn promoted(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn demoted(&self) {
        self.demotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat_error(&self) {
        self.heartbeat_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transition_completed(&self) {
        self.transitions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transition_rescheduled(&self) {
        self.transitions_rescheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transition_failed(&self) {
        self.transitions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stuck_demoted(&self, count: u64) {
        self.stuck_demotions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn job_executed(&self) {
        self.jobs_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_retried(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_dead(&self) {
        self.jobs_dead.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_pruned(&self, count: u64) {
        self.jobs_pruned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            ticks_failed: self.ticks_failed.load(Ordering::Relaxed),
            transactions_indexed: self.transactions_indexed.load(Ordering::Relaxed),
            signatures_skipped: self.signatures_skipped.load(Ordering::Relaxed),
            accounts_applied: self.accounts_applied.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            rpc_retries: self.rpc_retries.load(Ordering::Relaxed),
            rpc_failures: self.rpc_failures.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            heartbeat_errors: self.heartbeat_errors.load(Ordering::Relaxed),
            transitions_completed: self.transitions_completed.load(Ordering::Relaxed),
            transitions_rescheduled: self.transitions_rescheduled.load(Ordering::Relaxed),
            transitions_failed: self.transitions_failed.load(Ordering::Relaxed),
            stuck_demotions: self.stuck_demotions.load(Ordering::Relaxed),
            jobs_executed: self.jobs_executed.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_dead: self.jobs_dead.load(Ordering::Relaxed),
            jobs_pruned: self.jobs_pruned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_snapshot() {
        let metrics = SyncMetrics::new();
        metrics.transaction_indexed();
        metrics.transaction_indexed();
        metrics.account_applied();
        metrics.promoted();
        metrics.stuck_demoted(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.transactions_indexed, 2);
        assert_eq!(snapshot.accounts_applied, 1);
        assert_eq!(snapshot.promotions, 1);
        assert_eq!(snapshot.stuck_demotions, 3);
        assert_eq!(snapshot.jobs_dead, 0);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let metrics = SyncMetrics::new();
        metrics.tick_completed();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"ticks_completed\":1"));
    }
}
