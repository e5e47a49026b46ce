//! Durable lifecycle jobs
//!
//! Every triggered transition also lands here so a crash mid-transition is
//! recovered by the queue. Retry scheduling lives in `next_run_at`:
//! a Queued job whose time has come is claimable; exhausted jobs go Dead
//! and stay visible until pruned.

use arena_core::PhaseKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bounded attempts per job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `next_run_at`.
    Queued,
    /// Claimed by a worker.
    Running,
    /// Finished or discarded after inline success.
    Completed,
    /// Attempts exhausted; permanent until an operator intervenes.
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleJobRow {
    pub id: String,
    pub arena_id: u64,
    pub phase: PhaseKind,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Queue payload, JSON: arena id as decimal string plus auxiliary
    /// indices.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LifecycleJobRow {
    pub fn new(arena_id: u64, phase: PhaseKind, run_at: DateTime<Utc>, payload: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            arena_id,
            phase,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            next_run_at: run_at,
            last_error: None,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// Claimable when queued and due, or when a stale Running claim has
    /// outlived `stale_cutoff` (its worker died).
    pub fn claimable(&self, now: DateTime<Utc>, stale_cutoff: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Queued => self.next_run_at <= now,
            JobStatus::Running => self.updated_at < stale_cutoff,
            JobStatus::Completed | JobStatus::Dead => false,
        }
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempts += 1;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.updated_at = Utc::now();
    }

    /// Requeue with a backoff deadline, or go Dead when `next_run` is
    /// absent.
    pub fn mark_failed(&mut self, error: &str, next_run: Option<DateTime<Utc>>) {
        self.last_error = Some(error.to_string());
        match next_run {
            Some(at) => {
                self.status = JobStatus::Queued;
                self.next_run_at = at;
            }
            None => self.status = JobStatus::Dead,
        }
        self.updated_at = Utc::now();
    }

    /// Push the run time without counting an attempt outcome against the
    /// job (used for computed reschedules).
    pub fn delay_until(&mut self, at: DateTime<Utc>) {
        self.status = JobStatus::Queued;
        self.next_run_at = at;
        self.updated_at = Utc::now();
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn queued_job_claims_only_when_due() {
        let now = Utc::now();
        let job = LifecycleJobRow::new(42, PhaseKind::Start, now + Duration::seconds(10), "{}".into());
        let stale = now - Duration::minutes(2);
        assert!(!job.claimable(now, stale));
        assert!(job.claimable(now + Duration::seconds(11), stale));
    }

    #[test]
    fn stale_running_job_is_reclaimable() {
        let now = Utc::now();
        let mut job = LifecycleJobRow::new(42, PhaseKind::End, now, "{}".into());
        job.mark_running(now - Duration::minutes(5));
        assert!(job.claimable(now, now - Duration::minutes(2)));
        assert!(!job.claimable(now, now - Duration::minutes(10)));
    }

    #[test]
    fn failure_requeues_then_dies() {
        let now = Utc::now();
        let mut job = LifecycleJobRow::new(42, PhaseKind::Start, now, "{}".into());
        for attempt in 1..=DEFAULT_MAX_ATTEMPTS {
            job.mark_running(now);
            assert_eq!(job.attempts, attempt);
            if job.exhausted() {
                job.mark_failed("still failing", None);
            } else {
                job.mark_failed("still failing", Some(now + Duration::seconds(2)));
                assert_eq!(job.status, JobStatus::Queued);
            }
        }
        assert_eq!(job.status, JobStatus::Dead);
        assert!(job.status.is_terminal());
        assert_eq!(job.last_error.as_deref(), Some("still failing"));
    }

    #[test]
    fn delay_preserves_attempt_count() {
        let now = Utc::now();
        let mut job = LifecycleJobRow::new(42, PhaseKind::End, now, "{}".into());
        job.mark_running(now);
        job.delay_until(now + Duration::seconds(30));
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.next_run_at, now + Duration::seconds(30));
    }
}
