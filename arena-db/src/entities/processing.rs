//! Per-arena processing state
//!
//! One row per arena with independent start/end sub-machines. The row is
//! the de-duplication device for lifecycle transitions: claiming a phase
//! is a compare-and-swap on its status, so exactly one pass can hold
//! "processing" at a time, across processes.

use arena_core::PhaseKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Not attempted yet.
    Pending,
    /// A pass holds the phase right now.
    Processing,
    /// Deferred to a computed future time.
    Scheduled,
    /// Transition confirmed done.
    Completed,
    /// Last attempt failed; eligible for re-drive.
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One phase sub-machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    /// Total claims of this phase, across restarts.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set while status is Scheduled.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Set while status is Processing; stuck detection compares this.
    pub processing_since: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            status: PhaseStatus::Pending,
            attempts: 0,
            last_error: None,
            scheduled_at: None,
            processing_since: None,
            updated_at: Utc::now(),
        }
    }
}

impl PhaseState {
    /// Whether a claim may take this phase at `now`.
    pub fn claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            PhaseStatus::Pending | PhaseStatus::Failed => true,
            PhaseStatus::Scheduled => self.scheduled_at.map(|at| at <= now).unwrap_or(true),
            PhaseStatus::Processing | PhaseStatus::Completed => false,
        }
    }

    pub fn claim(&mut self, now: DateTime<Utc>) {
        self.status = PhaseStatus::Processing;
        self.attempts += 1;
        self.processing_since = Some(now);
        self.scheduled_at = None;
        self.updated_at = now;
    }

    pub fn complete(&mut self) {
        self.status = PhaseStatus::Completed;
        self.processing_since = None;
        self.scheduled_at = None;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: &str) {
        self.status = PhaseStatus::Failed;
        self.processing_since = None;
        self.last_error = Some(error.to_string());
        self.updated_at = Utc::now();
    }

    pub fn schedule(&mut self, at: DateTime<Utc>) {
        self.status = PhaseStatus::Scheduled;
        self.processing_since = None;
        self.scheduled_at = Some(at);
        self.updated_at = Utc::now();
    }

    /// Stuck when processing since before `cutoff`.
    pub fn is_stuck(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == PhaseStatus::Processing
            && self.processing_since.map(|at| at < cutoff).unwrap_or(true)
    }
}

/// The per-arena row holding both sub-machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStateRow {
    pub arena_id: u64,
    pub start: PhaseState,
    pub end: PhaseState,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingStateRow {
    pub fn new(arena_id: u64) -> Self {
        Self {
            arena_id,
            start: PhaseState::default(),
            end: PhaseState::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn phase(&self, kind: PhaseKind) -> &PhaseState {
        match kind {
            PhaseKind::Start => &self.start,
            PhaseKind::End => &self.end,
        }
    }

    pub fn phase_mut(&mut self, kind: PhaseKind) -> &mut PhaseState {
        match kind {
            PhaseKind::Start => &mut self.start,
            PhaseKind::End => &mut self.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn claim_takes_pending_and_failed_only_once() {
        let now = Utc::now();
        let mut phase = PhaseState::default();
        assert!(phase.claimable(now));
        phase.claim(now);
        assert_eq!(phase.status, PhaseStatus::Processing);
        assert_eq!(phase.attempts, 1);
        assert!(!phase.claimable(now));

        phase.fail("boom");
        assert!(phase.claimable(now));
        phase.claim(now);
        assert_eq!(phase.attempts, 2);
    }

    #[test]
    fn scheduled_claims_only_when_due() {
        let now = Utc::now();
        let mut phase = PhaseState::default();
        phase.schedule(now + Duration::seconds(30));
        assert!(!phase.claimable(now));
        assert!(phase.claimable(now + Duration::seconds(31)));
    }

    #[test]
    fn completed_is_terminal_for_claims() {
        let now = Utc::now();
        let mut phase = PhaseState::default();
        phase.claim(now);
        phase.complete();
        assert!(!phase.claimable(now + Duration::days(1)));
        assert_eq!(phase.last_error, None);
    }

    #[test]
    fn stuck_detection_uses_processing_age() {
        let now = Utc::now();
        let mut phase = PhaseState::default();
        phase.claim(now - Duration::minutes(5));
        assert!(phase.is_stuck(now - Duration::minutes(2)));
        assert!(!phase.is_stuck(now - Duration::minutes(10)));

        phase.complete();
        assert!(!phase.is_stuck(now));
    }
}
