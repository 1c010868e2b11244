use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GenerationParams, JobId, PriorityTier, Requester};

/// Job status lifecycle
///
/// ```text
/// pending -> queued -> processing -> completed | rejected | failed | cancelled
///              ^            |
///              +-- retry ---+
/// queued -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Validated and recorded, not yet on the queue
    Pending,

    /// On the queue, waiting for a concurrency slot (or for its retry backoff)
    Queued,

    /// An attempt is running against the generation provider
    Processing,

    /// Moderation approved the generated artifact
    Completed,

    /// Moderation declined the generated artifact
    Rejected,

    /// Attempts exhausted or a permanent failure
    Failed,

    /// Cancelled by the requester
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::Failed | Self::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Processing)
                | (Queued, Cancelled)
                | (Processing, Completed)
                | (Processing, Rejected)
                | (Processing, Queued)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }

    /// Get the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Field changes that travel with a status transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub attempt: Option<u32>,
    pub last_error: Option<String>,
    pub result_ref: Option<String>,
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl Transition {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn start_attempt(attempt: u32) -> Self {
        Self {
            attempt: Some(attempt),
            ..Self::default()
        }
    }

    pub fn retry(error: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            last_error: Some(error.into()),
            enqueued_at: Some(enqueued_at),
            ..Self::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            last_error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn complete(result_ref: impl Into<String>) -> Self {
        Self {
            result_ref: Some(result_ref.into()),
            ..Self::default()
        }
    }
}

/// Job record - the store's view of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub requester: Requester,
    pub params: GenerationParams,
    pub priority_tier: PriorityTier,

    /// Tie-break within a tier; refreshed when a retry is re-enqueued
    pub enqueued_at: DateTime<Utc>,

    /// Attempts started so far (starts at 0)
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,

    /// Published artifact; only ever set on `completed`
    pub result_ref: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What callers get back from `status`
pub type JobSnapshot = JobRecord;

impl JobRecord {
    /// Create a new pending job record
    pub fn new(
        id: JobId,
        requester: Requester,
        params: GenerationParams,
        priority_tier: PriorityTier,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();

        Self {
            id,
            requester,
            params,
            priority_tier,
            enqueued_at: now,
            attempt: 0,
            max_attempts,
            status: JobStatus::Pending,
            last_error: None,
            result_ref: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `next` and apply the transition's field changes.
    ///
    /// Callers are expected to have checked `can_transition_to`; the store
    /// does so under its lock.
    pub fn apply(&mut self, next: JobStatus, transition: Transition) {
        let now = Utc::now();

        if let Some(attempt) = transition.attempt {
            self.attempt = self.attempt.max(attempt);
        }
        if let Some(error) = transition.last_error {
            self.last_error = Some(error);
        }
        if let Some(enqueued_at) = transition.enqueued_at {
            self.enqueued_at = enqueued_at;
        }
        if next == JobStatus::Completed {
            self.result_ref = transition.result_ref;
        }

        match next {
            JobStatus::Processing => self.started_at = Some(now),
            status if status.is_terminal() => self.finished_at = Some(now),
            _ => {}
        }

        self.status = next;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoStyle;

    fn record() -> JobRecord {
        JobRecord::new(
            JobId::new(),
            Requester::guest("g"),
            GenerationParams {
                topic: "volcanoes".to_string(),
                style: VideoStyle::Educational,
                language: "en".to_string(),
                target_duration_secs: 60,
            },
            PriorityTier::GUEST,
            3,
        )
    }

    #[test]
    fn test_state_machine_table() {
        use JobStatus::*;

        assert!(Pending.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Queued));
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Queued.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Pending));

        for terminal in [Completed, Rejected, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Queued, Processing, Completed, Rejected, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_result_ref_only_on_completed() {
        let mut job = record();
        job.apply(JobStatus::Queued, Transition::none());
        job.apply(JobStatus::Processing, Transition::start_attempt(1));
        job.apply(JobStatus::Rejected, Transition {
            result_ref: Some("s3://leak".to_string()),
            last_error: Some("denied".to_string()),
            ..Transition::default()
        });

        assert_eq!(job.result_ref, None);
        assert_eq!(job.last_error.as_deref(), Some("denied"));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_attempt_never_decreases() {
        let mut job = record();
        job.apply(JobStatus::Queued, Transition::none());
        job.apply(JobStatus::Processing, Transition::start_attempt(2));
        job.apply(JobStatus::Queued, Transition::start_attempt(1));
        assert_eq!(job.attempt, 2);
    }
}
