use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, PriorityTier};

/// Lifecycle events broadcast by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// Job was placed on the queue
    Queued {
        job_id: JobId,
        priority_tier: PriorityTier,
        at: DateTime<Utc>,
    },

    /// An attempt was handed to the generation executor
    Started {
        job_id: JobId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Attempt failed transiently and the job went back on the queue
    Retrying {
        job_id: JobId,
        attempt: u32,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Moderation approved the result
    Completed {
        job_id: JobId,
        result_ref: String,
        at: DateTime<Utc>,
    },

    /// Moderation declined the result
    Rejected {
        job_id: JobId,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Job failed permanently
    Failed {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },

    /// Cancellation was signalled to a running attempt
    CancelRequested {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Job was cancelled
    Cancelled {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "queued",
            Self::Started { .. } => "started",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Rejected { .. } => "rejected",
            Self::Failed { .. } => "failed",
            Self::CancelRequested { .. } => "cancel_requested",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Queued { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Rejected { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::CancelRequested { job_id, .. }
            | Self::Cancelled { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Queued { at, .. }
            | Self::Started { at, .. }
            | Self::Retrying { at, .. }
            | Self::Completed { at, .. }
            | Self::Rejected { at, .. }
            | Self::Failed { at, .. }
            | Self::CancelRequested { at, .. }
            | Self::Cancelled { at, .. } => at,
        }
    }

    /// Whether the event marks a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. }
                | Self::Rejected { .. }
                | Self::Failed { .. }
                | Self::Cancelled { .. }
        )
    }
}
