//! Terminal-state notifications.
//!
//! The scheduler calls the notifier on a detached task after a job reaches a
//! terminal state. Errors are logged and dropped; they never touch job state.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::{JobRecord, JobStatus, NotifyError};

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn on_terminal(&self, job: &JobRecord) -> Result<(), NotifyError>;
}

/// Requester-facing message for a terminal status
pub fn terminal_message(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Completed => "Your video is ready to watch!",
        JobStatus::Failed => "There was an issue generating your content. Please try again.",
        JobStatus::Rejected => "Your content request was rejected by our moderation system.",
        JobStatus::Cancelled => "Your content request was cancelled.",
        _ => "Your requested content has been generated!",
    }
}

/// Emits the notification as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn on_terminal(&self, job: &JobRecord) -> Result<(), NotifyError> {
        let payload = json!({
            "type": "content_generation",
            "job_id": job.id,
            "requester": job.requester,
            "status": job.status,
            "result_ref": job.result_ref,
            "last_error": job.last_error,
            "message": terminal_message(job.status),
        });

        info!(
            requester = %job.requester,
            "Notification for job {}: {}",
            job.id,
            payload
        );
        Ok(())
    }
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn on_terminal(&self, _job: &JobRecord) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenerationParams, JobId, PriorityTier, Requester, Transition, VideoStyle};
    use tracing_test::traced_test;

    #[test]
    fn test_terminal_messages() {
        assert_eq!(terminal_message(JobStatus::Completed), "Your video is ready to watch!");
        assert!(terminal_message(JobStatus::Rejected).contains("moderation"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_tracing_notifier_logs_message() {
        let mut job = JobRecord::new(
            JobId::from("job-42"),
            Requester::account("u1"),
            GenerationParams {
                topic: "tides".to_string(),
                style: VideoStyle::Educational,
                language: "en".to_string(),
                target_duration_secs: 60,
            },
            PriorityTier::MEMBER,
            3,
        );
        job.apply(JobStatus::Queued, Transition::none());
        job.apply(JobStatus::Processing, Transition::start_attempt(1));
        job.apply(JobStatus::Completed, Transition::complete("videos/job-42.mp4"));

        TracingNotifier.on_terminal(&job).await.unwrap();

        assert!(logs_contain("Notification for job job-42"));
        assert!(logs_contain("Your video is ready to watch!"));
    }
}
