use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobStatus;

/// Lifetime counters for scheduler activity
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_submitted: AtomicU64,
    jobs_refused: AtomicU64,
    attempts_started: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_rejected: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    notifications_failed: AtomicU64,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_jobs_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Submission turned away because the queue was full
    pub fn increment_jobs_refused(&self) {
        self.jobs_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_attempts_started(&self) {
        self.attempts_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_retried(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_notifications_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a job reaching `status`; non-terminal statuses are ignored
    pub fn record_terminal(&self, status: JobStatus) {
        let counter = match status {
            JobStatus::Completed => &self.jobs_completed,
            JobStatus::Rejected => &self.jobs_rejected,
            JobStatus::Failed => &self.jobs_failed,
            JobStatus::Cancelled => &self.jobs_cancelled,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_submitted(&self) -> u64 {
        self.jobs_submitted.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_cancelled(&self) -> u64 {
        self.jobs_cancelled.load(Ordering::Relaxed)
    }

    /// Jobs in any terminal state
    pub fn jobs_finished(&self) -> u64 {
        self.jobs_completed()
            + self.jobs_rejected.load(Ordering::Relaxed)
            + self.jobs_failed()
            + self.jobs_cancelled()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            jobs_submitted: self.jobs_submitted(),
            jobs_refused: self.jobs_refused.load(Ordering::Relaxed),
            attempts_started: self.attempts_started.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed(),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed(),
            jobs_cancelled: self.jobs_cancelled(),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LiveMetrics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub jobs_submitted: u64,
    pub jobs_refused: u64,
    pub attempts_started: u64,
    pub jobs_retried: u64,
    pub jobs_completed: u64,
    pub jobs_rejected: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub notifications_failed: u64,
}

impl MetricsSnapshot {
    /// Completed share of finished jobs, as a percentage
    pub fn success_rate(&self) -> f64 {
        let finished =
            self.jobs_completed + self.jobs_rejected + self.jobs_failed + self.jobs_cancelled;
        if finished == 0 {
            100.0
        } else {
            (self.jobs_completed as f64 / finished as f64) * 100.0
        }
    }
}

/// Queue gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetrics {
    /// Jobs waiting on the queue, backoff included
    pub queued_count: usize,
    /// Jobs currently processing
    pub active_count: usize,
    pub max_concurrent: usize,
}

impl QueueMetrics {
    pub fn available_slots(&self) -> usize {
        self.max_concurrent.saturating_sub(self.active_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_counters() {
        let metrics = LiveMetrics::new();
        metrics.increment_jobs_submitted();
        metrics.increment_jobs_submitted();
        metrics.record_terminal(JobStatus::Completed);
        metrics.record_terminal(JobStatus::Failed);
        metrics.record_terminal(JobStatus::Queued);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 2);
        assert_eq!(metrics.jobs_finished(), 2);
        assert_eq!(snapshot.success_rate(), 50.0);
    }

    #[test]
    fn test_available_slots() {
        let gauges = QueueMetrics {
            queued_count: 4,
            active_count: 5,
            max_concurrent: 5,
        };
        assert_eq!(gauges.available_slots(), 0);
    }
}
