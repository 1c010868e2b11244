use thiserror::Error;

use crate::JobStatus;

/// Result type for scheduler operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors returned to callers of the scheduler and its collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Bad input rejected at submission; never retried
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Queue bound reached; the caller should try again later
    #[error("Queue is full ({limit} jobs waiting)")]
    CapacityExceeded { limit: usize },

    #[error("Job not found: {0}")]
    NotFound(String),

    /// Compare-and-swap lost against a concurrent writer
    #[error("Job {job_id} is {actual}, expected {expected}")]
    StatusConflict {
        job_id: String,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Job is already queued: {0}")]
    AlreadyQueued(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler is not running")]
    SchedulerStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Create a validation error for `field`
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Errors the caller caused and can fix by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::CapacityExceeded { .. } | Self::NotFound(_)
        )
    }
}

/// Failure reported by a generation provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider refused the parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The provider cannot produce this kind of content
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Only parameter problems are permanent; everything else is worth another try
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidParameters(_) | Self::Unsupported(_))
    }
}

/// Failure reported by a notifier; logged and otherwise ignored
#[derive(Error, Debug, Clone)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

impl NotifyError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("Serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classification() {
        assert!(ProviderError::InvalidParameters("duration".into()).is_permanent());
        assert!(ProviderError::Unsupported("language".into()).is_permanent());
        assert!(!ProviderError::Unavailable("503".into()).is_permanent());
        assert!(!ProviderError::Network("reset".into()).is_permanent());
        assert!(!ProviderError::Internal("oops".into()).is_permanent());
    }

    #[test]
    fn test_error_messages() {
        let err = QueueError::validation("topic", "topic is required");
        assert_eq!(err.to_string(), "Invalid topic: topic is required");
        assert!(err.is_client_error());

        let err = QueueError::StatusConflict {
            job_id: "j1".into(),
            expected: JobStatus::Queued,
            actual: JobStatus::Cancelled,
        };
        assert_eq!(err.to_string(), "Job j1 is cancelled, expected queued");
        assert!(!err.is_client_error());
    }
}
