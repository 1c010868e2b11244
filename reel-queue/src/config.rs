//! Scheduler configuration.
//!
//! Defaults match production settings. Every field can be overridden with
//! the `with_*` builders or from environment variables using the
//! `PREFIX__KEY` convention:
//!
//! ```bash
//! export REEL__MAX_CONCURRENT=8
//! export REEL__ATTEMPT_TIMEOUT_SECS=120
//! ```
//!
//! ```rust
//! use reel_queue::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_vars("REEL__", [
//!     ("REEL__MAX_CONCURRENT".to_string(), "8".to_string()),
//! ]).unwrap();
//! assert_eq!(config.max_concurrent, 8);
//! ```

use std::str::FromStr;
use std::time::Duration;

use crate::{QueueError, QueueResult};

/// Default environment prefix
pub const ENV_PREFIX: &str = "REEL__";

/// Configuration for the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of jobs in `processing` at once
    pub max_concurrent: usize,
    /// Maximum number of queued jobs before `submit` pushes back
    pub max_queue_len: usize,
    /// Maximum execution attempts per job (first try included)
    pub max_attempts: u32,
    /// Hard deadline for a single provider call
    pub attempt_timeout: Duration,
    /// Backoff before the first retry; doubles on each further retry
    pub base_retry_backoff: Duration,
    /// Upper bound for the retry backoff
    pub max_retry_backoff: Duration,
    /// Shortest video a requester may ask for
    pub min_duration_secs: u32,
    /// Longest video a requester may ask for
    pub max_duration_secs: u32,
    /// Topic length limit, in characters
    pub max_topic_chars: usize,
    /// Buffered lifecycle events per subscriber
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_queue_len: 1000,
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(300), // 5 minutes
            base_retry_backoff: Duration::from_secs(1),
            max_retry_backoff: Duration::from_secs(3600), // 1 hour
            min_duration_secs: 10,
            max_duration_secs: 3600,
            max_topic_chars: 200,
            event_capacity: 1000,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_max_queue_len(mut self, max_queue_len: usize) -> Self {
        self.max_queue_len = max_queue_len;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_retry_backoff = base;
        self.max_retry_backoff = max;
        self
    }

    pub fn with_duration_bounds(mut self, min_secs: u32, max_secs: u32) -> Self {
        self.min_duration_secs = min_secs;
        self.max_duration_secs = max_secs;
        self
    }

    /// Load defaults overridden by `REEL__*` environment variables
    pub fn from_env() -> QueueResult<Self> {
        Self::from_vars(ENV_PREFIX, std::env::vars())
    }

    /// Load defaults overridden by any `prefix`-ed key/value pairs.
    ///
    /// Keys are matched case-insensitively after the prefix is stripped
    /// (`REEL__MAX_CONCURRENT` -> `max_concurrent`). Unknown keys are ignored.
    pub fn from_vars<I>(prefix: &str, vars: I) -> QueueResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix(prefix) else {
                continue;
            };
            let name = stripped.to_lowercase();
            let value = value.trim();

            match name.as_str() {
                "max_concurrent" => config.max_concurrent = parse(&key, value)?,
                "max_queue_len" => config.max_queue_len = parse(&key, value)?,
                "max_attempts" => config.max_attempts = parse(&key, value)?,
                "attempt_timeout_secs" => {
                    config.attempt_timeout = Duration::from_secs(parse(&key, value)?)
                }
                "base_retry_backoff_ms" => {
                    config.base_retry_backoff = Duration::from_millis(parse(&key, value)?)
                }
                "max_retry_backoff_secs" => {
                    config.max_retry_backoff = Duration::from_secs(parse(&key, value)?)
                }
                "min_duration_secs" => config.min_duration_secs = parse(&key, value)?,
                "max_duration_secs" => config.max_duration_secs = parse(&key, value)?,
                "max_topic_chars" => config.max_topic_chars = parse(&key, value)?,
                "event_capacity" => config.event_capacity = parse(&key, value)?,
                _ => tracing::debug!("Ignoring unknown scheduler setting {}", key),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> QueueResult<()> {
        if self.max_concurrent == 0 {
            return Err(QueueError::Config("max_concurrent must be at least 1".into()));
        }
        if self.max_queue_len == 0 {
            return Err(QueueError::Config("max_queue_len must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(QueueError::Config("max_attempts must be at least 1".into()));
        }
        if self.attempt_timeout.is_zero() {
            return Err(QueueError::Config("attempt_timeout must be positive".into()));
        }
        if self.base_retry_backoff > self.max_retry_backoff {
            return Err(QueueError::Config(
                "base_retry_backoff cannot exceed max_retry_backoff".into(),
            ));
        }
        if self.min_duration_secs > self.max_duration_secs {
            return Err(QueueError::Config(
                "min_duration_secs cannot exceed max_duration_secs".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(QueueError::Config("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> QueueResult<T> {
    value
        .parse()
        .map_err(|_| QueueError::Config(format!("{} has an invalid value '{}'", key, value)))
}
