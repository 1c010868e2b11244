use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a generation job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new unique job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Who asked for the video.
///
/// The scheduler never interprets the inner value; it only travels with the
/// job so the notifier and the store can route results back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Requester {
    /// Authenticated account reference
    Account(String),

    /// Anonymous guest token
    Guest(String),
}

impl Requester {
    pub fn account(id: impl Into<String>) -> Self {
        Self::Account(id.into())
    }

    pub fn guest(token: impl Into<String>) -> Self {
        Self::Guest(token.into())
    }

    /// Tier a requester gets when the caller has no better information.
    ///
    /// Premium tiers depend on subscription state, which lives outside the
    /// scheduler, so accounts default to [`PriorityTier::MEMBER`].
    pub fn default_tier(&self) -> super::PriorityTier {
        match self {
            Self::Guest(_) => super::PriorityTier::GUEST,
            Self::Account(_) => super::PriorityTier::MEMBER,
        }
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(id) => write!(f, "account:{}", id),
            Self::Guest(token) => write!(f, "guest:{}", token),
        }
    }
}
