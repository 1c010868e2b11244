//! Moderation gate run on every successful generation before it is published.

pub mod rules;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::execution::ArtifactMetadata;

pub use rules::{ModerationRules, ModerationStats, RuleModerator, RulesPatch, Strictness};

/// Moderation decision for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Rejected { reason: String },
}

impl Verdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Decides whether a generated artifact may be published
#[async_trait]
pub trait ModerationEvaluator: Send + Sync + 'static {
    async fn evaluate(&self, topic: &str, metadata: &ArtifactMetadata) -> Verdict;
}
