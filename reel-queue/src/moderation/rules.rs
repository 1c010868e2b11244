use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    execution::ArtifactMetadata,
    moderation::{ModerationEvaluator, Verdict},
    QueueError,
};

pub const TOPIC_REJECTED: &str = "Content topic violates community guidelines";
pub const CONTENT_REJECTED: &str = "Generated content violates community guidelines";
pub const LANGUAGE_REJECTED: &str = "Generated content contains filtered language";
pub const CATEGORY_REJECTED: &str = "Content category is not permitted";

/// How much of the artifact the moderator looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Topic only
    Lenient,
    /// Topic plus the artifact's title, description, tags and declared category
    #[default]
    Medium,
    /// Medium, and the artifact must declare a category
    Strict,
}

impl FromStr for Strictness {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "medium" => Ok(Self::Medium),
            "strict" => Ok(Self::Strict),
            other => Err(QueueError::validation(
                "strictness",
                format!("unknown level '{}'", other),
            )),
        }
    }
}

/// Rule set for [`RuleModerator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationRules {
    pub enabled: bool,
    pub strictness: Strictness,
    pub prohibited_topics: Vec<String>,
    /// Content category -> subcategories
    pub content_categories: BTreeMap<String, Vec<String>>,
    pub language_filters: Vec<String>,
}

impl Default for ModerationRules {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut content_categories = BTreeMap::new();
        content_categories.insert(
            "educational".to_string(),
            owned(&["science", "technology", "history", "math", "language"]),
        );
        content_categories.insert(
            "entertainment".to_string(),
            owned(&["gaming", "music", "comedy", "lifestyle"]),
        );
        content_categories.insert(
            "documentary".to_string(),
            owned(&["nature", "travel", "culture", "society"]),
        );

        Self {
            enabled: true,
            strictness: Strictness::default(),
            prohibited_topics: owned(&[
                "violence",
                "hate speech",
                "nudity",
                "illegal activities",
                "harmful content",
                "discrimination",
                "misinformation",
            ]),
            content_categories,
            language_filters: owned(&["offensive", "inappropriate", "harmful"]),
        }
    }
}

impl ModerationRules {
    fn prohibited_in(&self, text: &str) -> Option<&str> {
        self.prohibited_topics
            .iter()
            .find(|topic| text.contains(topic.to_lowercase().as_str()))
            .map(String::as_str)
    }

    fn filtered_in(&self, text: &str) -> Option<&str> {
        self.language_filters
            .iter()
            .find(|word| text.contains(word.to_lowercase().as_str()))
            .map(String::as_str)
    }

    fn is_known_category(&self, category: &str) -> bool {
        let category = category.to_lowercase();
        self.content_categories
            .iter()
            .any(|(name, subs)| *name == category || subs.iter().any(|sub| *sub == category))
    }

    fn check(&self, topic: &str, metadata: &ArtifactMetadata) -> Verdict {
        if !self.enabled {
            return Verdict::Approved;
        }

        if let Some(hit) = self.prohibited_in(&topic.to_lowercase()) {
            debug!("Topic matched prohibited subject '{}'", hit);
            return Verdict::rejected(TOPIC_REJECTED);
        }

        if self.strictness >= Strictness::Medium {
            let text = metadata.searchable_text();
            if let Some(hit) = self.prohibited_in(&text) {
                debug!("Artifact matched prohibited subject '{}'", hit);
                return Verdict::rejected(CONTENT_REJECTED);
            }
            if let Some(hit) = self.filtered_in(&text) {
                debug!("Artifact matched language filter '{}'", hit);
                return Verdict::rejected(LANGUAGE_REJECTED);
            }
        }

        match (self.strictness, metadata.category.as_deref()) {
            (Strictness::Lenient, _) => {}
            (_, Some(category)) if !self.is_known_category(category) => {
                debug!("Artifact declared unknown category '{}'", category);
                return Verdict::rejected(CATEGORY_REJECTED);
            }
            (Strictness::Strict, None) => return Verdict::rejected(CATEGORY_REJECTED),
            _ => {}
        }

        Verdict::Approved
    }
}

/// Partial update for [`RuleModerator::update_rules`]; `None` keeps the current section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesPatch {
    pub enabled: Option<bool>,
    pub strictness: Option<Strictness>,
    pub prohibited_topics: Option<Vec<String>>,
    pub content_categories: Option<BTreeMap<String, Vec<String>>>,
    pub language_filters: Option<Vec<String>>,
}

/// Moderation counters since start-up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModerationStats {
    pub total: u64,
    pub approved: u64,
    pub rejected: u64,
    /// Percentage of approvals, 0 when nothing was evaluated yet
    pub approval_rate: f64,
}

/// Keyword-based moderator
#[derive(Debug, Default)]
pub struct RuleModerator {
    rules: RwLock<ModerationRules>,
    approved: AtomicU64,
    rejected: AtomicU64,
}

impl RuleModerator {
    pub fn new(rules: ModerationRules) -> Self {
        Self {
            rules: RwLock::new(rules),
            approved: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn with_strictness(strictness: Strictness) -> Self {
        Self::new(ModerationRules {
            strictness,
            ..ModerationRules::default()
        })
    }

    pub fn rules(&self) -> ModerationRules {
        self.rules.read().clone()
    }

    /// Replace the sections present in `patch`
    pub fn update_rules(&self, patch: RulesPatch) {
        let mut rules = self.rules.write();

        if let Some(enabled) = patch.enabled {
            rules.enabled = enabled;
        }
        if let Some(strictness) = patch.strictness {
            rules.strictness = strictness;
        }
        if let Some(topics) = patch.prohibited_topics {
            rules.prohibited_topics = topics;
        }
        if let Some(categories) = patch.content_categories {
            rules.content_categories = categories;
        }
        if let Some(filters) = patch.language_filters {
            rules.language_filters = filters;
        }

        info!(
            "Moderation rules updated (enabled={}, strictness={:?})",
            rules.enabled, rules.strictness
        );
    }

    pub fn stats(&self) -> ModerationStats {
        let approved = self.approved.load(Ordering::Relaxed);
        let rejected = self.rejected.load(Ordering::Relaxed);
        let total = approved + rejected;

        ModerationStats {
            total,
            approved,
            rejected,
            approval_rate: if total > 0 {
                approved as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

#[async_trait]
impl ModerationEvaluator for RuleModerator {
    async fn evaluate(&self, topic: &str, metadata: &ArtifactMetadata) -> Verdict {
        let verdict = self.rules.read().check(topic, metadata);

        match verdict {
            Verdict::Approved => self.approved.fetch_add(1, Ordering::Relaxed),
            Verdict::Rejected { .. } => self.rejected.fetch_add(1, Ordering::Relaxed),
        };

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(title: &str) -> ArtifactMetadata {
        ArtifactMetadata::new(title).with_category("science")
    }

    #[tokio::test]
    async fn test_prohibited_topic_rejected_at_every_level() {
        for strictness in [Strictness::Lenient, Strictness::Medium, Strictness::Strict] {
            let moderator = RuleModerator::with_strictness(strictness);
            let verdict = moderator
                .evaluate("A history of Violence in cinema", &artifact("Cinema"))
                .await;
            assert_eq!(verdict, Verdict::rejected(TOPIC_REJECTED));
        }
    }

    #[tokio::test]
    async fn test_artifact_text_checked_from_medium() {
        let metadata = ArtifactMetadata::new("Volcanoes").with_tags(["Inappropriate jokes"]);

        let lenient = RuleModerator::with_strictness(Strictness::Lenient);
        assert!(lenient.evaluate("volcanoes", &metadata).await.is_approved());

        let medium = RuleModerator::with_strictness(Strictness::Medium);
        assert_eq!(
            medium.evaluate("volcanoes", &metadata).await,
            Verdict::rejected(LANGUAGE_REJECTED)
        );
    }

    #[tokio::test]
    async fn test_unknown_category_rejected_from_medium() {
        let metadata = ArtifactMetadata::new("Volcanoes").with_category("astrology");

        let lenient = RuleModerator::with_strictness(Strictness::Lenient);
        assert!(lenient.evaluate("volcanoes", &metadata).await.is_approved());

        let medium = RuleModerator::with_strictness(Strictness::Medium);
        assert_eq!(
            medium.evaluate("volcanoes", &metadata).await,
            Verdict::rejected(CATEGORY_REJECTED)
        );
        assert!(medium
            .evaluate("volcanoes", &ArtifactMetadata::new("Volcanoes"))
            .await
            .is_approved());
        assert!(medium.evaluate("volcanoes", &artifact("Volcanoes")).await.is_approved());
    }

    #[tokio::test]
    async fn test_strict_requires_known_category() {
        let moderator = RuleModerator::with_strictness(Strictness::Strict);

        assert!(moderator.evaluate("volcanoes", &artifact("Volcanoes")).await.is_approved());
        assert!(moderator
            .evaluate("volcanoes", &ArtifactMetadata::new("Volcanoes").with_category("Documentary"))
            .await
            .is_approved());
        assert_eq!(
            moderator.evaluate("volcanoes", &ArtifactMetadata::new("Volcanoes")).await,
            Verdict::rejected(CATEGORY_REJECTED)
        );
    }

    #[tokio::test]
    async fn test_update_rules_and_stats() {
        let moderator = RuleModerator::default();

        assert!(moderator.evaluate("gardening", &artifact("Roses")).await.is_approved());

        moderator.update_rules(RulesPatch {
            prohibited_topics: Some(vec!["gardening".to_string()]),
            ..RulesPatch::default()
        });
        assert!(!moderator.evaluate("gardening", &artifact("Roses")).await.is_approved());

        moderator.update_rules(RulesPatch {
            enabled: Some(false),
            ..RulesPatch::default()
        });
        assert!(moderator.evaluate("gardening", &artifact("Roses")).await.is_approved());

        let stats = moderator.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.rejected, 1);
        assert!((stats.approval_rate - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_strictness_from_str() {
        assert_eq!("STRICT".parse::<Strictness>().unwrap(), Strictness::Strict);
        assert!("paranoid".parse::<Strictness>().is_err());
    }
}
