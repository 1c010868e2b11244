use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{PriorityTier, Requester};
use crate::{QueueError, QueueResult, SchedulerConfig};

/// Presentation style requested for the video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStyle {
    #[default]
    Educational,
    Entertainment,
    Documentary,
    Tutorial,
    Explainer,
    Animation,
    Cinematic,
}

impl VideoStyle {
    pub fn all() -> &'static [VideoStyle] {
        &[
            Self::Educational,
            Self::Entertainment,
            Self::Documentary,
            Self::Tutorial,
            Self::Explainer,
            Self::Animation,
            Self::Cinematic,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Educational => "educational",
            Self::Entertainment => "entertainment",
            Self::Documentary => "documentary",
            Self::Tutorial => "tutorial",
            Self::Explainer => "explainer",
            Self::Animation => "animation",
            Self::Cinematic => "cinematic",
        }
    }
}

impl std::fmt::Display for VideoStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for VideoStyle {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|style| style.name() == wanted)
            .ok_or_else(|| QueueError::validation("style", format!("unsupported style '{}'", s)))
    }
}

/// Generation parameters - immutable once the job exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub topic: String,
    pub style: VideoStyle,
    /// Two-letter language code, lower case
    pub language: String,
    pub target_duration_secs: u32,
}

impl GenerationParams {
    pub fn target_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.target_duration_secs))
    }
}

/// Everything a caller supplies to [`Scheduler::submit`](crate::Scheduler::submit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub topic: String,
    pub style: VideoStyle,
    pub language: String,
    pub duration_secs: u32,
    pub priority_tier: PriorityTier,
    pub requester: Requester,
}

impl SubmitRequest {
    /// Default duration applied when the caller does not pick one
    pub const DEFAULT_DURATION_SECS: u32 = 300;

    /// Create a request with default style, language and duration.
    ///
    /// The priority tier starts at the requester's default tier.
    pub fn new(topic: impl Into<String>, requester: Requester) -> Self {
        Self {
            topic: topic.into(),
            style: VideoStyle::default(),
            language: "en".to_string(),
            duration_secs: Self::DEFAULT_DURATION_SECS,
            priority_tier: requester.default_tier(),
            requester,
        }
    }

    pub fn with_style(mut self, style: VideoStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_priority_tier(mut self, tier: PriorityTier) -> Self {
        self.priority_tier = tier;
        self
    }

    /// Check the request against admission limits and normalize it.
    pub fn validate(&self, config: &SchedulerConfig) -> QueueResult<GenerationParams> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err(QueueError::validation("topic", "topic is required"));
        }
        if topic.chars().count() > config.max_topic_chars {
            return Err(QueueError::validation(
                "topic",
                format!("topic cannot exceed {} characters", config.max_topic_chars),
            ));
        }

        if self.duration_secs < config.min_duration_secs
            || self.duration_secs > config.max_duration_secs
        {
            return Err(QueueError::validation(
                "duration",
                format!(
                    "duration must be between {} and {} seconds",
                    config.min_duration_secs, config.max_duration_secs
                ),
            ));
        }

        let language = self.language.trim().to_lowercase();
        if language.len() != 2 || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(QueueError::validation(
                "language",
                "language must be a 2-letter code (e.g. en, es, fr)",
            ));
        }

        Ok(GenerationParams {
            topic: topic.to_string(),
            style: self.style,
            language,
            target_duration_secs: self.duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(topic: &str) -> SubmitRequest {
        SubmitRequest::new(topic, Requester::account("user-1"))
    }

    #[test]
    fn test_valid_request_is_normalized() {
        let config = SchedulerConfig::default();
        let params = request("  Black holes  ")
            .with_language("EN")
            .with_style(VideoStyle::Documentary)
            .validate(&config)
            .unwrap();

        assert_eq!(params.topic, "Black holes");
        assert_eq!(params.language, "en");
        assert_eq!(params.style, VideoStyle::Documentary);
        assert_eq!(params.target_duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_blank_topic_rejected() {
        let err = request("   ").validate(&SchedulerConfig::default()).unwrap_err();
        assert!(matches!(err, QueueError::Validation { ref field, .. } if field == "topic"));
    }

    #[test]
    fn test_duration_bounds() {
        let config = SchedulerConfig::default();
        let with = |secs| request("x").with_duration_secs(secs).validate(&config);

        assert!(with(config.min_duration_secs - 1).is_err());
        assert!(with(config.max_duration_secs + 1).is_err());
        assert!(with(config.min_duration_secs).is_ok());
        assert!(with(config.max_duration_secs).is_ok());
    }

    #[test]
    fn test_language_must_be_two_letters() {
        let config = SchedulerConfig::default();
        assert!(request("x").with_language("eng").validate(&config).is_err());
        assert!(request("x").with_language("e1").validate(&config).is_err());
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!("Cinematic".parse::<VideoStyle>().unwrap(), VideoStyle::Cinematic);
        assert!("vlog".parse::<VideoStyle>().is_err());
    }
}
