use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{GenerationParams, JobId, ProviderError};

/// External content generator
///
/// Implementations must give up promptly once `ctx.cancellation` fires or
/// `ctx.deadline` passes. The executor drops the returned future in both
/// cases, so anything the provider holds is released on drop.
#[async_trait]
pub trait GenerationProvider: Send + Sync + 'static {
    async fn generate(
        &self,
        params: &GenerationParams,
        ctx: GenerationCtx,
    ) -> Result<Artifact, ProviderError>;
}

/// Per-attempt context handed to the provider
#[derive(Debug, Clone)]
pub struct GenerationCtx {
    pub job_id: JobId,
    /// 1-based attempt number
    pub attempt: u32,
    pub deadline: Instant,
    pub cancellation: CancellationToken,
}

impl GenerationCtx {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Time left before the executor gives up on this attempt
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// A generated video as returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Where the rendered video lives; published as the job's `result_ref`
    pub result_ref: String,
    pub metadata: ArtifactMetadata,
}

impl Artifact {
    pub fn new(result_ref: impl Into<String>, metadata: ArtifactMetadata) -> Self {
        Self {
            result_ref: result_ref.into(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Descriptive fields the moderation gate inspects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub duration_secs: u32,
    pub thumbnail_ref: Option<String>,
    pub resolution: Resolution,
    pub quality: String,
    pub model: String,
    pub processing_steps: Vec<String>,
}

impl Default for ArtifactMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            category: None,
            tags: Vec::new(),
            duration_secs: 0,
            thumbnail_ref: None,
            resolution: Resolution::default(),
            quality: "720p".to_string(),
            model: String::new(),
            processing_steps: Vec::new(),
        }
    }
}

impl ArtifactMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Title, description and tags joined, lower case
    pub fn searchable_text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.description);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.to_lowercase()
    }
}
