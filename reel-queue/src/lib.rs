//! # reel-queue: Content-Generation Job Scheduling
//!
//! **Priority-ordered, bounded-concurrency scheduling for AI video generation**
//!
//! A requester submits a topic; reel-queue admits the job, runs it against a
//! generation provider under a deadline, retries transient failures, passes
//! the result through a moderation gate and reports the terminal status.
//!
//! ## Features
//!
//! - **Priority tiers**: higher tiers are dispatched first, FIFO within a tier
//! - **Admission control**: at most `max_concurrent` jobs processing, bounded queue
//!   for backpressure
//! - **Structured execution**: one cancellable task per attempt with a hard timeout
//! - **Retry with backoff**: transient failures retried up to `max_attempts`
//! - **Moderation gate**: nothing becomes `completed` without approval
//! - **Atomic transitions**: compare-and-swap on job status, one winner per transition
//! - **Observability**: tracing spans, lifecycle event stream, live counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reel_queue::prelude::*;
//!
//! struct StubProvider;
//!
//! #[async_trait]
//! impl GenerationProvider for StubProvider {
//!     async fn generate(
//!         &self,
//!         params: &GenerationParams,
//!         ctx: GenerationCtx,
//!     ) -> Result<Artifact, ProviderError> {
//!         Ok(Artifact::new(
//!             format!("videos/{}.mp4", ctx.job_id),
//!             ArtifactMetadata::new(params.topic.clone()).with_category("science"),
//!         ))
//!     }
//! }
//!
//! # async fn run() -> QueueResult<()> {
//! let scheduler = Scheduler::builder(Arc::new(StubProvider))
//!     .with_config(SchedulerConfig::default().with_max_concurrent(2))
//!     .build()?;
//! scheduler.start()?;
//!
//! let job_id = scheduler
//!     .submit(
//!         SubmitRequest::new("The water cycle", Requester::account("user-1"))
//!             .with_style(VideoStyle::Animation)
//!             .with_priority_tier(PriorityTier::PREMIUM),
//!     )
//!     .await?;
//!
//! println!("{:?}", scheduler.status(&job_id).await?.status);
//! scheduler.shutdown().await
//! # }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod queue;
pub mod backend;
pub mod execution;
pub mod retry;
pub mod moderation;
pub mod notifier;
pub mod scheduler;
pub mod observability;

pub use types::{
    GenerationParams, JobEvent, JobId, JobRecord, JobSnapshot, JobStatus, PriorityTier,
    Requester, SubmitRequest, Transition, VideoStyle,
};
pub use error::{NotifyError, ProviderError, QueueError, QueueResult};
pub use config::SchedulerConfig;
pub use queue::{PriorityQueue, QueueEntry};
pub use backend::{JobFilter, JobStore, MemoryJobStore};
pub use execution::{
    Artifact, ArtifactMetadata, AttemptOutcome, GenerationCtx, GenerationExecutor,
    GenerationProvider,
};
pub use retry::{FailureKind, RetryDecision, RetryPolicy};
pub use moderation::{ModerationEvaluator, ModerationRules, RuleModerator, Strictness, Verdict};
pub use notifier::{NoopNotifier, Notifier, TracingNotifier};
pub use scheduler::{BoxStream, Scheduler, SchedulerBuilder};
pub use observability::{LiveMetrics, MetricsSnapshot, QueueMetrics};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

/// Everything needed to run a scheduler and plug in collaborators
pub mod prelude {
    pub use crate::{Scheduler, SchedulerBuilder, SchedulerConfig, SubmitRequest};

    pub use crate::{
        GenerationParams, JobEvent, JobFilter, JobId, JobSnapshot, JobStatus, PriorityTier,
        QueueError, QueueMetrics, QueueResult, Requester, VideoStyle,
    };

    // Collaborator seams
    pub use crate::{
        Artifact, ArtifactMetadata, GenerationCtx, GenerationProvider, JobStore,
        ModerationEvaluator, Notifier, NotifyError, ProviderError, RuleModerator, Verdict,
    };

    pub use async_trait::async_trait;
}
