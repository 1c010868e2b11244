use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    execution::{Artifact, GenerationCtx, GenerationProvider},
    JobRecord,
};

/// Result of a single execution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(Artifact),
    /// Worth another attempt (provider hiccup, network, timeout)
    TransientFailure(String),
    /// Retrying cannot help
    PermanentFailure(String),
    /// The cancellation token fired before the provider finished
    Cancelled,
}

/// Runs one attempt of a job against the generation provider.
///
/// Holds no per-job state: retries, moderation and status transitions are
/// the scheduler's business.
#[derive(Clone)]
pub struct GenerationExecutor {
    provider: Arc<dyn GenerationProvider>,
    timeout: Duration,
}

impl GenerationExecutor {
    pub fn new(provider: Arc<dyn GenerationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Execute the current attempt of `record`.
    ///
    /// Whichever comes first of provider result, deadline or cancellation
    /// decides the outcome; the provider future is dropped in the latter two
    /// cases.
    #[instrument(
        skip(self, record, cancellation),
        fields(job_id = %record.id, attempt = record.attempt)
    )]
    pub async fn run(
        &self,
        record: &JobRecord,
        cancellation: CancellationToken,
    ) -> AttemptOutcome {
        if cancellation.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        let started = Instant::now();
        let deadline = started + self.timeout;
        let ctx = GenerationCtx {
            job_id: record.id.clone(),
            attempt: record.attempt,
            deadline,
            cancellation: cancellation.clone(),
        };

        let call = tokio::time::timeout_at(deadline, self.provider.generate(&record.params, ctx));

        let outcome = tokio::select! {
            biased;

            _ = cancellation.cancelled() => AttemptOutcome::Cancelled,

            result = call => match result {
                Err(_) => AttemptOutcome::TransientFailure(format!(
                    "generation timed out after {}s",
                    self.timeout.as_secs_f64()
                )),
                Ok(Ok(artifact)) => AttemptOutcome::Success(artifact),
                Ok(Err(err)) if err.is_permanent() => {
                    AttemptOutcome::PermanentFailure(err.to_string())
                }
                Ok(Err(err)) => AttemptOutcome::TransientFailure(err.to_string()),
            },
        };

        let elapsed = started.elapsed();
        match &outcome {
            AttemptOutcome::Success(artifact) => {
                info!("Generation succeeded in {:?}: {}", elapsed, artifact.result_ref)
            }
            AttemptOutcome::TransientFailure(reason) => {
                warn!("Generation attempt failed after {:?}: {}", elapsed, reason)
            }
            AttemptOutcome::PermanentFailure(reason) => {
                warn!("Generation failed permanently after {:?}: {}", elapsed, reason)
            }
            AttemptOutcome::Cancelled => debug!("Generation cancelled after {:?}", elapsed),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        execution::ArtifactMetadata, GenerationParams, JobId, PriorityTier, ProviderError,
        Requester, VideoStyle,
    };
    use async_trait::async_trait;

    enum Behaviour {
        Succeed,
        Fail(ProviderError),
        Hang,
    }

    struct TestProvider {
        behaviour: Behaviour,
        delay: Duration,
    }

    #[async_trait]
    impl GenerationProvider for TestProvider {
        async fn generate(
            &self,
            params: &GenerationParams,
            ctx: GenerationCtx,
        ) -> Result<Artifact, ProviderError> {
            tokio::time::sleep(self.delay).await;
            match &self.behaviour {
                Behaviour::Succeed => Ok(Artifact::new(
                    format!("videos/{}.mp4", ctx.job_id),
                    ArtifactMetadata::new(params.topic.clone()),
                )),
                Behaviour::Fail(err) => Err(err.clone()),
                Behaviour::Hang => std::future::pending().await,
            }
        }
    }

    fn executor(behaviour: Behaviour, delay: Duration) -> GenerationExecutor {
        GenerationExecutor::new(
            Arc::new(TestProvider { behaviour, delay }),
            Duration::from_secs(300),
        )
    }

    fn record() -> JobRecord {
        let mut record = JobRecord::new(
            JobId::new(),
            Requester::account("u1"),
            GenerationParams {
                topic: "black holes".to_string(),
                style: VideoStyle::Explainer,
                language: "en".to_string(),
                target_duration_secs: 60,
            },
            PriorityTier::MEMBER,
            3,
        );
        record.attempt = 1;
        record
    }

    #[tokio::test(start_paused = true)]
    async fn test_success() {
        let executor = executor(Behaviour::Succeed, Duration::from_secs(10));
        let record = record();

        let outcome = executor.run(&record, CancellationToken::new()).await;

        match outcome {
            AttemptOutcome::Success(artifact) => {
                assert_eq!(artifact.result_ref, format!("videos/{}.mp4", record.id));
                assert_eq!(artifact.metadata.title, "black holes");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_classification() {
        let transient = executor(
            Behaviour::Fail(ProviderError::Unavailable("busy".into())),
            Duration::ZERO,
        );
        assert!(matches!(
            transient.run(&record(), CancellationToken::new()).await,
            AttemptOutcome::TransientFailure(_)
        ));

        let permanent = executor(
            Behaviour::Fail(ProviderError::Unsupported("klingon".into())),
            Duration::ZERO,
        );
        assert!(matches!(
            permanent.run(&record(), CancellationToken::new()).await,
            AttemptOutcome::PermanentFailure(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let executor = executor(Behaviour::Hang, Duration::ZERO);

        let started = Instant::now();
        let outcome = executor.run(&record(), CancellationToken::new()).await;

        assert!(matches!(
            outcome,
            AttemptOutcome::TransientFailure(ref msg) if msg.contains("timed out")
        ));
        assert!(started.elapsed() >= Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_provider_call() {
        let executor = executor(Behaviour::Succeed, Duration::from_secs(60));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome = executor.run(&record(), token).await;

        assert_eq!(outcome, AttemptOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let executor = executor(Behaviour::Succeed, Duration::ZERO);
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(executor.run(&record(), token).await, AttemptOutcome::Cancelled);
    }
}
