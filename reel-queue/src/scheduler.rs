//! Admission control and dispatch.
//!
//! One dispatcher task owns a `JoinSet` of attempt tasks. It fills free
//! slots from the priority queue whenever something changes: a submission,
//! an attempt finishing, or a retry backoff expiring. There is no polling.
//!
//! Lock order is queue, then store. Every transition into or out of `queued`
//! happens while the queue lock is held, so a job's status is `queued`
//! exactly when it sits on the queue.

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures_core::Stream;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::{
    backend::{JobFilter, JobStore, MemoryJobStore},
    execution::{AttemptOutcome, GenerationExecutor, GenerationProvider},
    moderation::{ModerationEvaluator, RuleModerator, Verdict},
    notifier::{Notifier, TracingNotifier},
    observability::{LiveMetrics, MetricsSnapshot, QueueMetrics},
    queue::{PriorityQueue, QueueEntry},
    retry::{FailureKind, RetryDecision, RetryPolicy},
    JobEvent, JobId, JobRecord, JobSnapshot, JobStatus, QueueError, QueueResult,
    SchedulerConfig, SubmitRequest, Transition,
};

pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

const CANCELLED_BY_REQUESTER: &str = "cancelled by requester";
const CANCELLED_BY_SHUTDOWN: &str = "scheduler shut down";
const ATTEMPT_PANICKED: &str = "generation attempt panicked";

/// Content-generation job scheduler
///
/// Cheap to clone; every clone drives the same queue.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use reel_queue::prelude::*;
/// # async fn demo(provider: Arc<dyn GenerationProvider>) -> QueueResult<()> {
/// let scheduler = Scheduler::builder(provider)
///     .with_config(SchedulerConfig::from_env()?)
///     .build()?;
/// scheduler.start()?;
///
/// let job_id = scheduler
///     .submit(SubmitRequest::new("How volcanoes form", Requester::account("u-1")))
///     .await?;
/// let snapshot = scheduler.status(&job_id).await?;
/// # let _ = snapshot;
/// scheduler.shutdown().await
/// # }
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

pub struct SchedulerBuilder {
    config: SchedulerConfig,
    provider: Arc<dyn GenerationProvider>,
    store: Option<Arc<dyn JobStore>>,
    moderator: Option<Arc<dyn ModerationEvaluator>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl SchedulerBuilder {
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_moderator(mut self, moderator: Arc<dyn ModerationEvaluator>) -> Self {
        self.moderator = Some(moderator);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Validate the configuration and assemble the scheduler (not yet running)
    pub fn build(self) -> QueueResult<Scheduler> {
        self.config.validate()?;

        let (events, _) = broadcast::channel(self.config.event_capacity);

        let inner = Inner {
            executor: GenerationExecutor::new(self.provider, self.config.attempt_timeout),
            retry: RetryPolicy::from_config(&self.config),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryJobStore::new()) as Arc<dyn JobStore>),
            moderator: self.moderator.unwrap_or_else(|| {
                Arc::new(RuleModerator::default()) as Arc<dyn ModerationEvaluator>
            }),
            notifier: self
                .notifier
                .unwrap_or_else(|| Arc::new(TracingNotifier) as Arc<dyn Notifier>),
            queue: Mutex::new(PriorityQueue::new()),
            running: DashMap::new(),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            events,
            metrics: LiveMetrics::new(),
            dispatcher: parking_lot::Mutex::new(None),
            config: self.config,
        };

        Ok(Scheduler {
            inner: Arc::new(inner),
        })
    }
}

/// Handle on an attempt in flight
struct RunningAttempt {
    attempt: u32,
    cancellation: CancellationToken,
    /// Status the attempt left the job in, once it has settled
    settled: watch::Receiver<Option<JobStatus>>,
}

struct Inner {
    config: SchedulerConfig,
    queue: Mutex<PriorityQueue>,
    store: Arc<dyn JobStore>,
    executor: GenerationExecutor,
    retry: RetryPolicy,
    moderator: Arc<dyn ModerationEvaluator>,
    notifier: Arc<dyn Notifier>,
    running: DashMap<JobId, RunningAttempt>,
    wake: Notify,
    shutdown: CancellationToken,
    events: broadcast::Sender<JobEvent>,
    metrics: LiveMetrics,
    dispatcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn builder(provider: Arc<dyn GenerationProvider>) -> SchedulerBuilder {
        SchedulerBuilder {
            config: SchedulerConfig::default(),
            provider,
            store: None,
            moderator: None,
            notifier: None,
        }
    }

    /// Spawn the dispatcher. Jobs submitted earlier start as slots allow.
    ///
    /// Calling `start` on a running scheduler is a no-op.
    pub fn start(&self) -> QueueResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(QueueError::SchedulerStopped);
        }

        let mut dispatcher = self.inner.dispatcher.lock();
        if dispatcher.is_some() {
            return Ok(());
        }

        *dispatcher = Some(tokio::spawn(self.inner.clone().dispatch()));
        info!(
            "Scheduler started (max_concurrent={}, max_queue_len={})",
            self.inner.config.max_concurrent, self.inner.config.max_queue_len
        );
        Ok(())
    }

    /// Stop dispatching, cancel attempts in flight and wait for them to settle.
    ///
    /// Queued jobs stay queued. Submissions are refused from here on.
    pub async fn shutdown(&self) -> QueueResult<()> {
        self.inner.shutdown.cancel();

        let handle = self.inner.dispatcher.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| QueueError::Internal(format!("Dispatcher join error: {}", e)))?;
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Validate and admit a job.
    ///
    /// Fails with `Validation` for bad input and `CapacityExceeded` when the
    /// queue is full; in both cases no record is created.
    #[instrument(
        skip(self, request),
        fields(requester = %request.requester, tier = %request.priority_tier)
    )]
    pub async fn submit(&self, request: SubmitRequest) -> QueueResult<JobId> {
        if self.inner.shutdown.is_cancelled() {
            return Err(QueueError::SchedulerStopped);
        }

        let params = request.validate(&self.inner.config)?;

        let mut queue = self.inner.queue.lock().await;

        if queue.len() >= self.inner.config.max_queue_len {
            self.inner.metrics.increment_jobs_refused();
            warn!("Queue full, refusing submission");
            return Err(QueueError::CapacityExceeded {
                limit: self.inner.config.max_queue_len,
            });
        }

        let record = JobRecord::new(
            JobId::new(),
            request.requester,
            params,
            request.priority_tier,
            self.inner.config.max_attempts,
        );
        let job_id = record.id.clone();

        self.inner.store.create(record).await?;
        let queued = self
            .inner
            .store
            .compare_and_swap_status(
                &job_id,
                JobStatus::Pending,
                JobStatus::Queued,
                Transition::none(),
            )
            .await?;
        queue.enqueue(QueueEntry::new(
            job_id.clone(),
            queued.priority_tier,
            queued.enqueued_at,
        ))?;
        drop(queue);

        self.inner.metrics.increment_jobs_submitted();
        self.inner.emit(JobEvent::Queued {
            job_id: job_id.clone(),
            priority_tier: queued.priority_tier,
            at: queued.updated_at,
        });
        self.inner.wake.notify_one();

        info!("Admitted job {}", job_id);
        Ok(job_id)
    }

    pub async fn status(&self, job_id: &JobId) -> QueueResult<JobSnapshot> {
        self.inner.store.load(job_id).await
    }

    /// Cancel a job and return the status it ends up in.
    ///
    /// A queued job is cancelled on the spot. A processing job is signalled
    /// and this call waits for its attempt to settle; an attempt that got
    /// its result recorded first keeps it. Terminal jobs are left alone.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn cancel(&self, job_id: &JobId) -> QueueResult<JobStatus> {
        loop {
            let mut queue = self.inner.queue.lock().await;
            let record = self.inner.store.load(job_id).await?;

            match record.status {
                JobStatus::Queued => {
                    queue.remove(job_id);
                    let cancelled = self
                        .inner
                        .store
                        .compare_and_swap_status(
                            job_id,
                            JobStatus::Queued,
                            JobStatus::Cancelled,
                            Transition::error(CANCELLED_BY_REQUESTER),
                        )
                        .await?;
                    drop(queue);

                    info!("Cancelled queued job {}", job_id);
                    self.inner.on_terminal(cancelled);
                    return Ok(JobStatus::Cancelled);
                }

                JobStatus::Processing => {
                    let attempt = self
                        .inner
                        .running
                        .get(job_id)
                        .map(|a| (a.cancellation.clone(), a.settled.clone()));
                    drop(queue);

                    let Some((cancellation, mut settled)) = attempt else {
                        return Ok(record.status);
                    };

                    if !cancellation.is_cancelled() {
                        cancellation.cancel();
                        self.inner.emit(JobEvent::CancelRequested {
                            job_id: job_id.clone(),
                            at: Utc::now(),
                        });
                        info!("Cancellation requested for running job {}", job_id);
                    }

                    let outcome = match settled.wait_for(Option::is_some).await {
                        Ok(status) => *status,
                        Err(_) => None,
                    };

                    match outcome {
                        // Went back on the queue before the signal landed
                        Some(JobStatus::Queued) => continue,
                        Some(status) => return Ok(status),
                        None => return Ok(self.inner.store.load(job_id).await?.status),
                    }
                }

                status => {
                    debug!("Job {} already {}", job_id, status);
                    return Ok(status);
                }
            }
        }
    }

    pub async fn queue_metrics(&self) -> QueueMetrics {
        let queued_count = self.inner.queue.lock().await.len();

        QueueMetrics {
            queued_count,
            active_count: self.inner.running.len(),
            max_concurrent: self.inner.config.max_concurrent,
        }
    }

    /// Job records for diagnostics
    pub async fn list_jobs(&self, filter: JobFilter) -> QueueResult<Vec<JobSnapshot>> {
        self.inner.store.list(filter).await
    }

    /// Lifecycle events from now on; lagging subscribers skip what they missed
    pub fn subscribe(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let stream = BroadcastStream::new(self.inner.events.subscribe())
            .filter_map(|result| result.ok());

        Box::pin(stream)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }
}

impl Inner {
    async fn dispatch(self: Arc<Self>) {
        let mut attempts: JoinSet<JobId> = JoinSet::new();

        loop {
            self.fill_slots(&mut attempts).await;

            let has_slot = attempts.len() < self.config.max_concurrent;
            let next_ready = self.queue.lock().await.next_ready_at();

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                Some(joined) = attempts.join_next(), if !attempts.is_empty() => {
                    self.reap(joined);
                }

                _ = self.wake.notified() => {}

                _ = tokio::time::sleep_until(next_ready.unwrap_or_else(Instant::now)),
                    if has_slot && next_ready.is_some() => {}
            }
        }

        // Attempt tokens are children of the shutdown token, so every attempt
        // has been signalled already.
        while let Some(joined) = attempts.join_next().await {
            self.reap(joined);
        }
        debug!("Dispatcher exited");
    }

    /// Start attempts until the slots or the ready queue run out
    async fn fill_slots(self: &Arc<Self>, attempts: &mut JoinSet<JobId>) {
        while attempts.len() < self.config.max_concurrent {
            let mut queue = self.queue.lock().await;
            let Some(entry) = queue.dequeue_next(Instant::now()) else {
                break;
            };

            let record = match self.store.load(&entry.job_id).await {
                Ok(record) => record,
                Err(err) => {
                    error!("Dropping queue entry for job {}: {}", entry.job_id, err);
                    continue;
                }
            };

            let started = match self
                .store
                .compare_and_swap_status(
                    &entry.job_id,
                    JobStatus::Queued,
                    JobStatus::Processing,
                    Transition::start_attempt(record.attempt + 1),
                )
                .await
            {
                Ok(started) => started,
                Err(err) => {
                    error!("Dropping queue entry for job {}: {}", entry.job_id, err);
                    continue;
                }
            };

            let cancellation = self.shutdown.child_token();
            let (settled_tx, settled_rx) = watch::channel(None);
            self.running.insert(
                started.id.clone(),
                RunningAttempt {
                    attempt: started.attempt,
                    cancellation: cancellation.clone(),
                    settled: settled_rx,
                },
            );
            drop(queue);

            attempts.spawn(self.clone().run_attempt(started, cancellation, settled_tx));
        }
    }

    fn reap(&self, joined: Result<JobId, JoinError>) {
        match joined {
            Ok(job_id) => debug!("Slot released by job {}", job_id),
            Err(err) => error!("Attempt task aborted: {}", err),
        }
    }

    #[instrument(skip_all, fields(job_id = %record.id, attempt = record.attempt))]
    async fn run_attempt(
        self: Arc<Self>,
        record: JobRecord,
        cancellation: CancellationToken,
        settled: watch::Sender<Option<JobStatus>>,
    ) -> JobId {
        self.metrics.increment_attempts_started();
        self.emit(JobEvent::Started {
            job_id: record.id.clone(),
            attempt: record.attempt,
            at: record.updated_at,
        });

        // A panic in the provider or the moderator ends the inner task only
        let body = tokio::spawn(
            self.clone()
                .execute(record.clone(), cancellation.clone())
                .in_current_span(),
        );
        let status = match body.await {
            Ok(status) => status,
            Err(err) => {
                error!("Attempt for job {} aborted: {}", record.id, err);
                if cancellation.is_cancelled() {
                    self.finish_cancelled(&record.id).await
                } else {
                    self.finish(
                        &record.id,
                        JobStatus::Failed,
                        Transition::error(ATTEMPT_PANICKED),
                    )
                    .await
                }
            }
        };

        settled.send_replace(status);
        self.release(&record.id, record.attempt);
        record.id
    }

    async fn execute(
        self: Arc<Self>,
        record: JobRecord,
        cancellation: CancellationToken,
    ) -> Option<JobStatus> {
        let outcome = self.executor.run(&record, cancellation.clone()).await;
        self.settle(&record, outcome, &cancellation).await
    }

    /// Drop the handle of `attempt`; a later attempt's handle is left alone
    fn release(&self, job_id: &JobId, attempt: u32) {
        self.running.remove_if(job_id, |_, running| running.attempt == attempt);
    }

    /// Record the attempt's outcome; returns the status the job was left in
    async fn settle(
        self: &Arc<Self>,
        record: &JobRecord,
        outcome: AttemptOutcome,
        cancellation: &CancellationToken,
    ) -> Option<JobStatus> {
        match outcome {
            AttemptOutcome::Cancelled => self.finish_cancelled(&record.id).await,

            AttemptOutcome::Success(artifact) => {
                let verdict = self
                    .moderator
                    .evaluate(&record.params.topic, &artifact.metadata)
                    .await;

                if cancellation.is_cancelled() {
                    return self.finish_cancelled(&record.id).await;
                }

                match verdict {
                    Verdict::Approved => {
                        self.finish(
                            &record.id,
                            JobStatus::Completed,
                            Transition::complete(artifact.result_ref),
                        )
                        .await
                    }
                    Verdict::Rejected { reason } => {
                        info!("Moderation rejected job {}: {}", record.id, reason);
                        self.finish(&record.id, JobStatus::Rejected, Transition::error(reason))
                            .await
                    }
                }
            }

            AttemptOutcome::TransientFailure(reason) => {
                self.after_failure(record, FailureKind::Transient, reason, cancellation)
                    .await
            }

            AttemptOutcome::PermanentFailure(reason) => {
                self.after_failure(record, FailureKind::Permanent, reason, cancellation)
                    .await
            }
        }
    }

    async fn after_failure(
        self: &Arc<Self>,
        record: &JobRecord,
        kind: FailureKind,
        reason: String,
        cancellation: &CancellationToken,
    ) -> Option<JobStatus> {
        if cancellation.is_cancelled() {
            return self.finish_cancelled(&record.id).await;
        }

        match self.retry.decide(record.attempt, kind) {
            RetryDecision::Exhausted => {
                warn!(
                    "Job {} failed after {} attempt(s): {}",
                    record.id, record.attempt, reason
                );
                self.finish(&record.id, JobStatus::Failed, Transition::error(reason))
                    .await
            }
            RetryDecision::Retry { delay } => {
                let mut queue = self.queue.lock().await;
                let failed_at = Utc::now();

                let requeued = match self
                    .store
                    .compare_and_swap_status(
                        &record.id,
                        JobStatus::Processing,
                        JobStatus::Queued,
                        Transition::retry(reason.clone(), failed_at),
                    )
                    .await
                {
                    Ok(requeued) => requeued,
                    Err(err) => {
                        warn!("Could not requeue job {}: {}", record.id, err);
                        return None;
                    }
                };

                // Before the entry is visible to the dispatcher
                self.release(&record.id, record.attempt);

                let entry =
                    QueueEntry::new(requeued.id.clone(), requeued.priority_tier, failed_at);
                if let Err(err) = queue.enqueue_delayed(entry, Instant::now() + delay) {
                    error!("Could not requeue job {}: {}", record.id, err);
                }
                drop(queue);

                let retry_at = failed_at
                    + chrono::Duration::from_std(delay)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                self.metrics.increment_jobs_retried();
                self.emit(JobEvent::Retrying {
                    job_id: record.id.clone(),
                    attempt: record.attempt,
                    retry_at,
                    error: reason,
                    at: failed_at,
                });
                info!("Job {} will retry in {:?}", record.id, delay);

                Some(JobStatus::Queued)
            }
        }
    }

    async fn finish_cancelled(self: &Arc<Self>, job_id: &JobId) -> Option<JobStatus> {
        let reason = if self.shutdown.is_cancelled() {
            CANCELLED_BY_SHUTDOWN
        } else {
            CANCELLED_BY_REQUESTER
        };
        self.finish(job_id, JobStatus::Cancelled, Transition::error(reason))
            .await
    }

    /// Move a processing job to a terminal status
    async fn finish(
        self: &Arc<Self>,
        job_id: &JobId,
        next: JobStatus,
        transition: Transition,
    ) -> Option<JobStatus> {
        match self
            .store
            .compare_and_swap_status(job_id, JobStatus::Processing, next, transition)
            .await
        {
            Ok(record) => {
                self.on_terminal(record);
                Some(next)
            }
            Err(err) => {
                warn!("Could not move job {} to {}: {}", job_id, next, err);
                None
            }
        }
    }

    /// Bookkeeping after a terminal transition; the notifier runs detached
    fn on_terminal(self: &Arc<Self>, record: JobRecord) {
        self.metrics.record_terminal(record.status);

        let at = record.finished_at.unwrap_or(record.updated_at);
        let job_id = record.id.clone();
        let event = match record.status {
            JobStatus::Completed => JobEvent::Completed {
                job_id,
                result_ref: record.result_ref.clone().unwrap_or_default(),
                at,
            },
            JobStatus::Rejected => JobEvent::Rejected {
                job_id,
                reason: record.last_error.clone().unwrap_or_default(),
                at,
            },
            JobStatus::Failed => JobEvent::Failed {
                job_id,
                error: record.last_error.clone().unwrap_or_default(),
                at,
            },
            _ => JobEvent::Cancelled { job_id, at },
        };
        self.emit(event);

        let inner = self.clone();
        tokio::spawn(async move {
            if let Err(err) = inner.notifier.on_terminal(&record).await {
                inner.metrics.increment_notifications_failed();
                warn!("Notifier failed for job {}: {}", record.id, err);
            }
        });
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
