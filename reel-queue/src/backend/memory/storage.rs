use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    backend::{JobFilter, JobStore},
    JobId, JobRecord, JobStatus, QueueError, QueueResult, Transition,
};

/// In-memory job store
///
/// Records live for the lifetime of the process; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    /// Job records indexed by job_id
    pub(crate) jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: JobRecord) -> QueueResult<()> {
        let mut jobs = self.jobs.write();

        if jobs.contains_key(&record.id) {
            return Err(QueueError::AlreadyExists(record.id.to_string()));
        }

        jobs.insert(record.id.clone(), record);
        Ok(())
    }

    async fn load(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        self.jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))
    }

    async fn compare_and_swap_status(
        &self,
        job_id: &JobId,
        expected: JobStatus,
        next: JobStatus,
        transition: Transition,
    ) -> QueueResult<JobRecord> {
        let mut jobs = self.jobs.write();

        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;

        if record.status != expected {
            return Err(QueueError::StatusConflict {
                job_id: job_id.to_string(),
                expected,
                actual: record.status,
            });
        }

        if !expected.can_transition_to(next) {
            return Err(QueueError::InvalidTransition {
                from: expected,
                to: next,
            });
        }

        record.apply(next, transition);
        Ok(record.clone())
    }

    async fn list(&self, filter: JobFilter) -> QueueResult<Vec<JobRecord>> {
        let jobs = self.jobs.read();

        let mut matching: Vec<JobRecord> = jobs
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }

        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenerationParams, PriorityTier, Requester, VideoStyle};

    fn create_test_record(requester: Requester) -> JobRecord {
        JobRecord::new(
            JobId::new(),
            requester,
            GenerationParams {
                topic: "coral reefs".to_string(),
                style: VideoStyle::Documentary,
                language: "en".to_string(),
                target_duration_secs: 120,
            },
            PriorityTier::MEMBER,
            3,
        )
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = MemoryJobStore::new();
        let record = create_test_record(Requester::account("u1"));
        let job_id = record.id.clone();

        store.create(record.clone()).await.unwrap();

        let loaded = store.load(&job_id).await.unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.status, JobStatus::Pending);

        let duplicate = store.create(record).await;
        assert!(matches!(duplicate, Err(QueueError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_load_unknown_job() {
        let store = MemoryJobStore::new();
        let result = store.load(&JobId::from("missing")).await;
        assert!(matches!(result, Err(QueueError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryJobStore::new();
        let record = create_test_record(Requester::guest("g1"));
        let job_id = record.id.clone();
        store.create(record).await.unwrap();

        let queued = store
            .compare_and_swap_status(
                &job_id,
                JobStatus::Pending,
                JobStatus::Queued,
                Transition::none(),
            )
            .await
            .unwrap();
        assert_eq!(queued.status, JobStatus::Queued);

        // Stale expectation loses
        let stale = store
            .compare_and_swap_status(
                &job_id,
                JobStatus::Pending,
                JobStatus::Queued,
                Transition::none(),
            )
            .await;
        assert!(matches!(
            stale,
            Err(QueueError::StatusConflict { actual: JobStatus::Queued, .. })
        ));

        // Skipping processing is refused
        let skip = store
            .compare_and_swap_status(
                &job_id,
                JobStatus::Queued,
                JobStatus::Completed,
                Transition::complete("ref"),
            )
            .await;
        assert!(matches!(skip, Err(QueueError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_only_one_writer_wins_out_of_processing() {
        let store = MemoryJobStore::new();
        let record = create_test_record(Requester::guest("g1"));
        let job_id = record.id.clone();
        store.create(record).await.unwrap();
        store
            .compare_and_swap_status(
                &job_id,
                JobStatus::Pending,
                JobStatus::Queued,
                Transition::none(),
            )
            .await
            .unwrap();
        store
            .compare_and_swap_status(
                &job_id,
                JobStatus::Queued,
                JobStatus::Processing,
                Transition::start_attempt(1),
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        let contenders = [
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Rejected,
        ];
        for next in contenders {
            let store = store.clone();
            let job_id = job_id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_swap_status(
                        &job_id,
                        JobStatus::Processing,
                        next,
                        Transition::none(),
                    )
                    .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(store.load(&job_id).await.unwrap().status.is_terminal());
    }

    #[tokio::test]
    async fn test_list_with_filter() {
        let store = MemoryJobStore::new();
        let alice = Requester::account("alice");

        for _ in 0..3 {
            store.create(create_test_record(alice.clone())).await.unwrap();
        }
        store.create(create_test_record(Requester::guest("g"))).await.unwrap();

        let all = store.list(JobFilter::all()).await.unwrap();
        assert_eq!(all.len(), 4);

        let mine = store.list(JobFilter::all().with_requester(alice)).await.unwrap();
        assert_eq!(mine.len(), 3);

        let limited = store
            .list(JobFilter::all().with_status(JobStatus::Pending).with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }
}
