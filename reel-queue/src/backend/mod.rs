pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobRecord, JobStatus, QueueResult, Requester, Transition};

pub use memory::MemoryJobStore;

/// Storage primitives for job records
///
/// The store is the ledger of truth for job state. Status changes go through
/// `compare_and_swap_status` only, so racing writers (retry path, moderation
/// gate, cancel path) cannot both win a transition.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record; fails if the id is already present
    async fn create(&self, record: JobRecord) -> QueueResult<()>;

    /// Fetch a copy of the record
    async fn load(&self, job_id: &JobId) -> QueueResult<JobRecord>;

    /// Atomically move `job_id` from `expected` to `next`, applying `transition`.
    ///
    /// Returns the updated record, `StatusConflict` if the current status is
    /// not `expected`, or `InvalidTransition` if the state machine forbids
    /// the move.
    async fn compare_and_swap_status(
        &self,
        job_id: &JobId,
        expected: JobStatus,
        next: JobStatus,
        transition: Transition,
    ) -> QueueResult<JobRecord>;

    /// Records matching `filter`, oldest first (diagnostics)
    async fn list(&self, filter: JobFilter) -> QueueResult<Vec<JobRecord>>;
}

/// Selection for [`JobStore::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub requester: Option<Requester>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_requester(mut self, requester: Requester) -> Self {
        self.requester = Some(requester);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &JobRecord) -> bool {
        self.status.map_or(true, |status| record.status == status)
            && self
                .requester
                .as_ref()
                .map_or(true, |requester| &record.requester == requester)
    }
}
