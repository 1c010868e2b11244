//! Priority queue of admitted jobs waiting for a concurrency slot.
//!
//! Ordering is `(priority_tier desc, enqueued_at asc, seq asc)`. The sequence
//! number is handed out by the queue itself, so two jobs that share a tier and
//! a timestamp still leave in the order they were enqueued.
//!
//! Jobs waiting out a retry backoff sit in a separate delayed set keyed by
//! their ready instant. Once that instant has passed they join the ready set
//! under the key assigned on enqueue. They count towards `len()` and can be
//! removed like any other entry.
//!
//! The queue is not synchronized; the scheduler owns it behind a single lock.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::{JobId, PriorityTier, QueueError, QueueResult};

/// What the queue knows about a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub priority_tier: PriorityTier,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(job_id: JobId, priority_tier: PriorityTier, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            priority_tier,
            enqueued_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    tier: Reverse<PriorityTier>,
    enqueued_at: DateTime<Utc>,
    seq: u64,
}

type DelayKey = (Instant, u64);

#[derive(Debug, Clone, Copy)]
enum Slot {
    Ready(OrderKey),
    Delayed(DelayKey),
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    ready: BTreeMap<OrderKey, QueueEntry>,
    delayed: BTreeMap<DelayKey, (OrderKey, QueueEntry)>,
    index: HashMap<JobId, Slot>,
    next_seq: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job that is ready to run
    pub fn enqueue(&mut self, entry: QueueEntry) -> QueueResult<()> {
        let key = self.order_key(&entry)?;
        self.index.insert(entry.job_id.clone(), Slot::Ready(key));
        self.ready.insert(key, entry);
        Ok(())
    }

    /// Insert a job that becomes ready at `ready_at`
    pub fn enqueue_delayed(&mut self, entry: QueueEntry, ready_at: Instant) -> QueueResult<()> {
        let key = self.order_key(&entry)?;
        let delay_key = (ready_at, key.seq);
        self.index.insert(entry.job_id.clone(), Slot::Delayed(delay_key));
        self.delayed.insert(delay_key, (key, entry));
        Ok(())
    }

    /// Remove and return the highest-priority, earliest-enqueued ready job
    pub fn dequeue_next(&mut self, now: Instant) -> Option<QueueEntry> {
        self.promote_due(now);

        let (_, entry) = self.ready.pop_first()?;
        self.index.remove(&entry.job_id);
        Some(entry)
    }

    /// Remove a job wherever it sits; returns whether it was queued
    pub fn remove(&mut self, job_id: &JobId) -> bool {
        match self.index.remove(job_id) {
            Some(Slot::Ready(key)) => self.ready.remove(&key).is_some(),
            Some(Slot::Delayed(key)) => self.delayed.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.index.contains_key(job_id)
    }

    /// Ready and delayed jobs together
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Earliest instant at which a delayed job becomes ready
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.delayed.first_key_value().map(|((at, _), _)| *at)
    }

    fn order_key(&mut self, entry: &QueueEntry) -> QueueResult<OrderKey> {
        if self.index.contains_key(&entry.job_id) {
            return Err(QueueError::AlreadyQueued(entry.job_id.to_string()));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        Ok(OrderKey {
            tier: Reverse(entry.priority_tier),
            enqueued_at: entry.enqueued_at,
            seq,
        })
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.delayed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let (key, queued) = entry.remove();
            self.index.insert(queued.job_id.clone(), Slot::Ready(key));
            self.ready.insert(key, queued);
        }
    }
}
