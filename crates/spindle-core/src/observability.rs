use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PoolId, PoolState};

/// Task counts at a point in time.
///
/// `submitted == queued + running + completed + failed + cancelled + preempted`
/// once no submit or settle is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    pub submitted: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Handles the submitter settled before the pool could.
    #[serde(default)]
    pub preempted: usize,
}

impl PoolCounts {
    /// Tasks whose handle has been settled.
    pub fn settled(&self) -> usize {
        self.completed + self.failed + self.cancelled + self.preempted
    }
}

/// Serializable snapshot of a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub pool_id: PoolId,
    pub name: String,
    pub state: PoolState,
    pub workers: usize,
    pub queue_capacity: usize,
    pub counts: PoolCounts,
    pub taken_at: DateTime<Utc>,
}

/// Lock-free counters updated by workers and the controller.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    submitted: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    preempted: AtomicUsize,
}

impl PoolCounters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    /// A claimed task's outcome was stored in its handle.
    pub(crate) fn record_finished(&self, ok: bool) {
        self.running.fetch_sub(1, Ordering::Relaxed);
        if ok {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A claimed task finished but its handle was already settled.
    pub(crate) fn record_finished_preempted(&self) {
        self.running.fetch_sub(1, Ordering::Relaxed);
        self.record_preempted();
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_preempted(&self) {
        self.preempted.fetch_add(1, Ordering::Relaxed);
    }

    /// `queued` comes from the queue itself, not from a counter.
    pub(crate) fn snapshot(&self, queued: usize) -> PoolCounts {
        PoolCounts {
            submitted: self.submitted.load(Ordering::Relaxed),
            queued,
            running: self.running.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            preempted: self.preempted.load(Ordering::Relaxed),
        }
    }
}
