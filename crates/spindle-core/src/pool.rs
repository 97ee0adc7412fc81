//! WorkerPool - the pool controller.
//!
//! Ties the pieces together:
//! - `BoundedQueue<Job<T>>` between `submit` and the workers
//! - `WorkerGroup` draining the queue
//! - a `watch` channel holding the `PoolState`, advanced to `Stopped` by a
//!   monitor task once every worker has exited

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::PoolConfig;
use crate::domain::{PoolId, PoolState, TaskId};
use crate::error::{PoolError, QueueError, TaskError};
use crate::handle::ResultHandle;
use crate::observability::{PoolCounters, PoolStatus};
use crate::queue::BoundedQueue;
use crate::task::{FnTask, Job, Task};
use crate::worker::WorkerGroup;

/// How `shutdown` treats tasks that are queued but not yet claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Let workers finish everything already queued.
    Drain,

    /// Settle queued tasks as `TaskError::Cancelled`. Claimed tasks still finish.
    Cancel,
}

/// Fixed-size worker pool with a bounded submission queue.
///
/// Must be created inside a Tokio runtime. Dropping a pool that is still
/// `Running` starts a drain shutdown, so queued handles still settle.
pub struct WorkerPool<T> {
    id: PoolId,
    name: String,
    workers: usize,
    queue: Arc<BoundedQueue<Job<T>>>,
    counters: Arc<PoolCounters>,
    state: Arc<watch::Sender<PoolState>>,
    next_seq: AtomicU64,
}

impl<T: Send + Sync + 'static> WorkerPool<T> {
    /// Validate `config`, then spawn the workers on the current runtime.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let runtime = Handle::try_current()?;

        let id = PoolId::generate();
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity)?);
        let counters = Arc::new(PoolCounters::default());
        let (state_tx, _) = watch::channel(PoolState::Running);
        let state = Arc::new(state_tx);

        let group = WorkerGroup::spawn(
            &runtime,
            id,
            config.worker_count,
            Arc::clone(&queue),
            Arc::clone(&counters),
        );
        let workers = group.len();

        runtime.spawn({
            let state = Arc::clone(&state);
            async move {
                group.join().await;
                match advance(&state, PoolState::Stopped) {
                    Some(from) => tracing::info!(pool = %id, ?from, "pool stopped"),
                    None => tracing::error!(pool = %id, "workers exited while pool was running"),
                }
            }
        });

        tracing::info!(
            pool = %id,
            name = %config.name,
            workers,
            queue_capacity = config.queue_capacity,
            "pool started"
        );

        Ok(Self {
            id,
            name: config.name,
            workers,
            queue,
            counters,
            state,
            next_seq: AtomicU64::new(0),
        })
    }

    /// Queue `task` and return its handle.
    ///
    /// Waits while the queue is full. Fails with `PoolError::Closed` when
    /// the pool is not `Running`, including when shutdown begins while this
    /// call is waiting for space.
    pub async fn submit<K>(&self, task: K) -> Result<ResultHandle<T>, PoolError>
    where
        K: Task<Output = T>,
    {
        let job = self.prepare(Box::new(task))?;
        let (id, handle) = (job.id, job.handle.clone());

        self.queue
            .enqueue(job)
            .await
            .map_err(|_| PoolError::Closed)?;

        self.accepted(id);
        Ok(handle)
    }

    /// `submit` for an async closure.
    pub async fn submit_fn<F, Fut, E>(&self, f: F) -> Result<ResultHandle<T>, PoolError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.submit(FnTask::new(f)).await
    }

    /// Non-blocking `submit`: fails with `PoolError::QueueFull` instead of
    /// waiting for space.
    pub fn try_submit<K>(&self, task: K) -> Result<ResultHandle<T>, PoolError>
    where
        K: Task<Output = T>,
    {
        let job = self.prepare(Box::new(task))?;
        let (id, handle) = (job.id, job.handle.clone());

        self.queue.try_enqueue(job).map_err(|e| match e {
            QueueError::Full => PoolError::QueueFull(self.queue.capacity()),
            QueueError::Closed => PoolError::Closed,
        })?;

        self.accepted(id);
        Ok(handle)
    }

    fn prepare(&self, task: Box<dyn Task<Output = T>>) -> Result<Job<T>, PoolError> {
        // shutdown 済みなら受け付けない
        if !self.state().accepts_submissions() {
            return Err(PoolError::Closed);
        }
        let id = TaskId::new(self.next_seq.fetch_add(1, Ordering::Relaxed));
        Ok(Job::new(id, task))
    }

    fn accepted(&self, id: TaskId) {
        self.counters.record_submitted();
        tracing::debug!(pool = %self.id, task = %id, "submitted");
    }
}

impl<T> WorkerPool<T> {
    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Stop accepting tasks.
    ///
    /// - `Drain`: `Running -> Draining`; queued tasks still run.
    /// - `Cancel`: `Running | Draining -> Cancelling`; queued tasks are
    ///   settled as `TaskError::Cancelled`.
    ///
    /// Calls that would not move the state machine forward are no-ops.
    pub fn shutdown(&self, mode: ShutdownMode) {
        let target = match mode {
            ShutdownMode::Drain => PoolState::Draining,
            ShutdownMode::Cancel => PoolState::Cancelling,
        };

        let Some(from) = advance(&self.state, target) else {
            tracing::debug!(pool = %self.id, ?mode, state = ?self.state(), "shutdown ignored");
            return;
        };
        tracing::info!(pool = %self.id, ?from, to = ?target, "shutdown requested");

        match mode {
            ShutdownMode::Drain => {
                self.queue.close();
            }
            ShutdownMode::Cancel => {
                // close と取り出しを同じロック内で行う。ワーカーが割り込んで queued を拾えない
                let (_, queued) = self.queue.close_and_drain();
                self.cancel_queued(queued);
            }
        }
    }

    fn cancel_queued(&self, queued: Vec<Job<T>>) {
        let n = queued.len();
        for job in queued {
            if job.handle.settle_error(TaskError::Cancelled).is_ok() {
                self.counters.record_cancelled();
            } else {
                self.counters.record_preempted();
                tracing::warn!(pool = %self.id, task = %job.id, "cancelled task was already settled");
            }
        }
        tracing::info!(pool = %self.id, count = n, "cancelled queued tasks");
    }

    /// Wait until every worker has exited.
    pub async fn join(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives in `self`, so this only returns once Stopped
        let _ = rx.wait_for(|state| state.is_terminal()).await;
    }

    /// Wait up to `timeout` for every worker to exit.
    ///
    /// Returns `true` if the pool reached `Stopped`. Running tasks are not
    /// interrupted when the timeout elapses.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join()).await.is_ok()
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            pool_id: self.id,
            name: self.name.clone(),
            state: self.state(),
            workers: self.workers,
            queue_capacity: self.queue.capacity(),
            counts: self.counters.snapshot(self.queue.len()),
            taken_at: Utc::now(),
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        if self.state().accepts_submissions() {
            tracing::debug!(pool = %self.id, "pool dropped while running, draining");
            self.shutdown(ShutdownMode::Drain);
        }
    }
}

/// Move `state` to `next` if that is an edge of the state machine.
/// Returns the previous state on success.
fn advance(state: &watch::Sender<PoolState>, next: PoolState) -> Option<PoolState> {
    let mut previous = None;
    state.send_if_modified(|current| {
        if !current.can_transition_to(next) {
            return false;
        }
        previous = Some(*current);
        *current = next;
        true
    });
    previous
}
