//! ResultHandle - one-shot outcome of a submitted task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::TaskId;
use crate::error::{AlreadySettled, TaskError};

pub type TaskResult<T> = Result<T, TaskError>;

enum Slot<T> {
    Pending,
    Settled(TaskResult<T>),
    /// Settled, and the outcome was moved out by `take`.
    Taken,
}

impl<T> Slot<T> {
    fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending)
    }
}

/// Shared, settle-once result slot.
///
/// The pool keeps one clone and the submitter keeps another. The slot moves
/// `Pending -> Completed(value)` or `Pending -> Failed(error)` exactly once.
/// Any later settle attempt returns `AlreadySettled` and leaves the stored
/// outcome untouched.
///
/// `wait` / `try_result` clone the outcome and need `T: Clone`. `take` moves
/// it out instead and works for any `T`.
pub struct ResultHandle<T> {
    task_id: TaskId,
    slot: Arc<watch::Sender<Slot<T>>>,
}

impl<T> ResultHandle<T> {
    pub fn new(task_id: TaskId) -> Self {
        let (tx, _rx) = watch::channel(Slot::Pending);
        Self {
            task_id,
            slot: Arc::new(tx),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Record a successful value.
    pub fn settle(&self, value: T) -> Result<(), AlreadySettled> {
        self.settle_with(Ok(value))
    }

    /// Record a failure.
    pub fn settle_error(&self, error: TaskError) -> Result<(), AlreadySettled> {
        self.settle_with(Err(error))
    }

    pub fn settle_with(&self, outcome: TaskResult<T>) -> Result<(), AlreadySettled> {
        let accepted = self.slot.send_if_modified(|slot| {
            if !slot.is_pending() {
                return false;
            }
            *slot = Slot::Settled(outcome);
            true
        });
        if accepted { Ok(()) } else { Err(AlreadySettled) }
    }

    /// Non-blocking poll.
    pub fn is_done(&self) -> bool {
        !self.slot.borrow().is_pending()
    }

    /// Wait until settled, then move the outcome out of the shared slot.
    ///
    /// Only the first `take` across all clones gets the outcome. Later
    /// `take` / `wait` / `try_result` calls see `TaskError::Taken`.
    pub async fn take(&self) -> TaskResult<T> {
        self.settled().await;
        let mut taken = None;
        // 中身を抜くだけなので受信側には通知しない
        self.slot.send_if_modified(|slot| {
            match std::mem::replace(slot, Slot::Taken) {
                Slot::Settled(outcome) => taken = Some(outcome),
                other => *slot = other,
            }
            false
        });
        taken.unwrap_or(Err(TaskError::Taken))
    }

    async fn settled(&self) {
        let mut rx = self.slot.subscribe();
        // the sender is owned by `self`, so the channel cannot close here
        let _ = rx.wait_for(|slot| !slot.is_pending()).await;
    }
}

impl<T: Clone> ResultHandle<T> {
    /// Current outcome, if settled.
    pub fn try_result(&self) -> Option<TaskResult<T>> {
        match &*self.slot.borrow() {
            Slot::Pending => None,
            Slot::Settled(outcome) => Some(outcome.clone()),
            Slot::Taken => Some(Err(TaskError::Taken)),
        }
    }

    /// Wait until the handle is settled and return the outcome.
    pub async fn wait(&self) -> TaskResult<T> {
        self.settled().await;
        self.try_result().unwrap_or(Err(TaskError::Taken))
    }

    /// Like `wait`, but gives up after `timeout` and returns `None`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<TaskResult<T>> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task_id: self.task_id,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("task_id", &self.task_id)
            .field("done", &self.is_done())
            .finish()
    }
}
