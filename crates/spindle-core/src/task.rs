use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::domain::TaskId;
use crate::error::TaskError;
use crate::handle::{ResultHandle, TaskResult};

/// A deferred unit of work.
///
/// `run` consumes the task, so whatever it captured at submission belongs to
/// the task alone and cannot change afterwards.
#[async_trait]
pub trait Task: Send + 'static {
    type Output: Send + 'static;

    async fn run(self: Box<Self>) -> Result<Self::Output, TaskError>;
}

/// Adapts an async closure into a `Task`.
///
/// Any `Display` error returned by the closure becomes `TaskError::Failed`.
pub struct FnTask<F, T, E> {
    f: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<F, Fut, T, E> FnTask<F, T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, T, E> Task for FnTask<F, T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    type Output = T;

    async fn run(self: Box<Self>) -> Result<T, TaskError> {
        (self.f)().await.map_err(TaskError::failed)
    }
}

/// Queue element: the task plus the handle its outcome goes to.
pub(crate) struct Job<T> {
    pub(crate) id: TaskId,
    pub(crate) task: Box<dyn Task<Output = T>>,
    pub(crate) handle: ResultHandle<T>,
}

impl<T> Job<T> {
    pub(crate) fn new(id: TaskId, task: Box<dyn Task<Output = T>>) -> Self {
        Self {
            id,
            task,
            handle: ResultHandle::new(id),
        }
    }
}

/// Run one task to completion, turning a panic into `TaskError::Panicked`.
///
/// The task runs on its own tokio task so that unwinding stops at the
/// `JoinHandle` instead of tearing down the calling worker.
pub(crate) async fn execute<T: Send + 'static>(task: Box<dyn Task<Output = T>>) -> TaskResult<T> {
    match tokio::spawn(task.run()).await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            Err(TaskError::Panicked(panic_message(join_err.into_panic())))
        }
        Err(join_err) => Err(TaskError::failed(join_err)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double(u64);

    #[async_trait]
    impl Task for Double {
        type Output = u64;

        async fn run(self: Box<Self>) -> Result<u64, TaskError> {
            Ok(self.0 * 2)
        }
    }

    #[tokio::test]
    async fn executes_trait_task() {
        let out = execute(Box::new(Double(21))).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn fn_task_maps_errors_to_failed() {
        let task = FnTask::new(|| async { Err::<(), _>("disk on fire") });
        let out = execute(Box::new(task)).await;
        assert_eq!(out, Err(TaskError::Failed("disk on fire".into())));
    }

    #[tokio::test]
    async fn panics_are_captured() {
        let task = FnTask::new(|| async {
            if true {
                panic!("kaboom");
            }
            Ok::<u8, String>(0)
        });
        let out = execute(Box::new(task)).await;
        assert_eq!(out, Err(TaskError::Panicked("kaboom".into())));
    }

    #[tokio::test]
    async fn formatted_panic_message_is_kept() {
        let n = 3;
        let task = FnTask::new(move || async move {
            if n > 0 {
                panic!("bad input {n}");
            }
            Ok::<u8, String>(0)
        });
        let out = execute(Box::new(task)).await;
        assert_eq!(out, Err(TaskError::Panicked("bad input 3".into())));
    }

    #[test]
    fn job_handle_carries_task_id() {
        let job = Job::new(TaskId::new(9), Box::new(Double(1)));
        assert_eq!(job.handle.task_id(), TaskId::new(9));
        assert_eq!(job.id, TaskId::new(9));
        assert!(!job.handle.is_done());
    }
}
