use thiserror::Error;

/// Why a task did not produce a value.
///
/// This is what `ResultHandle::wait` hands back to the submitter. It never
/// reaches the worker loop as a control-flow error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task cancelled before it started")]
    Cancelled,

    /// The outcome was moved out by `ResultHandle::take` on another clone.
    #[error("task result was already taken")]
    Taken,
}

impl TaskError {
    /// Wrap any displayable error as a task failure.
    pub fn failed(cause: impl std::fmt::Display) -> Self {
        Self::Failed(cause.to_string())
    }
}

/// Errors returned by `BoundedQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("queue is full")]
    Full,
}

/// Returned by the second (and any later) settle call on a `ResultHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("result handle already settled")]
pub struct AlreadySettled;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("queue_capacity must be at least 1")]
    ZeroCapacity,

    #[error("queue_capacity {0} exceeds the supported maximum")]
    CapacityTooLarge(usize),

    #[error("worker_count must be at least 1")]
    ZeroWorkers,

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("config json decode: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned synchronously by the pool controller.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool is closed")]
    Closed,

    #[error("queue is full (capacity={0})")]
    QueueFull(usize),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
