//! spindle-core
//!
//! A fixed-size worker pool with a bounded, blocking submission queue.
//!
//! # モジュール構成
//! - **domain**: ID 型とプールの状態遷移（PoolId, TaskId, WorkerId, PoolState）
//! - **queue**: 容量付き FIFO キュー（満杯で producer、空で consumer を待たせる）
//! - **task**: Task trait とクロージャ用アダプタ
//! - **handle**: ResultHandle（一度だけ settle できる結果スロット）
//! - **worker**: キューを消化するワーカー群
//! - **pool**: WorkerPool（submit / shutdown / await_termination）
//! - **config**: PoolConfig（デフォルト・環境変数・JSON）
//! - **observability**: PoolStatus / PoolCounts
//! - **error**: エラー型
//!
//! # Example
//! ```ignore
//! let pool = WorkerPool::new(PoolConfig::new(16, 4))?;
//! let handle = pool.submit_fn(|| async { Ok::<_, String>(21 * 2) }).await?;
//! assert_eq!(handle.wait().await, Ok(42));
//! pool.shutdown(ShutdownMode::Drain);
//! pool.await_termination(Duration::from_secs(5)).await;
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod handle;
pub mod observability;
pub mod pool;
pub mod queue;
pub mod task;

mod worker;

pub use config::PoolConfig;
pub use domain::{PoolId, PoolState, TaskId, WorkerId};
pub use error::{AlreadySettled, ConfigError, PoolError, QueueError, TaskError};
pub use handle::{ResultHandle, TaskResult};
pub use observability::{PoolCounts, PoolStatus};
pub use pool::{ShutdownMode, WorkerPool};
pub use queue::BoundedQueue;
pub use task::{FnTask, Task};
