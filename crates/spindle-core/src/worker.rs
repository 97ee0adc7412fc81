use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::domain::{PoolId, WorkerId};
use crate::observability::PoolCounters;
use crate::queue::BoundedQueue;
use crate::task::{Job, execute};

/// Worker group handle.
/// - 各ワーカーは queue が「closed かつ空」になるまで回り続ける
/// - 止めたいときは queue を close する（実行中のタスクは最後まで走る）
/// - `join()` で全ワーカーの終了を待てる
pub(crate) struct WorkerGroup {
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers on `runtime`.
    pub(crate) fn spawn<T: Send + Sync + 'static>(
        runtime: &Handle,
        pool_id: PoolId,
        n: usize,
        queue: Arc<BoundedQueue<Job<T>>>,
        counters: Arc<PoolCounters>,
    ) -> Self {
        let mut joins = Vec::with_capacity(n);
        for index in 0..n {
            let worker_id = WorkerId::new(index);
            let span = tracing::info_span!("worker", pool = %pool_id, worker = %worker_id);
            let join = runtime.spawn(
                worker_loop(Arc::clone(&queue), Arc::clone(&counters)).instrument(span),
            );
            joins.push(join);
        }

        Self { joins }
    }

    pub(crate) fn len(&self) -> usize {
        self.joins.len()
    }

    /// Wait for every worker to exit.
    pub(crate) async fn join(self) {
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker ended abnormally");
            }
        }
    }
}

async fn worker_loop<T: Send + Sync + 'static>(
    queue: Arc<BoundedQueue<Job<T>>>,
    counters: Arc<PoolCounters>,
) {
    tracing::debug!("worker started");

    // None = closed and drained
    while let Some(job) = queue.dequeue().await {
        let Job { id, task, handle } = job;
        counters.record_started();
        tracing::debug!(task = %id, "claimed");

        // 失敗も panic も outcome として handle に入れる。ワーカー自体は止めない
        let outcome = execute(task).await;
        let ok = outcome.is_ok();
        match &outcome {
            Ok(_) => tracing::debug!(task = %id, "completed"),
            Err(err) => tracing::warn!(task = %id, error = %err, "task failed"),
        }

        // カウンタは handle に実際に入ったかどうかで分ける
        if handle.settle_with(outcome).is_ok() {
            counters.record_finished(ok);
        } else {
            counters.record_finished_preempted();
            tracing::warn!(task = %id, "result handle was already settled by the submitter");
        }
    }

    tracing::debug!("queue closed and empty, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use crate::error::TaskError;
    use crate::task::FnTask;

    fn job(seq: u64, value: Result<u64, &'static str>) -> Job<u64> {
        Job::new(
            TaskId::new(seq),
            Box::new(FnTask::new(move || async move { value })),
        )
    }

    fn setup(n: usize) -> (Arc<BoundedQueue<Job<u64>>>, Arc<PoolCounters>, WorkerGroup) {
        let queue = Arc::new(BoundedQueue::new(16).unwrap());
        let counters = Arc::new(PoolCounters::default());
        let group = WorkerGroup::spawn(
            &Handle::current(),
            PoolId::generate(),
            n,
            Arc::clone(&queue),
            Arc::clone(&counters),
        );
        (queue, counters, group)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn workers_settle_every_job_then_exit_on_close() {
        let (queue, counters, group) = setup(3);
        assert_eq!(group.len(), 3);

        let mut handles = Vec::new();
        for seq in 0..10 {
            let j = job(seq, Ok(seq * 10));
            handles.push(j.handle.clone());
            queue.enqueue(j).await.unwrap();
        }

        queue.close();
        group.join().await;

        for (seq, h) in handles.iter().enumerate() {
            assert_eq!(h.try_result(), Some(Ok(seq as u64 * 10)));
        }
        let counts = counters.snapshot(queue.len());
        assert_eq!(counts.completed, 10);
        assert_eq!(counts.running, 0);
    }

    #[tokio::test]
    async fn failing_and_panicking_tasks_do_not_stop_the_worker() {
        let (queue, counters, group) = setup(1);

        let failing = job(0, Err("nope"));
        let panicking = Job::new(
            TaskId::new(1),
            Box::new(FnTask::new(|| async {
                if true {
                    panic!("worker must survive this");
                }
                Ok::<u64, String>(0)
            })),
        );
        let fine = job(2, Ok(5));

        let handles = [
            failing.handle.clone(),
            panicking.handle.clone(),
            fine.handle.clone(),
        ];
        for j in [failing, panicking, fine] {
            queue.enqueue(j).await.unwrap();
        }

        queue.close();
        group.join().await;

        assert_eq!(handles[0].try_result(), Some(Err(TaskError::Failed("nope".into()))));
        assert!(matches!(
            handles[1].try_result(),
            Some(Err(TaskError::Panicked(msg))) if msg.contains("survive")
        ));
        assert_eq!(handles[2].try_result(), Some(Ok(5)));

        let counts = counters.snapshot(0);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 2);
    }

    #[tokio::test]
    async fn externally_settled_handle_is_not_overwritten() {
        let (queue, counters, group) = setup(1);

        let j = job(0, Ok(1));
        let h = j.handle.clone();
        h.settle(100).unwrap();
        queue.enqueue(j).await.unwrap();

        queue.close();
        group.join().await;
        assert_eq!(h.try_result(), Some(Ok(100)));

        // worker の結果は捨てられたので completed には数えない
        let counts = counters.snapshot(0);
        assert_eq!(counts.completed, 0);
        assert_eq!(counts.running, 0);
        assert_eq!(counts.preempted, 1);
    }
}
