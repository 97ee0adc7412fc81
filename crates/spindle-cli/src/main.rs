use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use spindle_core::{PoolConfig, PoolStatus, ShutdownMode, Task, TaskError, WorkerPool};

/// Run a batch of demo tasks through a bounded worker pool and print a JSON report.
///
/// Pool sizing comes from SPINDLE_QUEUE_CAPACITY / SPINDLE_WORKERS /
/// SPINDLE_POOL_NAME; flags override the environment.
#[derive(Debug, Parser)]
#[command(name = "spindle", version)]
struct Args {
    /// Queue capacity (>= 1).
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Number of workers (>= 1).
    #[arg(long)]
    workers: Option<usize>,

    /// Number of tasks to submit.
    #[arg(long, default_value_t = 20)]
    tasks: usize,

    /// The first N task runs fail on purpose.
    #[arg(long, default_value_t = 2)]
    failures: u32,

    /// Upper bound for the random per-task sleep.
    #[arg(long, default_value_t = 50)]
    max_delay_ms: u64,

    /// Shut down with Cancel instead of Drain once everything is submitted.
    #[arg(long)]
    cancel: bool,

    /// How long to wait for the workers to exit.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

struct HelloTask {
    name: String,
    delay: Duration,
    remaining_failures: Arc<AtomicU32>,
}

#[async_trait]
impl Task for HelloTask {
    type Output = String;

    async fn run(self: Box<Self>) -> Result<String, TaskError> {
        tokio::time::sleep(self.delay).await;

        // 残り失敗回数があるうちは意図的に失敗させる
        let left = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        if let Ok(left) = left {
            return Err(TaskError::failed(format!("intentional failure (left={left})")));
        }

        Ok(format!("Hello, {}!", self.name))
    }
}

#[derive(Debug, Serialize)]
struct TaskReport {
    task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    terminated: bool,
    status: PoolStatus,
    results: Vec<TaskReport>,
}

/// Initialize tracing with RUST_LOG / SPINDLE_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("SPINDLE_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("spindle_core={level},spindle={level}"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}

fn pool_config(args: &Args) -> anyhow::Result<PoolConfig> {
    let mut config = PoolConfig::from_env().context("reading SPINDLE_* environment")?;
    if let Some(capacity) = args.queue_capacity {
        config = config.with_queue_capacity(capacity);
    }
    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers);
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<Report> {
    // (A) プールを用意
    let pool = WorkerPool::<String>::new(pool_config(&args)?)?;
    let remaining_failures = Arc::new(AtomicU32::new(args.failures));

    // (B) タスク投入（キューが満杯なら submit がここで待つ）
    let mut handles = Vec::with_capacity(args.tasks);
    for i in 0..args.tasks {
        let delay = Duration::from_millis(rand::thread_rng().gen_range(0..=args.max_delay_ms));
        let task = HelloTask {
            name: format!("spindle-{i}"),
            delay,
            remaining_failures: Arc::clone(&remaining_failures),
        };
        handles.push(pool.submit(task).await?);
    }
    tracing::info!(submitted = handles.len(), "all tasks submitted");

    // (C) shutdown
    let mode = if args.cancel {
        ShutdownMode::Cancel
    } else {
        ShutdownMode::Drain
    };
    pool.shutdown(mode);

    // (D) 結果を集める
    let mut results = Vec::with_capacity(handles.len());
    for handle in &handles {
        let (value, error) = match handle.wait().await {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e.to_string())),
        };
        results.push(TaskReport {
            task: handle.task_id().to_string(),
            value,
            error,
        });
    }

    // (E) ワーカーの終了を待つ
    let terminated = pool
        .await_termination(Duration::from_secs(args.timeout_secs))
        .await;
    if !terminated {
        tracing::warn!(timeout_secs = args.timeout_secs, "workers still running after timeout");
    }

    Ok(Report {
        terminated,
        status: pool.status(),
        results,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let report = match run(args).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "spindle failed");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "report encode failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["spindle"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn flags_override_pool_sizing() {
        let config = pool_config(&args(&["--queue-capacity", "3", "--workers", "2"])).unwrap();
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.worker_count, 2);
    }

    #[test]
    fn zero_workers_flag_is_rejected() {
        assert!(pool_config(&args(&["--workers", "0"])).is_err());
    }

    #[tokio::test]
    async fn hello_task_fails_while_failures_remain() {
        let remaining = Arc::new(AtomicU32::new(1));
        let task = |name: &str| {
            Box::new(HelloTask {
                name: name.to_string(),
                delay: Duration::ZERO,
                remaining_failures: Arc::clone(&remaining),
            })
        };

        assert!(task("a").run().await.is_err());
        assert_eq!(task("b").run().await, Ok("Hello, b!".to_string()));
    }

    #[tokio::test]
    async fn drain_run_reports_every_task() {
        let report = run(args(&[
            "--queue-capacity",
            "2",
            "--workers",
            "2",
            "--tasks",
            "6",
            "--failures",
            "1",
            "--max-delay-ms",
            "5",
        ]))
        .await
        .unwrap();

        assert!(report.terminated);
        assert_eq!(report.results.len(), 6);
        assert_eq!(report.results.iter().filter(|r| r.error.is_some()).count(), 1);
        assert_eq!(report.status.counts.completed, 5);
        assert_eq!(report.status.counts.failed, 1);
    }
}
