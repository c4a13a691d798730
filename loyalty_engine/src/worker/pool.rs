use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use async_trait::async_trait;
use log::*;
use thiserror::Error;
use tokio::sync::{
    mpsc,
    mpsc::error::TrySendError,
    Mutex,
};
use tokio_util::sync::CancellationToken;

use super::{MetricsSnapshot, PoolMetrics, WorkerMetrics};

//--------------------------------------      PoolTask      ----------------------------------------------------------
/// The capability set a task must satisfy: it can be executed (consuming itself) and it can
/// describe itself for logging, so workers can attribute failures.
#[async_trait]
pub trait PoolTask: Display + Send + Sync + 'static {
    async fn run(self, shutdown: CancellationToken) -> Result<(), TaskError>;
}

/// The error a task reports back to its worker. Task errors are fire-and-forget: they are logged
/// and counted, never returned to the submitter.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TaskError(String);

impl TaskError {
    pub fn new<E: Display>(err: E) -> Self {
        Self(err.to_string())
    }
}

//--------------------------------------  WorkerPoolError   ----------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum WorkerPoolError {
    #[error("The task queue is full")]
    BufferFull,
    #[error("The pool has shut down and no longer accepts tasks")]
    PoolClosed,
    #[error("The pool exceeded its error budget and no longer accepts tasks")]
    PoolHalted,
    #[error("Invalid worker pool configuration: {0}")]
    InvalidConfig(String),
}

//--------------------------------------     PoolConfig     ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent workers. Must be at least 1.
    pub worker_count: usize,
    /// Task queue capacity. A zero buffer is clamped to 1, since tokio channels have no
    /// rendezvous mode.
    pub buffer_size: usize,
    /// Soft ceiling on cumulative task failures. Once exceeded, the pool refuses further
    /// submissions.
    pub err_maximum: u64,
}

//--------------------------------------     WorkerPool     ----------------------------------------------------------
/// A fixed-size set of workers consuming a single bounded multi-producer queue.
///
/// Tasks may run in parallel on any worker and there are no ordering guarantees across tasks.
/// Shutdown is driven by the [`CancellationToken`] handed to [`start`](Self::start): workers
/// finish their in-flight task, decline new ones and exit.
pub struct WorkerPool<T> {
    name: String,
    config: PoolConfig,
    tx: mpsc::Sender<T>,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    metrics: Arc<PoolMetrics>,
    worker_metrics: Vec<Arc<WorkerMetrics>>,
    started: Arc<AtomicBool>,
    halted: Arc<AtomicBool>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            metrics: self.metrics.clone(),
            worker_metrics: self.worker_metrics.clone(),
            started: self.started.clone(),
            halted: self.halted.clone(),
        }
    }
}

impl<T: PoolTask> WorkerPool<T> {
    pub fn new<S, F>(
        name: S,
        config: PoolConfig,
        metrics: PoolMetrics,
        worker_metrics_factory: F,
    ) -> Result<Self, WorkerPoolError>
    where
        S: Into<String>,
        F: Fn(usize) -> WorkerMetrics,
    {
        if config.worker_count == 0 {
            return Err(WorkerPoolError::InvalidConfig("worker_count must be at least 1".to_string()));
        }
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let worker_metrics = (0..config.worker_count).map(|id| Arc::new(worker_metrics_factory(id))).collect();
        Ok(Self {
            name: name.into(),
            config,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            metrics: Arc::new(metrics),
            worker_metrics,
            started: Arc::new(AtomicBool::new(false)),
            halted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Spawns the workers. Idempotent, and never blocks the caller. Cancelling `shutdown` makes
    /// every worker finish its in-flight task and exit.
    pub fn start(&self, shutdown: CancellationToken) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("👷️ [{}] start called on a running pool. Nothing to do.", self.name);
            return;
        }
        self.metrics.mark_started();
        info!("👷️ [{}] starting {} workers", self.name, self.config.worker_count);
        for wm in &self.worker_metrics {
            tokio::spawn(worker_loop(
                self.name.clone(),
                self.rx.clone(),
                shutdown.clone(),
                self.metrics.clone(),
                wm.clone(),
                self.halted.clone(),
                self.config.err_maximum,
            ));
        }
    }

    /// Non-blocking enqueue with backpressure. The same task instance must not be submitted
    /// twice; tasks are consumed by the worker that picks them up.
    pub fn submit(&self, task: T) -> Result<(), WorkerPoolError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(WorkerPoolError::PoolHalted);
        }
        match self.tx.try_send(task) {
            Ok(()) => {
                self.metrics.task_submitted();
                Ok(())
            },
            Err(TrySendError::Full(_)) => Err(WorkerPoolError::BufferFull),
            Err(TrySendError::Closed(_)) => Err(WorkerPoolError::PoolClosed),
        }
    }

    /// An atomic snapshot of the pool and per-worker counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::collect(&self.metrics, &self.worker_metrics)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

async fn worker_loop<T: PoolTask>(
    pool_name: String,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    shutdown: CancellationToken,
    pool_metrics: Arc<PoolMetrics>,
    worker_metrics: Arc<WorkerMetrics>,
    halted: Arc<AtomicBool>,
    err_maximum: u64,
) {
    loop {
        // The queue lock is held only while waiting for the next task, never while running one,
        // so the single receiver behaves as a multi-consumer queue.
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                task = rx.recv() => task,
            }
        };
        let Some(task) = task else {
            break;
        };

        pool_metrics.task_started();
        worker_metrics.task_started();
        let label = task.to_string();
        let begin = Instant::now();
        // Running the task on its own spawn isolates panics: a panicking task surfaces here as a
        // JoinError instead of taking the worker down.
        let outcome = tokio::spawn(task.run(shutdown.child_token())).await;
        worker_metrics.add_busy_micros(begin.elapsed().as_micros() as u64);

        match outcome {
            Ok(Ok(())) => {
                pool_metrics.task_completed();
                worker_metrics.task_completed();
                trace!("👷️ [{pool_name}] task {label} completed");
            },
            Ok(Err(e)) => {
                worker_metrics.task_failed();
                warn!("👷️ [{pool_name}] task {label} failed: {e}");
                check_error_budget(&pool_name, &pool_metrics, &halted, err_maximum);
            },
            Err(join_err) => {
                worker_metrics.task_failed();
                error!("👷️ [{pool_name}] task {label} panicked: {join_err}");
                check_error_budget(&pool_name, &pool_metrics, &halted, err_maximum);
            },
        }
    }
    debug!("👷️ [{pool_name}] worker exiting");
}

fn check_error_budget(pool_name: &str, pool_metrics: &PoolMetrics, halted: &AtomicBool, err_maximum: u64) {
    let failures = pool_metrics.task_failed();
    if failures > err_maximum && !halted.swap(true, Ordering::SeqCst) {
        error!("👷️ [{pool_name}] FATAL: {failures} task failures exceed the budget of {err_maximum}. Submissions are halted.");
    }
}
