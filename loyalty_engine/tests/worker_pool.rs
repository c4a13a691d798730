//! Behavioural tests for the worker pool: bounded queuing, backpressure, failure budgets and
//! panic isolation.
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use loyalty_engine::worker::{PoolConfig, PoolMetrics, PoolTask, TaskError, WorkerMetrics, WorkerPool, WorkerPoolError};
use tokio_util::sync::CancellationToken;

//--------------------------------------    test tasks      ----------------------------------------------------------
struct CountingTask {
    counter: Arc<AtomicUsize>,
    delay: Duration,
}

impl Display for CountingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CountingTask")
    }
}

#[async_trait]
impl PoolTask for CountingTask {
    async fn run(self, _shutdown: CancellationToken) -> Result<(), TaskError> {
        tokio::time::sleep(self.delay).await;
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

enum Outcome {
    Succeed,
    Fail,
    Panic,
}

struct FlakyTask {
    outcome: Outcome,
    counter: Arc<AtomicUsize>,
}

impl Display for FlakyTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FlakyTask")
    }
}

#[async_trait]
impl PoolTask for FlakyTask {
    async fn run(self, _shutdown: CancellationToken) -> Result<(), TaskError> {
        match self.outcome {
            Outcome::Succeed => {
                self.counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Outcome::Fail => Err(TaskError::new("deliberate failure")),
            Outcome::Panic => panic!("deliberate panic"),
        }
    }
}

fn new_pool<T: PoolTask>(worker_count: usize, buffer_size: usize, err_maximum: u64) -> WorkerPool<T> {
    WorkerPool::new(
        "TestWP",
        PoolConfig { worker_count, buffer_size, err_maximum },
        PoolMetrics::new(),
        WorkerMetrics::new,
    )
    .expect("Error creating worker pool")
}

async fn wait_until<F: Fn() -> bool>(deadline: Duration, predicate: F) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

//--------------------------------------       tests        ----------------------------------------------------------
#[tokio::test]
async fn all_submitted_tasks_complete() {
    let pool = new_pool(3, 16, 100);
    let counter = Arc::new(AtomicUsize::new(0));
    pool.start(CancellationToken::new());
    for _ in 0..9 {
        pool.submit(CountingTask { counter: counter.clone(), delay: Duration::from_millis(5) }).unwrap();
    }
    let c = counter.clone();
    assert!(wait_until(Duration::from_secs(2), || c.load(Ordering::SeqCst) == 9).await);
    let metrics = pool.metrics();
    assert_eq!(metrics.pool.submitted, 9);
    assert_eq!(metrics.pool.completed, 9);
    assert_eq!(metrics.pool.failed, 0);
    assert_eq!(metrics.pool.queue_depth, 0);
    assert_eq!(metrics.workers.len(), 3);
}

#[tokio::test]
async fn full_queue_rejects_without_side_effects() {
    // The pool is never started, so the first submission fills the single queue slot.
    let pool = new_pool(1, 1, 100);
    let counter = Arc::new(AtomicUsize::new(0));
    pool.submit(CountingTask { counter: counter.clone(), delay: Duration::ZERO }).unwrap();
    let err = pool.submit(CountingTask { counter: counter.clone(), delay: Duration::ZERO }).unwrap_err();
    assert!(matches!(err, WorkerPoolError::BufferFull));
    let metrics = pool.metrics();
    assert_eq!(metrics.pool.submitted, 1);
    assert_eq!(metrics.pool.queue_depth, 1);
}

#[tokio::test]
async fn error_budget_halts_submissions() {
    let pool = new_pool(1, 16, 2);
    let counter = Arc::new(AtomicUsize::new(0));
    pool.start(CancellationToken::new());
    for _ in 0..3 {
        pool.submit(FlakyTask { outcome: Outcome::Fail, counter: counter.clone() }).unwrap();
    }
    let p = pool.clone();
    assert!(wait_until(Duration::from_secs(2), || p.metrics().pool.failed >= 3).await);
    let err = pool.submit(FlakyTask { outcome: Outcome::Succeed, counter: counter.clone() }).unwrap_err();
    assert!(matches!(err, WorkerPoolError::PoolHalted));
}

#[tokio::test]
async fn panics_are_isolated() {
    let pool = new_pool(1, 16, 100);
    let counter = Arc::new(AtomicUsize::new(0));
    pool.start(CancellationToken::new());
    pool.submit(FlakyTask { outcome: Outcome::Panic, counter: counter.clone() }).unwrap();
    pool.submit(FlakyTask { outcome: Outcome::Succeed, counter: counter.clone() }).unwrap();
    let c = counter.clone();
    // The worker survives the panic and still runs the next task.
    assert!(wait_until(Duration::from_secs(2), || c.load(Ordering::SeqCst) == 1).await);
    let metrics = pool.metrics();
    assert_eq!(metrics.pool.failed, 1);
    assert_eq!(metrics.pool.completed, 1);
}

#[tokio::test]
async fn shutdown_drains_in_flight_tasks() {
    let pool = new_pool(1, 16, 100);
    let counter = Arc::new(AtomicUsize::new(0));
    let shutdown = CancellationToken::new();
    pool.start(shutdown.clone());
    pool.submit(CountingTask { counter: counter.clone(), delay: Duration::from_millis(100) }).unwrap();
    // Let the worker pick the task up, then cancel mid-flight.
    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.cancel();
    let c = counter.clone();
    assert!(wait_until(Duration::from_secs(2), || c.load(Ordering::SeqCst) == 1).await);
    assert_eq!(pool.metrics().pool.completed, 1);
}

#[tokio::test]
async fn start_is_idempotent() {
    let pool = new_pool(2, 16, 100);
    let counter = Arc::new(AtomicUsize::new(0));
    let shutdown = CancellationToken::new();
    pool.start(shutdown.clone());
    pool.start(shutdown.clone());
    pool.submit(CountingTask { counter: counter.clone(), delay: Duration::ZERO }).unwrap();
    let c = counter.clone();
    assert!(wait_until(Duration::from_secs(2), || c.load(Ordering::SeqCst) == 1).await);
    // Two workers were spawned, not four.
    assert_eq!(pool.metrics().workers.len(), 2);
}

#[test]
fn zero_workers_is_rejected() {
    let result: Result<WorkerPool<CountingTask>, _> = WorkerPool::new(
        "BadWP",
        PoolConfig { worker_count: 0, buffer_size: 4, err_maximum: 10 },
        PoolMetrics::new(),
        WorkerMetrics::new,
    );
    assert!(matches!(result, Err(WorkerPoolError::InvalidConfig(_))));
}
