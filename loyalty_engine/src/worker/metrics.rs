use std::{
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        OnceLock,
    },
    time::Instant,
};

use serde::Serialize;

//--------------------------------------    PoolMetrics     ----------------------------------------------------------
/// Pool-wide counters. All fields are updated atomically from every worker; a snapshot is
/// consistent per counter but may tear across counters, which is acceptable for reporting.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    submitted: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    queue_depth: AtomicI64,
    started_at: OnceLock<Instant>,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_started(&self) {
        let _ = self.started_at.set(Instant::now());
    }

    pub(crate) fn task_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn task_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failure and returns the new cumulative failure count.
    pub(crate) fn task_failed(&self) -> u64 {
        self.failed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn uptime_micros(&self) -> u64 {
        self.started_at.get().map(|t| t.elapsed().as_micros() as u64).unwrap_or(0)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed).max(0),
        }
    }
}

//--------------------------------------   WorkerMetrics    ----------------------------------------------------------
/// Counters for a single worker. Each worker owns its instance; only the busy-time accumulator
/// is read from outside.
#[derive(Debug)]
pub struct WorkerMetrics {
    id: usize,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    busy_micros: AtomicU64,
}

impl WorkerMetrics {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            started: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            busy_micros: AtomicU64::new(0),
        }
    }

    pub(crate) fn task_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_busy_micros(&self, micros: u64) {
        self.busy_micros.fetch_add(micros, Ordering::Relaxed);
    }

    fn snapshot(&self, uptime_micros: u64) -> WorkerSnapshot {
        let busy = self.busy_micros.load(Ordering::Relaxed);
        let busy_ratio = if uptime_micros == 0 { 0.0 } else { busy as f64 / uptime_micros as f64 };
        WorkerSnapshot {
            id: self.id,
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            busy_ratio,
        }
    }
}

//--------------------------------------  MetricsSnapshot   ----------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub submitted: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub queue_depth: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub id: usize,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    /// Fraction of wall time this worker spent executing tasks since the pool started.
    pub busy_ratio: f64,
}

/// An atomic snapshot of the pool and per-worker counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub pool: PoolSnapshot,
    pub workers: Vec<WorkerSnapshot>,
}

impl MetricsSnapshot {
    pub(crate) fn collect(pool: &PoolMetrics, workers: &[std::sync::Arc<WorkerMetrics>]) -> Self {
        let uptime = pool.uptime_micros();
        Self { pool: pool.snapshot(), workers: workers.iter().map(|w| w.snapshot(uptime)).collect() }
    }
}
