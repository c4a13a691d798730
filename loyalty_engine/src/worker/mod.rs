//! A fixed-size worker pool with a bounded task queue.
//!
//! Producers [`submit`](WorkerPool::submit) tasks without blocking; when the queue is saturated
//! they receive [`WorkerPoolError::BufferFull`] and must decide what to do with the backpressure
//! themselves (the HTTP layer translates it into a 429). Workers drain the queue concurrently,
//! isolate panics, and feed per-pool and per-worker counters that can be snapshotted at any time
//! via [`WorkerPool::metrics`].

mod metrics;
mod pool;

pub use metrics::{MetricsSnapshot, PoolMetrics, PoolSnapshot, WorkerMetrics, WorkerSnapshot};
pub use pool::{PoolConfig, PoolTask, TaskError, WorkerPool, WorkerPoolError};
