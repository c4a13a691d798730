use std::{fmt::Display, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::*;
use lp_common::Points;
use tokio_util::sync::CancellationToken;

use super::OrderFlowError;
use crate::{
    accrual::{AccrualApiError, AccrualClient},
    db_types::{Order, OrderStatus},
    traits::LoyaltyDatabase,
    worker::{MetricsSnapshot, PoolConfig, PoolMetrics, PoolTask, TaskError, WorkerMetrics, WorkerPool, WorkerPoolError},
};

//--------------------------------------  OrderFlowConfig   ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct OrderFlowConfig {
    /// host:port of the accrual service.
    pub accrual_address: String,
    pub worker_count: usize,
    pub buffer_size: usize,
    pub err_maximum: u64,
    /// Additional attempts after the first one, both for the HTTP client and for the
    /// fetch-settle rounds of [`OrderFlowApi::process_order`].
    pub max_retries: u32,
    pub retry_delay: Duration,
}

//--------------------------------------    OrderFlowApi    ----------------------------------------------------------
/// `OrderFlowApi` is the primary API for driving uploaded orders to their terminal state.
///
/// Cloning is cheap (the state is shared), which is what allows each queued task to carry a
/// handle back to the API that spawned it.
pub struct OrderFlowApi<B: LoyaltyDatabase> {
    inner: Arc<FlowInner<B>>,
}

struct FlowInner<B: LoyaltyDatabase> {
    db: B,
    client: AccrualClient,
    pool: WorkerPool<ProcessOrderTask<B>>,
    max_retries: u32,
    retry_delay: Duration,
}

impl<B: LoyaltyDatabase> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<B: LoyaltyDatabase> OrderFlowApi<B> {
    pub fn new(db: B, config: OrderFlowConfig) -> Result<Self, OrderFlowError> {
        if config.accrual_address.is_empty() {
            return Err(OrderFlowError::Config("accrual_address must not be an empty string".to_string()));
        }
        if config.retry_delay.is_zero() {
            return Err(OrderFlowError::Config("retry_delay must be greater than zero".to_string()));
        }
        let client = AccrualClient::new(&config.accrual_address, config.max_retries, config.retry_delay);
        let pool = WorkerPool::new(
            "OrderWP",
            PoolConfig {
                worker_count: config.worker_count,
                buffer_size: config.buffer_size,
                err_maximum: config.err_maximum,
            },
            PoolMetrics::new(),
            WorkerMetrics::new,
        )
        .map_err(|e| OrderFlowError::Config(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(FlowInner {
                db,
                client,
                pool,
                max_retries: config.max_retries,
                retry_delay: config.retry_delay,
            }),
        })
    }

    /// Starts the underlying worker pool. Idempotent and non-blocking.
    pub fn start(&self, shutdown: CancellationToken) {
        self.inner.pool.start(shutdown);
    }

    /// Wraps the order in a task and submits it to the pool. Submission errors (backpressure,
    /// halted pool) surface to the caller so that it can pick a response.
    pub fn async_process_order(&self, order: Order) -> Result<(), WorkerPoolError> {
        let number = order.number.clone();
        let task = ProcessOrderTask { api: self.clone(), order };
        if let Err(e) = self.inner.pool.submit(task) {
            error!("🔄️ Failed to submit task for order [{number}]: {e}");
            return Err(e);
        }
        trace!("🔄️ Order [{number}] enqueued for processing");
        Ok(())
    }

    /// Synchronous single-order processing.
    ///
    /// Repeats up to `max_retries + 1` rounds of fetch → interpret → settle, sleeping an
    /// exponentially doubling delay between rounds. Within one round the sequence
    /// {fetch, settle order, apply balance} is strictly ordered; the settle and the balance
    /// update happen in one store transaction (see
    /// [`LoyaltyDatabase::settle_order`]), so points are credited exactly once per order no
    /// matter how often this runs.
    pub async fn process_order(&self, shutdown: &CancellationToken, order: &Order) -> Result<Order, OrderFlowError> {
        info!("🔄️ Start processing order [{}]", order.number);
        let inner = &self.inner;
        let mut delay = inner.retry_delay;
        let mut attempt = 0u32;
        loop {
            // The client already retries transient upstream errors (including 429 backoff) up to
            // the shared budget, so whatever arrives here is final for this order.
            let remote = match inner.client.get_order_info(shutdown, &order.number).await {
                Ok(remote) => remote,
                Err(AccrualApiError::Cancelled) => return Err(OrderFlowError::Cancelled),
                Err(e) => {
                    info!("🔄️ Error fetching order [{}] from the accrual service: {e}", order.number);
                    return Err(e.into());
                },
            };
            debug!("🔄️ Accrual service reports order [{}] as {}", remote.number, remote.status);

            let (status, accrual) = match remote.status {
                OrderStatus::Invalid => (OrderStatus::Invalid, None),
                OrderStatus::Processed => {
                    let accrual = remote.accrual.unwrap_or_else(|| {
                        warn!("🔄️ PROCESSED order [{}] arrived without an accrual. Treating as zero.", order.number);
                        Points::from(0)
                    });
                    (OrderStatus::Processed, Some(accrual))
                },
                OrderStatus::Registered | OrderStatus::Processing => {
                    if attempt >= inner.max_retries {
                        return Err(OrderFlowError::MaxRetriesExceeded { attempts: attempt + 1, source: None });
                    }
                    self.wait(shutdown, delay).await?;
                    delay *= 2;
                    attempt += 1;
                    continue;
                },
            };

            match inner.db.settle_order(&order.number, status, accrual).await {
                Ok(Some(settled)) => return Ok(settled),
                Ok(None) => {
                    // A concurrent task beat us to it. The terminal updates converge, so hand
                    // back whatever is persisted.
                    debug!("🔄️ Order [{}] was already completed", order.number);
                    let existing = inner.db.fetch_order_by_number(&order.number).await?;
                    return existing.ok_or_else(|| {
                        OrderFlowError::Database(crate::traits::UserApiError::OrderNotFound(order.number.clone()))
                    });
                },
                Err(e) => {
                    warn!("🔄️ Error while saving the settled order [{}]: {e}", order.number);
                    if attempt >= inner.max_retries {
                        return Err(OrderFlowError::MaxRetriesExceeded {
                            attempts: attempt + 1,
                            source: Some(Box::new(e.into())),
                        });
                    }
                    self.wait(shutdown, delay).await?;
                    delay *= 2;
                    attempt += 1;
                },
            }
        }
    }

    /// Pass-through to the pool metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.pool.metrics()
    }

    pub fn db(&self) -> &B {
        &self.inner.db
    }

    async fn wait(&self, shutdown: &CancellationToken, delay: Duration) -> Result<(), OrderFlowError> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = shutdown.cancelled() => Err(OrderFlowError::Cancelled),
        }
    }
}

//-------------------------------------- ProcessOrderTask   ----------------------------------------------------------
/// The unit of work submitted to the pool: a handle to the flow API plus a value copy of the
/// order as it looked at submission time.
pub struct ProcessOrderTask<B: LoyaltyDatabase> {
    api: OrderFlowApi<B>,
    order: Order,
}

impl<B: LoyaltyDatabase> Display for ProcessOrderTask<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProcessOrder: Order-{}", self.order.number)
    }
}

#[async_trait]
impl<B: LoyaltyDatabase> PoolTask for ProcessOrderTask<B> {
    async fn run(self, shutdown: CancellationToken) -> Result<(), TaskError> {
        self.api.process_order(&shutdown, &self.order).await.map(|_| ()).map_err(TaskError::new)
    }
}
