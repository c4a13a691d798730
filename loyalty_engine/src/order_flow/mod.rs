//! The order-processing flow.
//!
//! [`OrderFlowApi`] drives a locally-persisted order to a terminal state that is consistent with
//! the accrual service's decision, and applies the balance effects. Orders are processed
//! asynchronously on a [`WorkerPool`](crate::worker::WorkerPool); the synchronous driver,
//! [`OrderFlowApi::process_order`], is what each task executes.

mod api;
mod errors;

pub use api::{OrderFlowApi, OrderFlowConfig, ProcessOrderTask};
pub use errors::OrderFlowError;
