use thiserror::Error;

use crate::{accrual::AccrualApiError, traits::UserApiError};

#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("Invalid order flow configuration: {0}")]
    Config(String),
    #[error("Accrual lookup failed: {0}")]
    Accrual(#[from] AccrualApiError),
    #[error("Storage error while settling the order: {0}")]
    Database(#[from] UserApiError),
    #[error("Gave up processing the order after {attempts} attempts")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Option<Box<OrderFlowError>>,
    },
    #[error("Order processing was cancelled")]
    Cancelled,
}
