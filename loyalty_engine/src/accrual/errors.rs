use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccrualApiError {
    #[error("The order is not known to the accrual service")]
    NotFound,
    #[error("Accrual service error")]
    InternalServerError,
    #[error("The accrual request timed out")]
    RequestTimeout,
    #[error("The accrual gateway timed out")]
    GatewayTimeout,
    #[error("Too many requests. Retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },
    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),
    #[error("Could not decode the accrual response: {0}")]
    ResponseFormat(String),
    #[error("Network error calling the accrual service: {message}")]
    Network { message: String, timeout: bool },
    #[error("Maximum number of repeated requests reached")]
    MaxRetriesExceeded(#[source] Box<AccrualApiError>),
    #[error("The request was cancelled")]
    Cancelled,
}

impl AccrualApiError {
    /// True for errors worth another attempt: rate limiting, transient upstream failures and
    /// network timeouts. 404, decode failures and unexpected statuses are terminal.
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            AccrualApiError::TooManyRequests { .. }
                | AccrualApiError::InternalServerError
                | AccrualApiError::RequestTimeout
                | AccrualApiError::GatewayTimeout
                | AccrualApiError::Network { timeout: true, .. }
        )
    }
}

impl From<reqwest::Error> for AccrualApiError {
    fn from(e: reqwest::Error) -> Self {
        AccrualApiError::Network { message: e.to_string(), timeout: e.is_timeout() }
    }
}
