//! Client for the upstream accrual service.
//!
//! The accrual service is the single authority on order scoring. It exposes one endpoint,
//! `GET /api/orders/{number}`, and is allowed to be flaky: the client retries transient errors
//! with a status-aware backoff, honouring the server's `Retry-After` header on 429 responses.

mod client;
mod errors;

pub use client::AccrualClient;
pub use errors::AccrualApiError;
