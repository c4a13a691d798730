use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use tokio_util::sync::CancellationToken;

use super::AccrualApiError;
use crate::db_types::{AccrualOrder, OrderNumber};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

//--------------------------------------   AccrualClient    ----------------------------------------------------------
/// HTTP client for the accrual service.
///
/// `get_order_info` performs up to `max_retries` additional attempts after the first one.
/// Between attempts it waits either the server-supplied `Retry-After` (when the previous error
/// was a 429) or the configured `retry_delay`. Cancellation aborts the wait immediately.
#[derive(Debug, Clone)]
pub struct AccrualClient {
    base_url: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl AccrualClient {
    pub fn new<S: Into<String>>(base_url: S, max_retries: u32, retry_delay: Duration) -> Self {
        let client = Client::builder()
            .user_agent("Loyalty Points Server")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create reqwest client");
        Self { base_url: base_url.into(), client, max_retries, retry_delay }
    }

    /// Fetches the authoritative status and score for one order number.
    ///
    /// Returns [`AccrualApiError::MaxRetriesExceeded`] wrapping the last transient error once
    /// the retry budget is spent, and the terminal error directly otherwise.
    pub async fn get_order_info(
        &self,
        shutdown: &CancellationToken,
        number: &OrderNumber,
    ) -> Result<AccrualOrder, AccrualApiError> {
        let url = format!("http://{}/api/orders/{}", self.base_url, number);
        let mut delay = self.retry_delay;
        let mut attempt = 0u32;
        loop {
            match self.do_request(&url).await {
                Ok(order) => return Ok(order),
                Err(e) => {
                    if let AccrualApiError::TooManyRequests { retry_after } = &e {
                        delay = *retry_after;
                    }
                    if !e.should_retry() {
                        return Err(e);
                    }
                    if attempt >= self.max_retries {
                        return Err(AccrualApiError::MaxRetriesExceeded(Box::new(e)));
                    }
                    info!("📡️ Retrying {url} (attempt {attempt}): {e}");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {},
                        _ = shutdown.cancelled() => return Err(AccrualApiError::Cancelled),
                    }
                    delay = self.retry_delay;
                    attempt += 1;
                },
            }
        }
    }

    async fn do_request(&self, url: &str) -> Result<AccrualOrder, AccrualApiError> {
        let resp = self.client.get(url).send().await?;
        match resp.status() {
            StatusCode::OK => {
                let order = resp.json::<AccrualOrder>().await.map_err(|e| {
                    debug!("📡️ Could not decode accrual response: {e}");
                    AccrualApiError::ResponseFormat(e.to_string())
                })?;
                Ok(order)
            },
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = parse_retry_after(resp.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()));
                Err(AccrualApiError::TooManyRequests { retry_after })
            },
            StatusCode::INTERNAL_SERVER_ERROR => Err(AccrualApiError::InternalServerError),
            StatusCode::REQUEST_TIMEOUT => Err(AccrualApiError::RequestTimeout),
            StatusCode::GATEWAY_TIMEOUT => Err(AccrualApiError::GatewayTimeout),
            StatusCode::NOT_FOUND => Err(AccrualApiError::NotFound),
            code => Err(AccrualApiError::UnexpectedStatus(code.as_u16())),
        }
    }
}

/// Interprets a `Retry-After` header as either whole seconds or an HTTP-date. An absent or
/// unparsable value is logged and falls back to 60 seconds.
fn parse_retry_after(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        warn!("📡️ 429 response without a Retry-After header. Defaulting to {DEFAULT_RETRY_AFTER:?}");
        return DEFAULT_RETRY_AFTER;
    };
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Duration::from_secs(secs);
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
        let until = date.with_timezone(&Utc) - Utc::now();
        return until.to_std().unwrap_or(Duration::ZERO);
    }
    warn!("📡️ Invalid Retry-After header: {raw}. Defaulting to {DEFAULT_RETRY_AFTER:?}");
    DEFAULT_RETRY_AFTER
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::Utc;

    use super::parse_retry_after;

    #[test]
    fn seconds_value() {
        assert_eq!(parse_retry_after(Some("0")), Duration::ZERO);
        assert_eq!(parse_retry_after(Some("1")), Duration::from_secs(1));
        assert_eq!(parse_retry_after(Some(" 30 ")), Duration::from_secs(30));
    }

    #[test]
    fn http_date_value() {
        let date = (Utc::now() + chrono::Duration::seconds(90)).to_rfc2822();
        let parsed = parse_retry_after(Some(&date));
        assert!(parsed > Duration::from_secs(80) && parsed <= Duration::from_secs(90), "{parsed:?}");
    }

    #[test]
    fn past_http_date_is_zero() {
        let date = (Utc::now() - chrono::Duration::seconds(90)).to_rfc2822();
        assert_eq!(parse_retry_after(Some(&date)), Duration::ZERO);
    }

    #[test]
    fn missing_or_garbage_defaults_to_a_minute() {
        assert_eq!(parse_retry_after(None), Duration::from_secs(60));
        assert_eq!(parse_retry_after(Some("soon")), Duration::from_secs(60));
        assert_eq!(parse_retry_after(Some("-5")), Duration::from_secs(60));
    }
}
