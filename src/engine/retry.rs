//! Bounded retry for gateway calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::api::GatewayError;

use super::error::ExecError;

/// Fixed-interval retry policy wrapping a single gateway call.
///
/// `max_retries` is the total attempt count, not the count of re-attempts.
/// Only transient failures are retried; rejections propagate on first sight.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            retry_interval,
        }
    }

    /// Drive `op` to completion within the attempt budget.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ExecError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            match op().await {
                Ok(value) => return Ok(value),
                Err(GatewayError::Rejected(detail)) => {
                    return Err(ExecError::OrderRejected(format!("{label}: {detail}")));
                }
                Err(GatewayError::Transient(detail)) => {
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_retries,
                        error = %detail,
                        "transient gateway failure"
                    );
                    last_error = detail;
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_interval).await;
                    }
                }
            }
        }

        Err(ExecError::ExchangeUnavailable {
            attempts: self.max_retries,
            last_error: format!("{label}: {last_error}"),
        })
    }
}
