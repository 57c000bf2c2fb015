//! Reconnect backoff for bus links.
//!
//! A backend may start before or after the responder, so links are
//! re-established with exponential backoff instead of failing once.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::connection::{connect_unix, BusConnection, MethodHandler};
use super::error::BusError;

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial backoff duration before first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to backoff duration.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry until the peer shows up.
    pub fn persistent() -> Self {
        Self {
            max_retries: u32::MAX,
            ..Default::default()
        }
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.add_jitter {
            // Up to 25% extra.
            let jitter = (backoff_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            duration += Duration::from_millis(jitter);
        }

        duration
    }
}

/// Transport failures are worth another attempt; answers from the peer are not.
pub fn is_retryable(err: &BusError) -> bool {
    matches!(
        err,
        BusError::NotConnected
            | BusError::Disconnected
            | BusError::Timeout(_)
            | BusError::Send(_)
            | BusError::Io(_)
    )
}

/// Run `f` until it succeeds, fails permanently or runs out of retries.
pub async fn retry_bus_op<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    f: F,
) -> Result<T, BusError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BusError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Bus operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= config.max_retries || !is_retryable(&err) {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %err,
                        "Bus operation failed, giving up"
                    );
                    return Err(err);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "Bus operation failed, retrying after backoff"
                );

                sleep(backoff).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Connect to `path`, retrying per `config`.
pub async fn connect_with_retry(
    config: &RetryConfig,
    path: &Path,
    name: &str,
    handler: Arc<dyn MethodHandler>,
) -> Result<BusConnection, BusError> {
    retry_bus_op(config, name, || {
        let handler = handler.clone();
        async move { connect_unix(path, name, handler).await }
    })
    .await
}
