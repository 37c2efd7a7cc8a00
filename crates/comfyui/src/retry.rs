//! Bounded exponential-backoff retry for opening the ComfyUI WebSocket.
//!
//! A request only gets a few attempts: the caller is waiting on the
//! other end, so a server that stays unreachable must surface as an error
//! quickly rather than being retried forever.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUIClient, ComfyUIClientError, ComfyUIConnection};

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total connection attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay, clamped to [`RetryConfig::max_delay`].
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Connect as `client_id`, retrying with backoff.
///
/// Returns the last connection error once `max_attempts` is exhausted, or
/// [`ComfyUIClientError::Cancelled`] if `cancel` fires first.
pub async fn connect_with_retry(
    client: &ComfyUIClient,
    client_id: &str,
    config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<ComfyUIConnection, ComfyUIClientError> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ComfyUIClientError::Cancelled),
            result = client.connect(client_id) => result,
        };

        match result {
            Ok(conn) => {
                if attempt > 1 {
                    tracing::info!(client_id, attempt, "Connected to ComfyUI after retry");
                }
                return Ok(conn);
            }
            Err(e) if attempt >= config.max_attempts.max(1) => {
                tracing::error!(client_id, attempt, error = %e, "Giving up connecting to ComfyUI");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    client_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "ComfyUI connection attempt failed, retrying",
                );
            }
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ComfyUIClientError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}
