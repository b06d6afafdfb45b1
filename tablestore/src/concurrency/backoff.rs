//! Linear backoff for store calls that time out.
//!
//! Timeouts are retried without a limit, each wait one increment longer than the previous
//! one. Every other error is logged and returned to the caller unchanged.

use std::future::Future;
use std::time::Duration;

use config::shared::BackupConfig;
use tracing::{error, warn};

use crate::error::TableResult;

/// Delays growing by a fixed increment after every attempt.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    next: Duration,
    increment: Duration,
    attempts: u32,
}

impl LinearBackoff {
    pub fn new(initial: Duration, increment: Duration) -> Self {
        Self {
            next: initial,
            increment,
            attempts: 0,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(config.retry_initial_delay(), config.retry_delay_increment())
    }

    /// Returns the delay before the next attempt and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_add(self.increment);
        self.attempts += 1;

        delay
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Runs `operation` until it succeeds or fails with a non-transient error.
pub async fn retry_on_timeout<T, F, Fut>(
    operation_name: &str,
    backoff: &mut LinearBackoff,
    mut operation: F,
) -> TableResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TableResult<T>>,
{
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind().is_transient() => {
                let delay = backoff.next_delay();
                warn!(
                    operation = operation_name,
                    attempt = backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "store call timed out, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                error!(operation = operation_name, error = %err, "store call failed");
                return Err(err);
            }
        }
    }
}
