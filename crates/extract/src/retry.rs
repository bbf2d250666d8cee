use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1000,
        }
    }
}

/// One attempt plus up to `max_retries` retries, with a fixed pause between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, delay_ms: u64) -> Self {
        Self {
            max_retries,
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.delay_ms)
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// `on_retry` is invoked once before each retry.
    pub async fn retry<F, Fut, T, E, R>(
        &self,
        operation_name: &str,
        mut f: F,
        mut on_retry: R,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: FnMut(),
    {
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );

                    on_retry();
                    if !self.delay.is_zero() {
                        sleep(self.delay).await;
                    }
                }
            }
        }
    }
}
