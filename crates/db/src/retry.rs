//! Backoff for transient SQLite failures.
//!
//! Only pool-level statements are retried. Statements inside an open
//! transaction are left to the caller.

use std::future::Future;
use std::time::Duration;

use sqlx::Error as SqlxError;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Upper bound for a single sleep.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 25,
            max_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Doubling delay, capped at `max_delay_ms`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and the SQLITE_IOERR family (10 and its
/// extended codes, whose low byte is 10).
pub fn is_retryable_error(e: &SqlxError) -> bool {
    let SqlxError::Database(db_err) = e else {
        return false;
    };
    let Some(code) = db_err.code() else {
        return false;
    };
    match code.parse::<u32>() {
        Ok(5) | Ok(6) | Ok(10) => true,
        Ok(n) => n > 10 && (n & 0xFF) == 10,
        Err(_) => false,
    }
}

/// Run `f`, retrying retryable errors up to `config.max_retries` times.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
) -> Result<T, SqlxError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SqlxError>>,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(operation, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if is_retryable_error(&e) && attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = ?e,
                    "Transient SQLite error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::error!(
                        operation,
                        attempts = attempt + 1,
                        error = ?e,
                        "Giving up after retries"
                    );
                }
                return Err(e);
            }
        }
    }
}
