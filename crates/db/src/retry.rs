//! Classification of transient SQLite failures and a caller-side retry helper.
//!
//! The store never retries on its own: a failed transaction is rolled back and
//! reported. Callers that want to re-run a whole operation after SQLITE_BUSY /
//! SQLITE_LOCKED contention wrap it in [`with_retry`].

use std::future::Future;
use std::time::Duration;

use sqlx::Error as SqlxError;

use crate::BoardError;

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps the exponential growth).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 50,
            max_delay_ms: 2000,
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

    /// Delay before retry number `attempt` (zero-based), doubling up to the cap.
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Check if an error is a transient SQLite error that should be retried.
///
/// - 5 = SQLITE_BUSY (database is locked by another connection)
/// - 6 = SQLITE_LOCKED (table is locked within a transaction)
/// - 10 = SQLITE_IOERR
///
/// Extended codes are matched on their primary code (`code & 0xFF`).
pub fn is_retryable_error(e: &SqlxError) -> bool {
    let SqlxError::Database(db_err) = e else {
        return false;
    };
    let Some(code) = db_err.code() else {
        return false;
    };
    code.as_ref()
        .parse::<u32>()
        .is_ok_and(|n| matches!(n & 0xFF, 5 | 6 | 10))
}

/// Run a board operation, re-running it after transient contention.
///
/// Non-retryable errors (not found, cross-board, invalid index, validation, ...) are
/// returned immediately.
///
/// # Example
/// ```ignore
/// use db::retry::{RetryConfig, with_retry};
///
/// let card = with_retry(&RetryConfig::default(), "move_card", || {
///     Card::move_to(&db, card_id, done_column, 0)
/// })
/// .await?;
/// ```
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, BoardError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BoardError>>,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Board operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = ?e,
                    "Transient SQLite error, retrying with backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = ?e,
                        "Board operation failed after retries"
                    );
                }
                return Err(e);
            }
        }
    }
}
