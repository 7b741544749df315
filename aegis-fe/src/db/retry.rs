//! Retry for transient SQLite lock errors
//!
//! `busy_timeout` absorbs most contention inside SQLite itself. Anything
//! that still surfaces as "database is locked" is retried here with
//! exponential backoff (10 ms doubling, capped at 1 s) until `max_wait`
//! elapses. Other errors fail immediately.

use aegis_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Total retry window for store writes
pub const MAX_LOCK_WAIT: Duration = Duration::from_millis(5000);

/// SQLite primary result codes for SQLITE_BUSY and SQLITE_LOCKED
const BUSY_CODES: &[&str] = &["5", "6"];

/// True if `err` is a transient lock error worth retrying
pub fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(sqlx::Error::Database(db_err)) => {
            let busy_code = db_err
                .code()
                .map(|code| BUSY_CODES.contains(&code.as_ref()))
                .unwrap_or(false);
            busy_code || db_err.message().contains("database is locked")
        }
        _ => false,
    }
}

/// Run `operation` until it succeeds, fails with a non-lock error, or
/// `max_wait` elapses
pub async fn retry_on_lock<F, Fut, T>(operation_name: &str, max_wait: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if is_lock_error(&err) => {
                let elapsed = start_time.elapsed();
                if elapsed >= max_wait {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Database still locked, giving up"
                    );
                    return Err(Error::Internal(format!(
                        "{}: database locked after {} attempts ({} ms)",
                        operation_name,
                        attempt,
                        elapsed.as_millis()
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_attempt_success() {
        let result = retry_on_lock("test_op", MAX_LOCK_WAIT, || async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_lock_error_is_not_retried() {
        let mut attempts = 0;
        let result = retry_on_lock("test_op", MAX_LOCK_WAIT, || {
            attempts += 1;
            async { Err::<i32, _>(Error::Internal("other error".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_lock_error_classification() {
        assert!(!is_lock_error(&Error::Internal("database is locked".into())));
        assert!(!is_lock_error(&Error::Database(sqlx::Error::RowNotFound)));
    }
}
