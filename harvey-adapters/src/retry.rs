//! Shared retry/backoff policy for downstream HTTP adapters.
//!
//! Transport failures and 5xx-class HTTP statuses are retried up to 3
//! attempts with jittered exponential backoff; everything else is
//! surfaced immediately.

use std::time::Duration;

use harvey_types::TransportError;
use rand::Rng;

/// Maximum retry attempts for a single adapter call.
pub const MAX_ATTEMPTS: u32 = 3;

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 200u64.saturating_mul(1u64 << attempt.min(10));
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 4 + 1);
    Duration::from_millis(base_ms + jitter)
}

/// Run `op` up to [`MAX_ATTEMPTS`] times, retrying only on
/// [`TransportError::is_retryable`] failures.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_on_retryable_error_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, TransportError> = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TransportError::HttpStatus(503))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TransportError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::HttpStatus(404)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TransportError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::Timeout(1)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
