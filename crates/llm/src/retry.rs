//! Transient-failure retries with jittered exponential backoff.

use std::{future::Future, time::Duration};

use rand::Rng;

use crate::error::LlmError;

const BASE_DELAY_MS: u64 = 200;
const MAX_DELAY_MS: u64 = 5_000;

/// Run `operation` up to `max_retries` extra times while it fails with a
/// transient error. Non-transient errors surface immediately.
pub(crate) async fn with_backoff<T, F, Fut>(max_retries: u32, mut operation: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_retries => {
                let delay = backoff_delay(attempt);
                log::debug!(
                    "provider call failed (attempt {}): {err}; retrying in {delay:?}",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(8)).min(MAX_DELAY_MS);
    // Full jitter keeps concurrent retries from stampeding.
    let jittered = rand::rng().random_range(0..=exp);
    Duration::from_millis(jittered.max(BASE_DELAY_MS / 2))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);

        let result = with_backoff(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::ConnectionError("reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_do_not_retry() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::InvalidRequest("bad".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_backoff(2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Timeout) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
