use std::future::Future;
use std::time::Duration;
use tracing::warn;

use webpilot_core::{Error, Result};

/// Run `op` up to `attempts` times with exponentially growing delays
/// between failures. Returns the first success or the last error.
pub async fn retry_with_backoff<T, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = base_delay;
    let mut last_err = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, error = %e, "Attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Other("retry with zero attempts".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_inner = calls.clone();
        let result = retry_with_backoff(3, Duration::from_millis(1), move || {
            let calls = calls_inner.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::Agent("flaky".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausts_attempts_and_returns_last_error() {
        let result: Result<()> = retry_with_backoff(2, Duration::from_millis(1), || async {
            Err(Error::Agent("always down".to_string()))
        })
        .await;
        match result {
            Err(Error::Agent(msg)) => assert_eq!(msg, "always down"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
