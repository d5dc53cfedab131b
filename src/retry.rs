//! Shared retry helper.
//!
//! Runs a fallible async operation a fixed number of times, logging
//! each failed attempt. The lock client routes its HTTP exchanges
//! through this; device-side loops (loader break-in, TFTP rounds)
//! need exclusive access to the session between attempts and keep
//! their own counters.

use std::future::Future;

use log::warn;

use crate::error::{Error, Result};

/// Run `op` up to `attempts` times, returning the first success.
///
/// Each failed attempt is logged with `label`; the final failure is
/// returned unchanged.
pub async fn retry<T, F, Fut>(attempts: usize, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(attempts > 0);
    let mut last = None;
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!("{label}: attempt {attempt}/{attempts} failed: {err}");
                last = Some(err);
            }
        }
    }
    Err(last.unwrap_or_else(|| Error::Config(format!("{label}: no attempts made"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_on_later_attempt() {
        let calls = AtomicUsize::new(0);
        let result = retry(3, "flaky", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(Error::ConnectionLost)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error() {
        let result: Result<()> = retry(2, "doomed", |_| async { Err(Error::ConnectionLost) }).await;
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }
}
