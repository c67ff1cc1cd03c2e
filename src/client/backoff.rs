use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::AppError;

/// Capped exponential backoff with a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_attempts: 6,
        }
    }
}

impl Backoff {
    /// Delay to wait after the failed `attempt` (zero based), or `None` once
    /// the attempt budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.min(16));
        Some(self.base.saturating_mul(factor).min(self.max_delay))
    }
}

/// Runs `connect` until it succeeds or the backoff gives up. The last error
/// is reported as a transport failure.
pub async fn retry_with_backoff<T, F, Fut>(backoff: Backoff, mut connect: F) -> Result<T, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0;
    loop {
        match connect(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => match backoff.delay(attempt) {
                Some(delay) => {
                    debug!(attempt = attempt + 1, max_attempts = backoff.max_attempts, ?delay, error = %err, "reconnect failed; backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    return Err(AppError::Transport(format!(
                        "gave up after {} attempts: {err}",
                        attempt + 1
                    )));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::{Backoff, retry_with_backoff};
    use crate::error::AppError;

    fn quick() -> Backoff {
        Backoff {
            base: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_attempts: 5,
        }
    }

    #[test]
    fn delays_double_up_to_the_cap() {
        let backoff = Backoff {
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            max_attempts: 10,
        };
        assert_eq!(backoff.delay(0), Some(Duration::from_millis(500)));
        assert_eq!(backoff.delay(1), Some(Duration::from_millis(1000)));
        assert_eq!(backoff.delay(2), Some(Duration::from_millis(2000)));
        assert_eq!(backoff.delay(3), Some(Duration::from_secs(3)));
        assert_eq!(backoff.delay(8), Some(Duration::from_secs(3)));
        assert_eq!(backoff.delay(9), None);
    }

    #[tokio::test]
    async fn succeeds_once_the_transport_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_with_backoff(quick(), move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(AppError::Transport("connection refused".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), AppError> = retry_with_backoff(quick(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Transport("down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
