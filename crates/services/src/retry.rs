use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ExamError;

/// Bounded exponential backoff for transient exam-service failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
            jitter_max: Some(Duration::from_millis(250)),
        }
    }
}

impl RetryPolicy {
    /// One attempt, no retries.
    #[must_use]
    pub fn single() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the policy runs out.
///
/// `op` receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn retry_transient<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, ExamError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, ExamError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    let mut backoff = policy.base_backoff;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let wait = backoff + jitter(policy.jitter_max);
                warn!(attempt, max_attempts, ?wait, error = %err, "transient failure, retrying");
                tokio::time::sleep(wait).await;
                backoff = std::cmp::min(backoff * 2, policy.max_backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn jitter(max: Option<Duration>) -> Duration {
    match max {
        Some(max) if !max.is_zero() => {
            let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rand::random_range(0..=max_ms))
        }
        _ => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            jitter_max: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let res = retry_transient(&fast(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(ExamError::Transient("timeout".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(res, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let res: Result<(), _> = retry_transient(&fast(2), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExamError::Transient("down".into())) }
        })
        .await;
        assert!(res.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_is_never_retried() {
        let calls = AtomicUsize::new(0);
        let res: Result<(), _> = retry_transient(&fast(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExamError::Rejected("Exam not in progress".into())) }
        })
        .await;
        assert_eq!(res, Err(ExamError::Rejected("Exam not in progress".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn single_policy_has_one_attempt() {
        assert_eq!(RetryPolicy::single().max_attempts, 1);
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn jitter_stays_within_bound() {
        for _ in 0..32 {
            assert!(jitter(Some(Duration::from_millis(5))) <= Duration::from_millis(5));
        }
        assert_eq!(jitter(None), Duration::ZERO);
    }
}
