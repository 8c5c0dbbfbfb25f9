use std::{fmt::Display, future::Future, num::NonZeroU32, time::Duration};

/// How hard to try validating a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: NonZeroU32,
    /// Sleep after failed attempt `n` is `backoff * n`.
    pub backoff: Duration,
    /// An attempt that takes longer than this counts as failed.
    pub attempt_timeout: Option<Duration>,
}

/// Call `validate` until it gives an answer or attempts run out.
///
/// Any `Ok` answer is final, including `Ok(false)`. Errors and timeouts
/// are retried with linear backoff. Returns [`None`] if no attempt gave
/// an answer; errors never leave this function.
pub async fn with_retry<F, Fut, E>(mut validate: F, policy: &RetryPolicy) -> Option<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.get();

    for attempt in 1..=max_attempts {
        let result = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, validate()).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {limit:?}")),
            },
            None => validate().await.map_err(|e| e.to_string()),
        };

        match result {
            Ok(valid) => return Some(valid),
            Err(e) => {
                log::debug!("Attempt {attempt}/{max_attempts} failed: {e}");
                if attempt < max_attempts {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
        }
    }

    None
}
