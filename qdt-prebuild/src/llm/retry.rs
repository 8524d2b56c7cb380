//! Retry with linear backoff for external calls
//!
//! Attempt `n` failing waits `delay * n` before attempt `n + 1`. After the last
//! attempt the error is returned as `Error::External`.

use super::LlmService;
use async_trait::async_trait;
use qdt_common::{Error, Result};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached
pub async fn with_retry<F, Fut, T>(operation_name: &str, policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Call succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Call failed, retries exhausted"
                    );
                    return Err(Error::External(format!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempt, err
                    )));
                }

                let backoff = policy.delay * attempt;
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Call failed, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// `LlmService` wrapper applying a retry policy to every prompt
pub struct RetryingLlm<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: LlmService> RetryingLlm<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: LlmService> LlmService for RetryingLlm<S> {
    async fn send_prompt(&self, prompt: &str, image: Option<&Path>) -> Result<String> {
        with_retry("llm prompt", self.policy, || self.inner.send_prompt(prompt, image)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry("flaky", fast_policy(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(Error::External(format!("attempt {}", n)))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = with_retry("broken", fast_policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::External("down".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, Error::External(msg) if msg.contains("after 3 attempts")));
    }
}
