use async_trait::async_trait;
use detect::{BackendError, CompletionBackend, CompletionRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryConfig;

pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.initial_backoff_ms, config.max_backoff_ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Retry a backend call with exponential backoff. Only transient
    /// failures are retried.
    pub async fn retry<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }
}

/// Wraps a backend so every completion goes through a [`RetryPolicy`].
pub struct RetryingBackend {
    inner: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl CompletionBackend for RetryingBackend {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, BackendError> {
        let operation = format!("{:?} completion", request.stage);
        self.policy
            .retry(&operation, || self.inner.complete(request.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient() -> BackendError {
        BackendError::Status {
            status: 502,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, 1, 5);

        let result = policy
            .retry("test", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2, 1, 5);

        let result: Result<(), _> = policy
            .retry("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, 1, 5);

        let result: Result<(), _> = policy
            .retry("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::Protocol("bad envelope".to_string()))
            })
            .await;

        assert!(matches!(result, Err(BackendError::Protocol(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    struct FlakyBackend {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionBackend for FlakyBackend {
        async fn complete(&self, _request: CompletionRequest<'_>) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(transient());
            }
            Ok("narrative".to_string())
        }
    }

    #[tokio::test]
    async fn test_retrying_backend_recovers() {
        let inner = Arc::new(FlakyBackend {
            failures_left: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
        });
        let backend = RetryingBackend::new(inner.clone(), RetryPolicy::new(2, 1, 5));
        let user = detect::UserContent::Text("record".to_string());

        let text = backend
            .complete(CompletionRequest {
                stage: detect::Stage::Analysis,
                system_prompt: "system",
                user: &user,
                params: detect::GenerationParams::analysis(),
            })
            .await
            .unwrap();

        assert_eq!(text, "narrative");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
