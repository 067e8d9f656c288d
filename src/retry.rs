//! Bounded retries with per-attempt timeouts and exponential backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::ReviewError;

/// Why one attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// The attempt did not finish within the per-attempt timeout
    Timeout,
    /// Worth retrying: network errors, throttling, server errors
    Transient(E),
    /// Retrying cannot help: authentication, bad requests
    Permanent(E),
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Timeout => f.write_str("timed out"),
            Failure::Transient(e) | Failure::Permanent(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from the initial backoff
    #[inline]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// The same policy with the per-attempt timeout multiplied by `factor`
    #[inline]
    #[must_use]
    pub fn scaled(self, factor: u32) -> Self {
        Self {
            timeout: self.timeout.saturating_mul(factor.max(1)),
            ..self
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last failure when every attempt failed.
    #[inline]
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, Failure<E>>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last = Failure::Timeout;

        for attempt in 1..=attempts {
            debug!("{} attempt {}/{}", label, attempt, attempts);

            let outcome = match tokio::time::timeout(self.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(Failure::Timeout),
            };

            match outcome {
                Ok(value) => {
                    debug!("{} succeeded on attempt {}", label, attempt);
                    return Ok(value);
                }
                Err(Failure::Permanent(error)) => {
                    warn!("{} failed permanently: {}", label, error);
                    return Err(Failure::Permanent(error));
                }
                Err(failure) => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        label, attempt, attempts, failure
                    );
                    last = failure;
                }
            }

            if attempt < attempts {
                let delay = self.backoff(attempt);
                debug!("Waiting {:?} before retrying {}", delay, label);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last)
    }
}

impl RetryPolicy {
    /// Run one persisted-index operation under this policy.
    ///
    /// Store and I/O errors are retried; a timed out final attempt becomes
    /// [`ReviewError::Database`].
    #[inline]
    pub async fn storage<T, F, Fut>(&self, label: &str, mut operation: F) -> crate::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        self.run(label, || {
            let attempt = operation();
            async move { attempt.await.map_err(classify_storage) }
        })
        .await
        .map_err(|failure| match failure {
            Failure::Timeout => {
                ReviewError::Database(format!("{label} timed out after {:?}", self.timeout))
            }
            Failure::Transient(error) | Failure::Permanent(error) => error,
        })
    }
}

/// Sort a store error into transient and permanent failures
#[inline]
pub fn classify_storage(error: ReviewError) -> Failure<ReviewError> {
    match error {
        ReviewError::Database(_) | ReviewError::Io(_) => Failure::Transient(error),
        error => Failure::Permanent(error),
    }
}

/// A blocking HTTP exchange that can be replayed on every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpCall {
    Get {
        url: String,
    },
    PostJson {
        url: String,
        body: String,
        bearer: Option<String>,
    },
}

impl HttpCall {
    fn execute(&self, agent: &ureq::Agent) -> Result<String, ureq::Error> {
        match self {
            HttpCall::Get { url } => agent
                .get(url)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string()),
            HttpCall::PostJson { url, body, bearer } => {
                let mut request = agent.post(url).header("Content-Type", "application/json");
                if let Some(token) = bearer {
                    request = request.header("Authorization", format!("Bearer {token}"));
                }
                request
                    .send(body)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            }
        }
    }
}

impl RetryPolicy {
    /// Run `call` on the blocking pool under this policy and return the body
    #[inline]
    pub async fn http(
        &self,
        agent: &ureq::Agent,
        label: &str,
        call: &HttpCall,
    ) -> Result<String, Failure<String>> {
        self.run(label, || {
            let agent = agent.clone();
            let call = call.clone();
            async move {
                tokio::task::spawn_blocking(move || call.execute(&agent))
                    .await
                    .map_err(|e| Failure::Permanent(format!("request task failed: {e}")))?
                    .map_err(classify_http)
            }
        })
        .await
    }
}

/// Sort a ureq error into transient and permanent failures
#[inline]
pub fn classify_http(error: ureq::Error) -> Failure<String> {
    match error {
        ureq::Error::StatusCode(status) if status == 429 || status >= 500 => {
            Failure::Transient(format!("HTTP {status}"))
        }
        ureq::Error::StatusCode(status) => Failure::Permanent(format!("HTTP {status}")),
        ureq::Error::Timeout(_) => Failure::Timeout,
        error @ (ureq::Error::ConnectionFailed | ureq::Error::HostNotFound | ureq::Error::Io(_)) => {
            Failure::Transient(error.to_string())
        }
        error => Failure::Permanent(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = fast_policy()
            .run("flaky", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Failure::Transient("busy".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_stop_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = fast_policy()
            .run("rejected", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Failure::Permanent("HTTP 401".to_string()))
                }
            })
            .await;

        assert_eq!(result, Err(Failure::Permanent("HTTP 401".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            max_attempts: 2,
            ..fast_policy()
        };

        let result: Result<(), Failure<String>> = policy
            .run("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(Failure::Timeout));
    }

    #[test]
    fn scaling_multiplies_only_the_timeout() {
        let policy = fast_policy().scaled(3);
        assert_eq!(policy.timeout, Duration::from_millis(600));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(fast_policy().scaled(0), fast_policy());
    }

    #[tokio::test]
    async fn stalled_storage_calls_time_out() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            max_attempts: 2,
            ..fast_policy()
        };

        let result: crate::Result<()> = policy
            .storage("load units_app", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;

        assert!(
            matches!(result, Err(ReviewError::Database(ref message)) if message.contains("load units_app timed out"))
        );
    }

    #[tokio::test]
    async fn storage_errors_are_retried_and_others_are_not() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = fast_policy()
            .storage("open", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ReviewError::Database("table is locked".to_string()))
                    } else {
                        Ok(4)
                    }
                }
            })
            .await;
        assert_eq!(result.ok(), Some(4));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: crate::Result<()> = fast_policy()
            .storage("lookup", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ReviewError::IndexNotFound("app".to_string()))
                }
            })
            .await;
        assert!(matches!(result, Err(ReviewError::IndexNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn http_calls_retry_server_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let agent = ureq::Agent::new_with_defaults();
        let call = HttpCall::Get {
            url: format!("{}/flaky", server.uri()),
        };
        let body = fast_policy().http(&agent, "flaky", &call).await;
        assert_eq!(body, Ok("ok".to_string()));
    }

    #[test]
    fn http_errors_are_classified() {
        assert!(matches!(
            classify_http(ureq::Error::StatusCode(503)),
            Failure::Transient(_)
        ));
        assert!(matches!(
            classify_http(ureq::Error::StatusCode(429)),
            Failure::Transient(_)
        ));
        assert!(matches!(
            classify_http(ureq::Error::StatusCode(401)),
            Failure::Permanent(_)
        ));
        assert!(matches!(
            classify_http(ureq::Error::ConnectionFailed),
            Failure::Transient(_)
        ));
    }
}
