use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ApiFailure;
use crate::response::ApiResult;
use crate::tenant::TenantContext;

/// Exponential backoff for the query layer sitting above the client.
///
/// The client never retries on its own; collaborators opt in through
/// [`run_with_retry`] or by consulting `should_retry` themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// `attempt` is zero-based: the number of attempts already made minus one
    pub fn should_retry(&self, failure: &ApiFailure, attempt: u32) -> bool {
        failure.is_transient() && attempt + 1 < self.max_attempts
    }

    /// Delay before attempt `attempt + 1`: `base * 2^attempt`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `call` until it succeeds, fails permanently, or attempts run out
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut attempt = 0;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(failure) if policy.should_retry(&failure, attempt) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    status = failure.status,
                    attempt = attempt + 1,
                    "Retrying in {:?}: {}",
                    delay,
                    failure.message
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(failure) => return Err(failure),
        }
    }
}

/// Ordered tuple of semantic identifiers the query cache keys results by,
/// e.g. `["courses", "acme", "week=42"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self(vec![resource.into()])
    }

    /// Key for a resource scoped to one tenant
    pub fn scoped(resource: impl Into<String>, tenant: &TenantContext) -> Self {
        Self::new(resource).with(tenant.slug())
    }

    pub fn with(mut self, part: impl Into<String>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Whether `self` is `prefix` or nested under it, for bulk invalidation
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn test_client_errors_not_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&ApiFailure::from_status(404), 0));
        assert!(policy.should_retry(&ApiFailure::from_status(503), 0));
        assert!(policy.should_retry(&ApiFailure::transport("refused"), 1));
        assert!(!policy.should_retry(&ApiFailure::from_status(503), 2));
    }

    #[tokio::test]
    async fn test_run_with_retry_recovers_from_server_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = run_with_retry(&fast_policy(3), move || async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(ApiFailure::from_status(503)),
                _ => Ok("booked"),
            }
        })
        .await;

        assert_eq!(result, Ok("booked"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_with_retry_stops_on_client_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: ApiResult<()> = run_with_retry(&fast_policy(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ApiFailure::from_status(403))
        })
        .await;

        assert_eq!(result.unwrap_err().status, 403);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_with_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: ApiResult<()> = run_with_retry(&fast_policy(3), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ApiFailure::transport("connection refused"))
        })
        .await;

        assert!(result.unwrap_err().is_transport());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_query_key_scoping() {
        let acme = TenantContext::new("acme").unwrap();
        let key = QueryKey::scoped("courses", &acme).with("week=42");

        assert_eq!(key.to_string(), "courses/acme/week=42");
        assert!(key.starts_with(&QueryKey::scoped("courses", &acme)));

        let zen = TenantContext::new("zen").unwrap();
        assert!(!key.starts_with(&QueryKey::scoped("courses", &zen)));
    }
}
