//! Bounded exponential backoff.
//!
//! `delay(a) = min(max_delay, base_delay * multiplier^a)`, no jitter. The
//! policy is read after every failed attempt, so an
//! [`SharedRetryPolicy::update`] decides the retry budget and delay of calls
//! already in flight from their next failure on.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classify::{classify, default_retryable_patterns, into_classified};
use crate::error::SdkError;

/// Callback invoked before each backoff sleep with `(attempt, error, delay)`.
/// `attempt` is 1-based: the first retry reports 1.
pub type RetryObserver = Arc<dyn Fn(u32, &SdkError, Duration) + Send + Sync>;

/// Retry configuration (TOML-loadable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Extra transient phrases, appended to the built-in catalogue
    #[serde(default)]
    pub retryable_patterns: Vec<String>,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            retryable_patterns: Vec::new(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.backoff_multiplier <= 1.0 || !self.backoff_multiplier.is_finite() {
            return Err(SdkError::Config(format!(
                "backoff_multiplier must be > 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(SdkError::Config(format!(
                "max_delay_ms ({}) below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }
}

/// Retry policy consulted on every failed attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable_patterns: Vec<String>,
    pub on_retry: Option<RetryObserver>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("retryable_patterns", &self.retryable_patterns.len())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let mut patterns = default_retryable_patterns();
        patterns.extend(config.retryable_patterns.iter().cloned());

        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            retryable_patterns: patterns,
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.backoff_multiplier = backoff_multiplier;
        self
    }

    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    /// Backoff delay after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max_ms = self.max_delay.as_millis() as f64;
        let scaled = self.base_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);

        if !scaled.is_finite() || scaled >= max_ms {
            self.max_delay
        } else {
            Duration::from_millis(scaled as u64)
        }
    }
}

/// Retry policy handle shared between call sites.
#[derive(Debug, Clone, Default)]
pub struct SharedRetryPolicy {
    inner: Arc<RwLock<RetryPolicy>>,
}

impl SharedRetryPolicy {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(policy)),
        }
    }

    /// Current policy values.
    pub fn snapshot(&self) -> RetryPolicy {
        self.inner.read().clone()
    }

    /// Mutate the policy; takes effect from the next attempt onwards.
    pub fn update(&self, f: impl FnOnce(&mut RetryPolicy)) {
        let mut policy = self.inner.write();
        f(&mut policy);
        debug!(?policy, "Retry policy updated");
    }
}

impl From<RetryPolicy> for SharedRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self::new(policy)
    }
}

/// Run `op` until it succeeds, fails non-retryably, or the retry budget is
/// spent. Terminal errors come back classified with their original message.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &SharedRetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, SdkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SdkError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let err = match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let current = policy.snapshot();
        let class = classify(&err, &current.retryable_patterns);

        if !class.is_retryable() {
            warn!(
                operation = label,
                attempt,
                class = ?class,
                error = %err,
                "Non-retryable failure"
            );
            return Err(into_classified(err, class, attempt + 1));
        }

        if attempt >= current.max_retries {
            warn!(
                operation = label,
                attempts = attempt + 1,
                error = %err,
                "Retry budget exhausted"
            );
            return Err(into_classified(err, class, attempt + 1));
        }

        let delay = current.delay_for(attempt);
        warn!(
            operation = label,
            attempt = attempt + 1,
            max_retries = current.max_retries,
            delay_ms = delay.as_millis() as u64,
            class = ?class,
            error = %err,
            "Retrying after transient failure"
        );
        if let Some(observer) = &current.on_retry {
            observer(attempt + 1, &err, delay);
        }

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestFailure;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> SharedRetryPolicy {
        SharedRetryPolicy::new(
            RetryPolicy::default()
                .with_max_retries(max_retries)
                .with_delays(Duration::from_millis(100), Duration::from_millis(1_000)),
        )
    }

    #[test]
    fn test_delay_growth_and_clamp() {
        let policy = RetryPolicy::default()
            .with_delays(Duration::from_millis(100), Duration::from_millis(1_000))
            .with_multiplier(2.0);

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(500), Duration::from_millis(1_000));

        let mut previous = Duration::ZERO;
        for attempt in 0..20 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(RetryConfig::default().validate().is_ok());

        let config = RetryConfig {
            backoff_multiplier: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            base_delay_ms: 5_000,
            max_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_patterns_extend_defaults() {
        let config: RetryConfig = toml::from_str(
            r#"
            max_retries = 5
            retryable_patterns = ["node is syncing"]
            "#,
        )
        .unwrap();
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert!(policy.retryable_patterns.iter().any(|p| p == "node is syncing"));
        assert!(policy.retryable_patterns.iter().any(|p| p == "rate limit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let policy = fast_policy(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&policy, "always_fails", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SdkError::Request(
                RequestFailure::new("service unavailable").with_status(503),
            ))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(SdkError::TransientInfra { attempts, failure }) => {
                assert_eq!(attempts, 4);
                assert_eq!(failure.status, Some(503));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_contract_error_not_retried() {
        let policy = fast_policy(5);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&policy, "reverts", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SdkError::request("execution reverted: BORROW_CAP"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = result.unwrap_err();
        assert!(err.is_contract_rejection());
        assert!(err.to_string().contains("BORROW_CAP"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_error_not_retried() {
        let policy = fast_policy(5);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&policy, "odd", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SdkError::request("something novel"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(SdkError::Unknown(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let policy = fast_policy(3);
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = retry_with_backoff(&policy, "flaky", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(SdkError::request("connection reset by peer"))
            } else {
                Ok(42u64)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_each_retry() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let policy = SharedRetryPolicy::new(
            RetryPolicy::default()
                .with_max_retries(2)
                .with_delays(Duration::from_millis(50), Duration::from_millis(500))
                .with_observer(Arc::new(move |attempt, _err, delay| {
                    sink.lock().push((attempt, delay));
                })),
        );

        let _: Result<(), _> = retry_with_backoff(&policy, "observed", || async {
            Err(SdkError::Request(RequestFailure::new("slow down").with_status(429)))
        })
        .await;

        let seen = seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (1, Duration::from_millis(50)),
                (2, Duration::from_millis(100)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_update_applies_to_next_attempt() {
        let policy = fast_policy(10);
        let handle = policy.clone();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&policy, "shrinking", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                handle.update(|p| p.max_retries = 1);
            }
            async { Err(SdkError::request("timeout")) }
        })
        .await;

        // attempt 0 fails, attempt 1 lowers the budget to 1 and fails: stop
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(SdkError::TransientInfra { attempts: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_raised_budget_extends_call_in_flight() {
        let policy = fast_policy(1);
        let handle = policy.clone();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&policy, "growing", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                handle.update(|p| p.max_retries = 3);
            }
            async { Err(SdkError::request("timeout")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(result, Err(SdkError::TransientInfra { attempts: 4, .. })));
    }
}
