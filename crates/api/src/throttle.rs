//! Per-identity request pacing and short-lived credential caching.
//!
//! Both structures are owned by the client that uses them and keyed by an
//! identity string (wallet address, gateway URL, ...). Each key has its own
//! async lock, so work for one identity never blocks another.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lending_sdk_chain::SdkError;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default safety margin before a credential's stated expiry.
const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(5);

/// Short-lived access credential issued by a provider handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Instant,
    /// Requests-per-second ceiling declared by the provider
    pub requests_per_second: Option<u32>,
}

impl Credential {
    pub fn new(token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Instant::now() + ttl,
            requests_per_second: None,
        }
    }

    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.requests_per_second = Some(requests_per_second);
        self
    }

    /// Still usable for at least `skew`.
    pub fn is_fresh(&self, now: Instant, skew: Duration) -> bool {
        now + skew < self.expires_at
    }
}

type CredentialSlot = Arc<Mutex<Option<Credential>>>;

/// Credential cache with single-flight refresh per identity.
#[derive(Debug)]
pub struct CredentialCache {
    entries: DashMap<String, CredentialSlot>,
    skew: Duration,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            skew: DEFAULT_EXPIRY_SKEW,
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    fn slot(&self, identity: &str) -> CredentialSlot {
        Arc::clone(self.entries.entry(identity.to_owned()).or_default().value())
    }

    /// Return a fresh credential for `identity`, calling `fetch` at most once
    /// across concurrent callers when none is cached or it has expired.
    pub async fn ensure_credential<F, Fut>(
        &self,
        identity: &str,
        fetch: F,
    ) -> Result<Credential, SdkError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Credential, SdkError>>,
    {
        let slot = self.slot(identity);
        let mut cached = slot.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh(Instant::now(), self.skew) {
                return Ok(credential.clone());
            }
            debug!(identity, "Credential expired, refreshing");
        }

        let credential = fetch().await?;
        *cached = Some(credential.clone());
        debug!(identity, "Credential cached");
        Ok(credential)
    }

    /// Drop the credential for `identity` (e.g. after the provider rejected it).
    pub async fn invalidate(&self, identity: &str) {
        let slot = self.entries.get(identity).map(|e| Arc::clone(e.value()));
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sliding window of request timestamps for one identity.
#[derive(Debug)]
pub struct RequestWindow {
    limit: u32,
    window: Duration,
    stamps: VecDeque<Instant>,
}

impl RequestWindow {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            stamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.stamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// When the next request may go out, or `None` if it can go now.
    fn next_slot(&mut self, now: Instant) -> Option<Instant> {
        self.prune(now);
        if (self.stamps.len() as u32) < self.limit {
            return None;
        }
        self.stamps.front().map(|oldest| *oldest + self.window)
    }
}

/// Sliding-window rate limiter keyed by identity.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Arc<Mutex<RequestWindow>>>,
    default_limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(default_limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            default_limit: default_limit.max(1),
            window,
        }
    }

    pub fn per_second(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    fn window_for(&self, identity: &str) -> Arc<Mutex<RequestWindow>> {
        Arc::clone(
            self.windows
                .entry(identity.to_owned())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(RequestWindow::new(self.default_limit, self.window)))
                })
                .value(),
        )
    }

    /// Override the ceiling for one identity (e.g. a provider-declared rate).
    pub async fn set_limit(&self, identity: &str, limit: u32) {
        let window = self.window_for(identity);
        window.lock().await.limit = limit.max(1);
        debug!(identity, limit, "Rate limit updated");
    }

    /// Wait until a request for `identity` fits in the window, record it, and
    /// return how long the caller was held back.
    pub async fn throttle(&self, identity: &str) -> Duration {
        let window = self.window_for(identity);
        // held across the sleep so callers for the same identity queue in order
        let mut window = window.lock().await;
        let start = Instant::now();

        while let Some(until) = window.next_slot(Instant::now()) {
            let wait = until.saturating_duration_since(Instant::now());
            debug!(identity, wait_ms = wait.as_millis() as u64, "Throttling request");
            tokio::time::sleep_until(until).await;
        }

        window.stamps.push_back(Instant::now());
        start.elapsed()
    }

    pub fn clear(&self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_fetch() {
        let cache = CredentialCache::new();
        let fetches = AtomicU32::new(0);

        let calls = (0..5).map(|_| {
            cache.ensure_credential("0xabc", || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Credential::new("token-1", Duration::from_secs(60)))
            })
        });
        let results = join_all(calls).await;

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().token, "token-1");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_credential_refetched() {
        let cache = CredentialCache::new().with_skew(Duration::from_secs(1));
        let fetches = AtomicU32::new(0);
        let fetch = || async {
            let n = fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Credential::new(format!("token-{n}"), Duration::from_secs(10)))
        };

        assert_eq!(cache.ensure_credential("id", fetch).await.unwrap().token, "token-0");

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.ensure_credential("id", fetch).await.unwrap().token, "token-0");

        // inside the skew margin
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(cache.ensure_credential("id", fetch).await.unwrap().token, "token-1");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_not_cached() {
        let cache = CredentialCache::new();

        let err = cache
            .ensure_credential("id", || async {
                Err::<Credential, _>(SdkError::request("handshake refused"))
            })
            .await;
        assert!(err.is_err());

        let ok = cache
            .ensure_credential("id", || async {
                Ok(Credential::new("fresh", Duration::from_secs(60)))
            })
            .await
            .unwrap();
        assert_eq!(ok.token, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_and_clear() {
        let cache = CredentialCache::new();
        let fetches = AtomicU32::new(0);
        let fetch = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Credential::new("t", Duration::from_secs(60)))
        };

        cache.ensure_credential("a", fetch).await.unwrap();
        cache.ensure_credential("b", fetch).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate("a").await;
        cache.ensure_credential("a", fetch).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 3);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_waits_for_window() {
        let limiter = RateLimiter::per_second(3);

        for _ in 0..3 {
            assert_eq!(limiter.throttle("wallet").await, Duration::ZERO);
        }

        let waited = limiter.throttle("wallet").await;
        assert!(waited >= Duration::from_millis(999), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(1_010), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_per_two_second_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(2));

        assert_eq!(limiter.throttle("wallet").await, Duration::ZERO);
        let waited = limiter.throttle("wallet").await;
        assert!(waited >= Duration::from_millis(1_999), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(2_010), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identities_are_independent() {
        let limiter = RateLimiter::per_second(1);

        assert_eq!(limiter.throttle("a").await, Duration::ZERO);
        assert_eq!(limiter.throttle("b").await, Duration::ZERO);
        assert!(limiter.throttle("a").await >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_limit_raises_ceiling() {
        let limiter = RateLimiter::per_second(1);
        limiter.set_limit("fast", 5).await;

        for _ in 0..5 {
            assert_eq!(limiter.throttle("fast").await, Duration::ZERO);
        }
        assert!(limiter.throttle("fast").await > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::per_second(2);

        limiter.throttle("id").await;
        tokio::time::advance(Duration::from_millis(600)).await;
        limiter.throttle("id").await;

        // first stamp leaves the window 400ms later
        let waited = limiter.throttle("id").await;
        assert!(waited >= Duration::from_millis(399), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(410), "waited {:?}", waited);
    }
}
