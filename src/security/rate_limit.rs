//! Per-IP rate limiting.
//!
//! Two window strategies share one counter store:
//!
//! - `fixed`: one key per IP, anchored at that IP's first request. The key
//!   is given a lifetime of one window when it is created, so the count
//!   resets exactly one window later and idle IPs drop out of the store.
//! - `sliding`: epoch-aligned windows with one key per IP and window. The
//!   previous window's count is weighted by how much of it still overlaps
//!   the trailing window. Keys live for two windows.
//!
//! Store failures and timeouts go to the configured [`FailurePolicy`].

use futures_util::future::{BoxFuture, FutureExt};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{FailurePolicy, RateLimitConfig, WindowStrategy};
use crate::observability::metrics;
use crate::resilience::timeouts::bounded;
use crate::security::store::{CounterStore, StoreError};
use crate::security::{Guard, GuardDecision, GuardedRequest, RateRejection, Rejection};

/// Retry hint sent when the store is down and the policy is fail-closed.
const UNAVAILABLE_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Within capacity.
    Allowed {
        /// Requests left before the limit is hit
        remaining: u64,
        /// Time until the counter resets
        reset_after: Duration,
    },
    /// Over capacity.
    Limited { retry_after: Duration },
    /// Store failed; admitted under fail-open.
    Bypassed,
    /// Store failed; refused under fail-closed.
    Unavailable,
}

/// Thread-safe per-IP rate limiter over a [`CounterStore`].
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    capacity: u64,
    window: Duration,
    strategy: WindowStrategy,
    policy: FailurePolicy,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            capacity: config.capacity,
            window: config.window(),
            strategy: config.strategy,
            policy: config.failure_policy,
            store_timeout: config.store_timeout(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Count one request from `ip` at `now` and decide whether it may proceed.
    pub async fn admit(&self, ip: IpAddr, now: SystemTime) -> Admission {
        let result = match self.strategy {
            WindowStrategy::Fixed => self.admit_fixed(ip, now).await,
            WindowStrategy::Sliding => self.admit_sliding(ip, now).await,
        };

        match result {
            Ok(admission) => admission,
            Err(e) => {
                metrics::record_store_error(self.policy);
                match self.policy {
                    FailurePolicy::FailOpen => {
                        tracing::warn!(%ip, error = %e, "Rate limit store failed, admitting (fail-open)");
                        Admission::Bypassed
                    }
                    FailurePolicy::FailClosed => {
                        tracing::error!(%ip, error = %e, "Rate limit store failed, rejecting (fail-closed)");
                        Admission::Unavailable
                    }
                }
            }
        }
    }

    async fn admit_fixed(&self, ip: IpAddr, now: SystemTime) -> Result<Admission, StoreError> {
        let key = format!("rl:{ip}");
        let counter = bounded(self.store_timeout, self.store.increment(&key, now)).await?;

        let expires_at = match counter.expires_at {
            Some(at) => at,
            None => {
                // Any request that finds the key without a lifetime sets one,
                // so a failed `expire` on the first request cannot pin the count.
                bounded(self.store_timeout, self.store.expire(&key, self.window, now)).await?;
                now.checked_add(self.window)
                    .ok_or(StoreError::OutOfRange(self.window))?
            }
        };
        let reset_after = expires_at.duration_since(now).unwrap_or_default();

        if counter.count <= self.capacity {
            Ok(Admission::Allowed {
                remaining: self.capacity - counter.count,
                reset_after,
            })
        } else {
            tracing::debug!(%ip, count = counter.count, ?reset_after, "IP rate limit exceeded");
            Ok(Admission::Limited {
                retry_after: reset_after,
            })
        }
    }

    async fn admit_sliding(&self, ip: IpAddr, now: SystemTime) -> Result<Admission, StoreError> {
        let window_ms = self.window.as_millis().max(1);
        let now_ms = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        let index = now_ms / window_ms;
        let elapsed_ms = now_ms % window_ms;

        let current_key = format!("rl:{ip}:{index}");
        let previous_key = format!("rl:{ip}:{}", index.saturating_sub(1));

        let current = bounded(self.store_timeout, self.store.increment(&current_key, now)).await?;
        if current.expires_at.is_none() {
            let ttl = self
                .window
                .checked_mul(2)
                .ok_or(StoreError::OutOfRange(self.window))?;
            bounded(self.store_timeout, self.store.expire(&current_key, ttl, now)).await?;
        }
        let previous = bounded(self.store_timeout, self.store.get(&previous_key, now))
            .await?
            .map_or(0, |c| c.count);

        let overlap = 1.0 - elapsed_ms as f64 / window_ms as f64;
        let estimate = previous as f64 * overlap + current.count as f64;
        let until_next = Duration::from_millis((window_ms - elapsed_ms) as u64);

        if estimate <= self.capacity as f64 {
            Ok(Admission::Allowed {
                remaining: (self.capacity as f64 - estimate).floor() as u64,
                reset_after: until_next,
            })
        } else {
            tracing::debug!(%ip, previous, current = current.count, estimate, "IP rate limit exceeded");
            Ok(Admission::Limited {
                retry_after: until_next,
            })
        }
    }
}

/// Guard adapter for [`RateLimiter`].
pub struct RateLimitGuard {
    limiter: RateLimiter,
}

impl RateLimitGuard {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl Guard for RateLimitGuard {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn evaluate<'a>(&'a self, request: &'a mut GuardedRequest) -> BoxFuture<'a, GuardDecision> {
        async move {
            let metadata = request.metadata();
            match self.limiter.admit(metadata.source_ip, metadata.received_at).await {
                Admission::Allowed { .. } | Admission::Bypassed => GuardDecision::Allow,
                Admission::Limited { retry_after } => {
                    GuardDecision::Reject(Rejection::Rate(RateRejection::Exceeded {
                        limit: self.limiter.capacity(),
                        retry_after,
                    }))
                }
                Admission::Unavailable => {
                    GuardDecision::Reject(Rejection::Rate(RateRejection::StoreUnavailable {
                        retry_after: UNAVAILABLE_RETRY_AFTER,
                    }))
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::store::{Counter, MemoryStore};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A whole number of minutes since the epoch, so windows line up.
    fn at_ms(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(28_333_333 * 60) + Duration::from_millis(ms)
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
    }

    fn limiter(strategy: WindowStrategy) -> RateLimiter {
        let mut config = RateLimitConfig::with_window(60);
        config.strategy = strategy;
        RateLimiter::new(Arc::new(MemoryStore::new()), &config)
    }

    struct FailingStore;

    impl CounterStore for FailingStore {
        fn get<'a>(
            &'a self,
            _key: &'a str,
            _now: SystemTime,
        ) -> BoxFuture<'a, Result<Option<Counter>, StoreError>> {
            async { Err(StoreError::Unavailable("connection refused".into())) }.boxed()
        }

        fn increment<'a>(
            &'a self,
            _key: &'a str,
            _now: SystemTime,
        ) -> BoxFuture<'a, Result<Counter, StoreError>> {
            async { Err(StoreError::Unavailable("connection refused".into())) }.boxed()
        }

        fn expire<'a>(
            &'a self,
            _key: &'a str,
            _ttl: Duration,
            _now: SystemTime,
        ) -> BoxFuture<'a, Result<bool, StoreError>> {
            async { Err(StoreError::Unavailable("connection refused".into())) }.boxed()
        }
    }

    struct StalledStore;

    impl CounterStore for StalledStore {
        fn get<'a>(
            &'a self,
            _key: &'a str,
            _now: SystemTime,
        ) -> BoxFuture<'a, Result<Option<Counter>, StoreError>> {
            futures_util::future::pending().boxed()
        }

        fn increment<'a>(
            &'a self,
            _key: &'a str,
            _now: SystemTime,
        ) -> BoxFuture<'a, Result<Counter, StoreError>> {
            futures_util::future::pending().boxed()
        }

        fn expire<'a>(
            &'a self,
            _key: &'a str,
            _ttl: Duration,
            _now: SystemTime,
        ) -> BoxFuture<'a, Result<bool, StoreError>> {
            futures_util::future::pending().boxed()
        }
    }

    /// Memory store whose first `expire` call fails.
    struct ExpireBlipStore {
        inner: MemoryStore,
        failed: AtomicBool,
    }

    impl ExpireBlipStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failed: AtomicBool::new(false),
            }
        }
    }

    impl CounterStore for ExpireBlipStore {
        fn get<'a>(
            &'a self,
            key: &'a str,
            now: SystemTime,
        ) -> BoxFuture<'a, Result<Option<Counter>, StoreError>> {
            self.inner.get(key, now)
        }

        fn increment<'a>(
            &'a self,
            key: &'a str,
            now: SystemTime,
        ) -> BoxFuture<'a, Result<Counter, StoreError>> {
            self.inner.increment(key, now)
        }

        fn expire<'a>(
            &'a self,
            key: &'a str,
            ttl: Duration,
            now: SystemTime,
        ) -> BoxFuture<'a, Result<bool, StoreError>> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return async { Err(StoreError::Unavailable("connection reset".into())) }.boxed();
            }
            self.inner.expire(key, ttl, now)
        }

        fn purge_expired(&self, now: SystemTime) -> usize {
            self.inner.purge_expired(now)
        }
    }

    async fn run_scenario(limiter: &RateLimiter, start_ms: u64) -> Vec<bool> {
        let mut admitted = Vec::new();
        for i in 0..15 {
            let now = at_ms(start_ms + i * 500);
            admitted.push(matches!(
                limiter.admit(ip(1), now).await,
                Admission::Allowed { .. }
            ));
        }
        admitted
    }

    #[tokio::test]
    async fn test_fifteen_requests_half_second_apart() {
        let limiter = limiter(WindowStrategy::Fixed);
        let admitted = run_scenario(&limiter, 0).await;
        assert_eq!(admitted, [vec![true; 10], vec![false; 5]].concat());
    }

    #[tokio::test]
    async fn test_boundary_request_admitted() {
        let limiter = limiter(WindowStrategy::Fixed);
        for n in 1..=10u64 {
            match limiter.admit(ip(1), at_ms(0)).await {
                Admission::Allowed { remaining, reset_after } => {
                    assert_eq!(remaining, 10 - n);
                    assert_eq!(reset_after, Duration::from_secs(60));
                }
                other => panic!("request {n} should pass, got {other:?}"),
            }
        }
        assert_eq!(
            limiter.admit(ip(1), at_ms(15_000)).await,
            Admission::Limited {
                retry_after: Duration::from_secs(45)
            }
        );
    }

    #[tokio::test]
    async fn test_fixed_window_resets() {
        let limiter = limiter(WindowStrategy::Fixed);
        for _ in 0..11 {
            limiter.admit(ip(1), at_ms(1_000)).await;
        }
        assert!(matches!(
            limiter.admit(ip(1), at_ms(60_999)).await,
            Admission::Limited { .. }
        ));
        assert!(matches!(
            limiter.admit(ip(1), at_ms(61_000)).await,
            Admission::Allowed { remaining: 9, .. }
        ));
    }

    #[tokio::test]
    async fn test_ips_do_not_share_budget() {
        let limiter = limiter(WindowStrategy::Fixed);
        for _ in 0..10 {
            limiter.admit(ip(1), at_ms(0)).await;
        }
        assert!(matches!(limiter.admit(ip(1), at_ms(0)).await, Admission::Limited { .. }));
        assert!(matches!(
            limiter.admit(ip(2), at_ms(0)).await,
            Admission::Allowed { remaining: 9, .. }
        ));
    }

    #[tokio::test]
    async fn test_sliding_scenario_across_boundary() {
        // Starts 3 s before a window boundary, so the run straddles two windows.
        let limiter = limiter(WindowStrategy::Sliding);
        let admitted = run_scenario(&limiter, 57_000).await;
        assert_eq!(admitted, [vec![true; 10], vec![false; 5]].concat());
    }

    #[tokio::test]
    async fn test_sliding_window_weights_previous() {
        let limiter = limiter(WindowStrategy::Sliding);
        for _ in 0..10 {
            limiter.admit(ip(1), at_ms(30_000)).await;
        }
        // Halfway into the next window half of the old traffic still counts.
        for _ in 0..5 {
            assert!(matches!(
                limiter.admit(ip(1), at_ms(90_000)).await,
                Admission::Allowed { .. }
            ));
        }
        assert!(matches!(
            limiter.admit(ip(1), at_ms(90_000)).await,
            Admission::Limited { retry_after } if retry_after == Duration::from_secs(30)
        ));
        // Two windows later nothing old remains.
        assert!(matches!(
            limiter.admit(ip(1), at_ms(180_000)).await,
            Admission::Allowed { remaining: 9, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_expire_is_repaired_by_next_request() {
        let store = Arc::new(ExpireBlipStore::new());
        let limiter = RateLimiter::new(store.clone(), &RateLimitConfig::with_window(60));

        assert_eq!(limiter.admit(ip(1), at_ms(0)).await, Admission::Unavailable);
        for _ in 0..11 {
            limiter.admit(ip(1), at_ms(0)).await;
        }
        assert!(matches!(limiter.admit(ip(1), at_ms(0)).await, Admission::Limited { .. }));

        // The key got its lifetime on the second request, so it lapses.
        let day_later = at_ms(86_400_000);
        assert_eq!(store.purge_expired(day_later), 1);
        assert!(matches!(
            limiter.admit(ip(1), day_later).await,
            Admission::Allowed { remaining: 9, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_expire_is_repaired_sliding() {
        let store = Arc::new(ExpireBlipStore::new());
        let mut config = RateLimitConfig::with_window(60);
        config.strategy = WindowStrategy::Sliding;
        let limiter = RateLimiter::new(store.clone(), &config);

        assert_eq!(limiter.admit(ip(1), at_ms(0)).await, Admission::Unavailable);
        assert!(matches!(limiter.admit(ip(1), at_ms(0)).await, Admission::Allowed { .. }));
        assert_eq!(store.purge_expired(at_ms(120_000)), 1);
    }

    #[tokio::test]
    async fn test_huge_window_does_not_panic() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryStore::new()),
            &RateLimitConfig::with_window(u64::MAX),
        );
        assert_eq!(limiter.admit(ip(1), at_ms(0)).await, Admission::Unavailable);

        let mut config = RateLimitConfig::with_window(u64::MAX);
        config.strategy = WindowStrategy::Sliding;
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), &config);
        assert_eq!(limiter.admit(ip(1), at_ms(0)).await, Admission::Unavailable);
    }

    #[tokio::test]
    async fn test_fail_closed_rejects() {
        let config = RateLimitConfig::with_window(60);
        let limiter = RateLimiter::new(Arc::new(FailingStore), &config);
        assert_eq!(limiter.admit(ip(1), at_ms(0)).await, Admission::Unavailable);
    }

    #[tokio::test]
    async fn test_fail_open_admits() {
        let mut config = RateLimitConfig::with_window(60);
        config.failure_policy = FailurePolicy::FailOpen;
        let limiter = RateLimiter::new(Arc::new(FailingStore), &config);
        assert_eq!(limiter.admit(ip(1), at_ms(0)).await, Admission::Bypassed);
    }

    #[tokio::test]
    async fn test_stalled_store_hits_policy() {
        let mut config = RateLimitConfig::with_window(60);
        config.store_timeout_ms = 20;
        config.strategy = WindowStrategy::Sliding;
        let limiter = RateLimiter::new(Arc::new(StalledStore), &config);
        assert_eq!(limiter.admit(ip(1), at_ms(0)).await, Admission::Unavailable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_capacity() {
        let limiter = Arc::new(limiter(WindowStrategy::Fixed));
        let mut handles = Vec::new();
        for _ in 0..64 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.admit(ip(7), at_ms(0)).await
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), Admission::Allowed { .. }) {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[tokio::test]
    async fn test_guard_maps_admissions() {
        use crate::security::RequestMetadata;
        use axum::body::Body;
        use axum::http::HeaderMap;

        let mut config = RateLimitConfig::with_window(60);
        config.capacity = 1;
        let guard = RateLimitGuard::new(RateLimiter::new(Arc::new(MemoryStore::new()), &config));
        let request = || {
            let metadata = RequestMetadata::from_headers(&HeaderMap::new(), ip(9), at_ms(0));
            GuardedRequest::new(metadata, Body::empty())
        };

        assert_eq!(guard.evaluate(&mut request()).await, GuardDecision::Allow);
        assert_eq!(
            guard.evaluate(&mut request()).await,
            GuardDecision::Reject(Rejection::Rate(RateRejection::Exceeded {
                limit: 1,
                retry_after: Duration::from_secs(60),
            }))
        );
    }
}
