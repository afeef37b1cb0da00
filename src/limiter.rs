// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window rate limiter for letter submissions.
//!
//! Each client (by IP) may submit `max_submissions` letters in any trailing
//! window of `window_secs`. Counters live in a [`CounterStore`]: Redis in
//! production, process memory for single-instance deployments.
//!
//! The limiter fails open. When no store is configured the decision is
//! [`LimiterMode::Disabled`]; when the store errors or times out it is
//! [`LimiterMode::Degraded`]. Both admit the request but are reported
//! separately so an outage is not mistaken for a dev setup.

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Client identity used when no forwarding header is present.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Counter store error types.
#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Counter store returned malformed reply: {0}")]
    Malformed(String),
}

/// State of one key's window after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Whether this hit was admitted (and recorded)
    pub allowed: bool,
    /// Hits in the window, including this one if admitted
    pub count: u32,
    /// Epoch milliseconds at which the oldest hit leaves the window
    pub reset_at_ms: i64,
}

/// Durable counter backing the limiter.
///
/// `hit` must be atomic per key: check the window, record the hit if under
/// `limit`, and report the resulting count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowCount, CounterStoreError>;

    /// Drop idle keys (no-op for stores with native expiry).
    async fn cleanup(&self, _now_ms: i64, _window: Duration) {}
}

/// How a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterMode {
    /// Counted against a live store
    Enforcing,
    /// No store configured; admitted without counting
    Disabled,
    /// Store failed or timed out; admitted without counting
    Degraded,
}

impl LimiterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enforcing => "enforcing",
            Self::Disabled => "disabled",
            Self::Degraded => "degraded",
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the window frees a slot
    pub reset_ms: i64,
    pub mode: LimiterMode,
}

impl RateLimitDecision {
    /// Seconds until the window frees a slot, at least 1.
    pub fn retry_after(&self, now_ms: i64) -> Duration {
        let millis = (self.reset_ms - now_ms).max(0) as u64;
        Duration::from_secs(millis.div_ceil(1000).max(1))
    }

    fn open(limit: u32, now_ms: i64, mode: LimiterMode) -> Self {
        Self {
            success: true,
            limit,
            remaining: limit,
            reset_ms: now_ms,
            mode,
        }
    }
}

/// Submission rate limiter.
pub struct RateLimiter {
    /// Configuration
    config: RateLimitConfig,
    /// Counter backend, `None` when rate limiting is off
    store: Option<Arc<dyn CounterStore>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration and store.
    pub fn new(
        config: RateLimitConfig,
        store: Option<Arc<dyn CounterStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Check and consume one submission for a client.
    pub async fn check(&self, client_id: &str) -> RateLimitDecision {
        let limit = self.config.max_submissions;
        let now_ms = self.clock.now_ms();

        let Some(store) = &self.store else {
            debug!(client = %client_id, "Rate limiting disabled, admitting");
            return RateLimitDecision::open(limit, now_ms, LimiterMode::Disabled);
        };

        let key = format!("{}:{}", self.config.key_prefix, client_id);
        let window = self.config.window_duration();
        let hit = tokio::time::timeout(
            self.config.store_timeout(),
            store.hit(&key, limit, window, now_ms),
        )
        .await;

        match hit {
            Ok(Ok(count)) => {
                let decision = RateLimitDecision {
                    success: count.allowed,
                    limit,
                    remaining: limit.saturating_sub(count.count),
                    reset_ms: count.reset_at_ms,
                    mode: LimiterMode::Enforcing,
                };
                if !decision.success {
                    debug!(client = %client_id, reset_ms = decision.reset_ms, "Client over quota");
                }
                decision
            }
            Ok(Err(e)) => {
                warn!(client = %client_id, error = %e, "Counter store failed, admitting");
                RateLimitDecision::open(limit, now_ms, LimiterMode::Degraded)
            }
            Err(_) => {
                warn!(
                    client = %client_id,
                    timeout_ms = self.config.store_timeout_ms,
                    "Counter store timed out, admitting"
                );
                RateLimitDecision::open(limit, now_ms, LimiterMode::Degraded)
            }
        }
    }

    /// Clean up idle counters (should be called periodically).
    pub async fn cleanup(&self) {
        if let Some(store) = &self.store {
            store
                .cleanup(self.clock.now_ms(), self.config.window_duration())
                .await;
        }
    }
}

/// Extract the client identity from proxy headers.
///
/// First address in `X-Forwarded-For`, else `X-Real-IP`, else
/// [`ANONYMOUS_CLIENT`].
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }

    ANONYMOUS_CLIENT.to_string()
}

/// Sliding-window log held in process memory.
#[derive(Default)]
pub struct MemoryCounterStore {
    /// Admitted hit timestamps per key, oldest first
    windows: RwLock<HashMap<String, VecDeque<i64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked.
    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.windows.read().await.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowCount, CounterStoreError> {
        let window_ms = window.as_millis() as i64;
        let mut windows = self.windows.write().await;
        let hits = windows.entry(key.to_string()).or_default();

        while hits.front().is_some_and(|&t| t <= now_ms - window_ms) {
            hits.pop_front();
        }

        let allowed = (hits.len() as u32) < limit;
        if allowed {
            hits.push_back(now_ms);
        }

        let reset_at_ms = hits.front().map_or(now_ms + window_ms, |&t| t + window_ms);

        Ok(WindowCount {
            allowed,
            count: hits.len() as u32,
            reset_at_ms,
        })
    }

    async fn cleanup(&self, now_ms: i64, window: Duration) {
        let window_ms = window.as_millis() as i64;
        let mut windows = self.windows.write().await;
        windows.retain(|_, hits| hits.back().is_some_and(|&t| t > now_ms - window_ms));
    }
}

/// Sliding-window log in a Redis sorted set, evaluated atomically in Lua.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
  redis.call('ZADD', key, now, member)
  count = count + 1
  allowed = 1
end
redis.call('PEXPIRE', key, window)

local reset = now + window
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
  reset = tonumber(oldest[2]) + window
end
return {allowed, count, reset}
"#;

/// Redis implementation of [`CounterStore`].
///
/// The connection is established on first use, so an unreachable Redis
/// surfaces as store errors (degraded mode) instead of a startup failure.
pub struct RedisCounterStore {
    client: redis::Client,
    connection: tokio::sync::OnceCell<redis::aio::ConnectionManager>,
    script: redis::Script,
}

impl RedisCounterStore {
    /// Create a store for the Redis at `url` without connecting.
    pub fn open(url: &str) -> Result<Self, CounterStoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            connection: tokio::sync::OnceCell::new(),
            script: redis::Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }

    /// Establish the connection now and check it answers.
    pub async fn ping(&self) -> Result<(), CounterStoreError> {
        let mut conn = self.connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn connection(&self) -> Result<redis::aio::ConnectionManager, CounterStoreError> {
        let conn = self
            .connection
            .get_or_try_init(|| redis::aio::ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowCount, CounterStoreError> {
        let mut conn = self.connection().await?;
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4());

        let reply: Vec<i64> = self
            .script
            .key(key)
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        match reply.as_slice() {
            [allowed, count, reset] => Ok(WindowCount {
                allowed: *allowed == 1,
                count: (*count).max(0) as u32,
                reset_at_ms: *reset,
            }),
            other => Err(CounterStoreError::Malformed(format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn config(max: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_submissions: max,
            window_secs: 3600,
            ..Default::default()
        }
    }

    fn limiter(max: u32, clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(config(max), Some(Arc::new(MemoryCounterStore::new())), clock)
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn hit(
            &self,
            _key: &str,
            _limit: u32,
            _window: Duration,
            _now_ms: i64,
        ) -> Result<WindowCount, CounterStoreError> {
            Err(CounterStoreError::Malformed("down".to_string()))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl CounterStore for SlowStore {
        async fn hit(
            &self,
            _key: &str,
            _limit: u32,
            _window: Duration,
            _now_ms: i64,
        ) -> Result<WindowCount, CounterStoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(CounterStoreError::Malformed("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_remaining_decreases_then_limits() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = limiter(5, clock.clone());

        let mut previous = u32::MAX;
        for _ in 0..5 {
            let decision = limiter.check("203.0.113.7").await;
            assert!(decision.success);
            assert_eq!(decision.mode, LimiterMode::Enforcing);
            assert!(decision.remaining < previous);
            previous = decision.remaining;
            clock.advance(chrono::Duration::seconds(1));
        }
        assert_eq!(previous, 0);

        let decision = limiter.check("203.0.113.7").await;
        assert!(!decision.success);
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset_ms > clock.now_ms());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = limiter(2, clock.clone());

        assert!(limiter.check("a").await.success);
        clock.advance(chrono::Duration::minutes(30));
        assert!(limiter.check("a").await.success);
        assert!(!limiter.check("a").await.success);

        // First hit leaves the window; one slot frees up, not two
        clock.advance(chrono::Duration::minutes(31));
        assert!(limiter.check("a").await.success);
        assert!(!limiter.check("a").await.success);
    }

    #[tokio::test]
    async fn test_reset_tracks_oldest_hit() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let limiter = limiter(1, clock.clone());

        limiter.check("a").await;
        clock.advance(chrono::Duration::minutes(10));
        let decision = limiter.check("a").await;
        assert!(!decision.success);
        assert_eq!(decision.reset_ms, (start + chrono::Duration::hours(1)).timestamp_millis());
        assert_eq!(
            decision.retry_after(clock.now_ms()),
            Duration::from_secs(50 * 60)
        );
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = limiter(1, clock);

        assert!(limiter.check("10.0.0.1").await.success);
        assert!(!limiter.check("10.0.0.1").await.success);
        assert!(limiter.check("10.0.0.2").await.success);
    }

    #[tokio::test]
    async fn test_disabled_always_admits() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = RateLimiter::new(config(5), None, clock);

        for _ in 0..20 {
            let decision = limiter.check("a").await;
            assert!(decision.success);
            assert_eq!(decision.remaining, 5);
            assert_eq!(decision.mode, LimiterMode::Disabled);
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_degraded_not_disabled() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = RateLimiter::new(config(5), Some(Arc::new(FailingStore)), clock);

        let decision = limiter.check("a").await;
        assert!(decision.success);
        assert_eq!(decision.mode, LimiterMode::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_fails_open() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = RateLimiter::new(config(5), Some(Arc::new(SlowStore)), clock);

        let decision = limiter.check("a").await;
        assert!(decision.success);
        assert_eq!(decision.mode, LimiterMode::Degraded);
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_keys() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);
        store.hit("old", 5, window, 0).await.unwrap();
        store.hit("fresh", 5, window, 50_000).await.unwrap();

        store.cleanup(90_000, window).await;
        assert_eq!(store.len().await, 1);
        assert!(store.windows.read().await.contains_key("fresh"));
    }

    #[test]
    fn test_redis_store_opens_lazily() {
        assert!(RedisCounterStore::open("redis://127.0.0.1:6379").is_ok());
        assert!(RedisCounterStore::open("not a redis url").is_err());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = RateLimitDecision {
            success: false,
            limit: 5,
            remaining: 0,
            reset_ms: 10_001,
            mode: LimiterMode::Enforcing,
        };
        assert_eq!(decision.retry_after(0), Duration::from_secs(11));
        assert_eq!(decision.retry_after(20_000), Duration::from_secs(1));
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), ANONYMOUS_CLIENT);

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers), "198.51.100.4");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.9");
    }
}
