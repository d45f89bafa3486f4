//! Token-bucket rate limiting for `POST /auth/ws-ticket` (§6.2, SPEC_FULL §3.2).
//!
//! Built entirely from `Cache::set_if_absent`, the conditional-set-with-TTL
//! primitive `quiz_cache::Cache` documents as "the only primitive used for
//! rate limiting" (§5, composition primitives). Fail-open on a cache error
//! (§7, "Transient infrastructure ... fail-open on cache unavailability
//! with logging").

use std::time::Duration;

use quiz_cache::{keys, Cache};
use tracing::warn;

/// A fixed `max_per_window` budget per scope (typically a client IP),
/// implemented as `max_per_window` independently-expiring slots. A caller
/// is allowed through as long as any slot is free; once all are claimed,
/// further callers are rejected until the oldest slot's TTL lapses.
pub struct RateLimiter {
    pub max_per_window: u32,
    pub window: Duration,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self { max_per_window, window }
    }

    pub async fn allow(&self, cache: &dyn Cache, scope: &str) -> bool {
        for slot in 0..self.max_per_window {
            let key = format!("{}:{slot}", keys::rate_limit(scope));
            match cache.set_if_absent(&key, self.window).await {
                Ok(true) => return true,
                Ok(false) => continue,
                Err(e) => {
                    warn!(scope, error = %e, "rate limiter cache unavailable, failing open");
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_cache::InMemoryCache;

    #[tokio::test]
    async fn allows_up_to_the_configured_burst_then_blocks() {
        let cache = InMemoryCache::new();
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.allow(&cache, "ip:1.1.1.1").await);
        assert!(limiter.allow(&cache, "ip:1.1.1.1").await);
        assert!(!limiter.allow(&cache, "ip:1.1.1.1").await);
    }

    #[tokio::test]
    async fn different_scopes_are_independent() {
        let cache = InMemoryCache::new();
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.allow(&cache, "ip:1.1.1.1").await);
        assert!(limiter.allow(&cache, "ip:2.2.2.2").await);
    }

    #[tokio::test]
    async fn a_slot_frees_up_after_its_window_expires() {
        let cache = InMemoryCache::new();
        let limiter = RateLimiter::new(1, Duration::from_millis(10));

        assert!(limiter.allow(&cache, "ip:9.9.9.9").await);
        assert!(!limiter.allow(&cache, "ip:9.9.9.9").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.allow(&cache, "ip:9.9.9.9").await);
    }
}
