use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CacheError;

/// Fast shared state: counters, flags, sets, expirations.
///
/// Deliberately narrow: no pub/sub, no arbitrary blob storage. Only the
/// composition primitives §5 names as used anywhere in the core —
/// set-membership, counter-increment, and conditional-set (set-if-absent
/// with TTL) — are exposed, so that every call site's intent is visible at
/// the call site rather than hidden behind a generic get/set API.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Add `member` to the set at `key`. Idempotent.
    async fn set_add(&self, key: &str, member: &str) -> Result<(), CacheError>;

    /// Remove `member` from the set at `key`. No-op if absent.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CacheError>;

    /// Whether `member` is present in the set at `key`.
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    /// Snapshot of all members currently in the set at `key`.
    async fn set_members(&self, key: &str) -> Result<HashSet<String>, CacheError>;

    /// Number of members in the set at `key`.
    async fn set_len(&self, key: &str) -> Result<usize, CacheError>;

    /// Read a boolean flag, defaulting to `false` if unset or expired.
    async fn get_flag(&self, key: &str) -> Result<bool, CacheError>;

    /// Set a boolean flag with an optional TTL.
    async fn set_flag(&self, key: &str, value: bool, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Atomically increment the counter at `key` and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Set `key` to a present marker with `ttl` only if it was previously
    /// absent (or expired). Returns `true` if this call set it (the caller
    /// "won" the race), `false` if it was already present.
    ///
    /// This is the only primitive used for rate limiting (§3.2) and any
    /// future single-writer-by-key coordination; it composes to a token
    /// bucket without the cache needing to know about buckets at all.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;
}

#[derive(Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn fresh(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

/// Process-local in-memory [`Cache`] implementation.
///
/// Backed by a handful of `RwLock<HashMap<..>>` tables, mirroring the
/// teacher's `SharedGraph = Arc<RwLock<GraphStore>>` pattern: one lock per
/// logical table rather than one giant lock, so set operations on the
/// `participants` table never contend with counter increments on the
/// `rl:*` table.
///
/// Production deployments that need cross-process sharing can swap in an
/// alternative `Cache` implementation (e.g. a networked KV store); the
/// rest of the core depends only on the trait.
pub struct InMemoryCache {
    sets: RwLock<HashMap<String, HashSet<String>>>,
    flags: RwLock<HashMap<String, Expiring<bool>>>,
    counters: RwLock<HashMap<String, i64>>,
    markers: RwLock<HashMap<String, Expiring<()>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(HashMap::new()),
            flags: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            markers: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn set_add(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let mut sets = self.sets.write().await;
        sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let mut sets = self.sets.write().await;
        if let Some(set) = sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let sets = self.sets.read().await;
        Ok(sets.get(key).map(|s| s.contains(member)).unwrap_or(false))
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, CacheError> {
        let sets = self.sets.read().await;
        Ok(sets.get(key).cloned().unwrap_or_default())
    }

    async fn set_len(&self, key: &str) -> Result<usize, CacheError> {
        let sets = self.sets.read().await;
        Ok(sets.get(key).map(|s| s.len()).unwrap_or(0))
    }

    async fn get_flag(&self, key: &str) -> Result<bool, CacheError> {
        let flags = self.flags.read().await;
        Ok(flags
            .get(key)
            .filter(|f| f.is_live())
            .map(|f| f.value)
            .unwrap_or(false))
    }

    async fn set_flag(&self, key: &str, value: bool, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut flags = self.flags.write().await;
        flags.insert(key.to_string(), Expiring::fresh(value, ttl));
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut counters = self.counters.write().await;
        let entry = counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut markers = self.markers.write().await;
        if let Some(existing) = markers.get(key) {
            if existing.is_live() {
                return Ok(false);
            }
        }
        markers.insert(key.to_string(), Expiring::fresh((), Some(ttl)));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_operations_roundtrip() {
        let cache = InMemoryCache::new();
        cache.set_add("quiz:1:participants", "user:1").await.unwrap();
        cache.set_add("quiz:1:participants", "user:2").await.unwrap();
        assert!(cache.set_contains("quiz:1:participants", "user:1").await.unwrap());
        assert_eq!(cache.set_len("quiz:1:participants").await.unwrap(), 2);
        cache.set_remove("quiz:1:participants", "user:1").await.unwrap();
        assert!(!cache.set_contains("quiz:1:participants", "user:1").await.unwrap());
    }

    #[tokio::test]
    async fn flag_defaults_false_and_can_be_set() {
        let cache = InMemoryCache::new();
        assert!(!cache.get_flag("quiz:1:user:5:eliminated").await.unwrap());
        cache.set_flag("quiz:1:user:5:eliminated", true, None).await.unwrap();
        assert!(cache.get_flag("quiz:1:user:5:eliminated").await.unwrap());
    }

    #[tokio::test]
    async fn flag_expires_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set_flag("rl:ip:1", true, Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(cache.get_flag("rl:ip:1").await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!cache.get_flag("rl:ip:1").await.unwrap());
    }

    #[tokio::test]
    async fn incr_is_monotonic() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr("rl:ip:9").await.unwrap(), 1);
        assert_eq!(cache.incr("rl:ip:9").await.unwrap(), 2);
        assert_eq!(cache.incr("rl:ip:9").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn set_if_absent_wins_exactly_once_until_ttl() {
        let cache = InMemoryCache::new();
        assert!(cache.set_if_absent("lock:q:42", Duration::from_millis(20)).await.unwrap());
        assert!(!cache.set_if_absent("lock:q:42", Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.set_if_absent("lock:q:42", Duration::from_millis(20)).await.unwrap());
    }
}
