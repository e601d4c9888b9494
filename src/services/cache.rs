use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::clock::Clock;

/// Default lifetime of a cached match result
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Key-value store with per-entry time-to-live
///
/// The result cache only talks to this trait, so the in-process map can be
/// swapped for a shared store without touching matching code.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`, returning how many went
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;
}

/// A stored payload and the moment it was written
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub written_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Valid while `now - written_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let elapsed = (now - self.written_at).to_std().unwrap_or_default();
        elapsed < self.ttl
    }
}

/// Entries held by the in-process store before writes start evicting
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// How often a write sweeps expired entries out of the in-process store
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct MemoryEntries {
    map: HashMap<String, CacheEntry>,
    last_sweep: DateTime<Utc>,
}

impl MemoryEntries {
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_fresh(now));
        self.last_sweep = now;
        before - self.map.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.written_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.map.remove(&key);
        }
    }
}

/// In-process store bounded by entry count
///
/// Expiry is checked on read against the clock. Writes also sweep expired
/// entries once per interval, and when the store is full; if it is still
/// full after a sweep the oldest entry goes.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<MemoryEntries>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let now = clock.now();
        Self {
            entries: RwLock::new(MemoryEntries {
                map: HashMap::new(),
                last_sweep: now,
            }),
            capacity: capacity.max(1),
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.map.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now();

        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                Some(entry) if entry.is_fresh(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Stale: evict, unless a writer replaced it in the meantime
        let mut entries = self.entries.write().await;
        if entries.map.get(key).is_some_and(|entry| !entry.is_fresh(now)) {
            entries.map.remove(key);
            tracing::trace!("Evicted stale cache entry: {}", key);
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let sweep_due = (now - entries.last_sweep).to_std().unwrap_or_default() >= SWEEP_INTERVAL;
        let full = !entries.map.contains_key(key) && entries.map.len() >= self.capacity;

        if sweep_due || full {
            let removed = entries.sweep(now);
            if removed > 0 {
                tracing::trace!("Swept {} expired cache entries", removed);
            }
        }

        if !entries.map.contains_key(key) && entries.map.len() >= self.capacity {
            entries.evict_oldest();
        }

        entries.map.insert(
            key.to_string(),
            CacheEntry {
                value,
                written_at: now,
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.map.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.map.len();
        entries.map.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.map.len()) as u64)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().await.map.clear();
        Ok(())
    }
}

/// Two-tier store: in-memory L1 (moka) in front of Redis L2
///
/// L1 is per instance and uses the configured TTL; L2 is shared across
/// instances and gets an explicit TTL on every write. Keys are namespaced so
/// `clear` never touches unrelated Redis data.
pub struct RedisStore {
    // Store ConnectionManager in a Mutex for interior mutability
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    namespace: String,
}

impl RedisStore {
    pub async fn new(redis_url: &str, namespace: &str, l1_size: u64, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(ttl)
            .build();

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            l1_cache,
            namespace: namespace.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.redis.lock().await;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut *conn)
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let removed: u64 = redis::cmd("DEL")
            .arg(&keys)
            .query_async(&mut *conn)
            .await?;

        tracing::debug!("Invalidated {} cache keys matching {}", removed, pattern);
        Ok(removed)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        // Try L1 cache first
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(Some(bytes));
        }

        // Try L2 cache (Redis)
        let mut conn = self.redis.lock().await;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.namespaced(key))
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        if let Some(bytes) = value {
            tracing::trace!("L2 cache hit: {}", key);
            self.l1_cache.insert(key.to_string(), bytes.clone()).await;
            return Ok(Some(bytes));
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.l1_cache.insert(key.to_string(), value.clone()).await;

        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("SETEX")
            .arg(self.namespaced(key))
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async(&mut *conn)
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.l1_cache.invalidate(key).await;

        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("DEL")
            .arg(self.namespaced(key))
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        // L1 has no prefix scan; dropping it all is safe since L2 refills it
        self.l1_cache.invalidate_all();
        self.delete_matching(&format!("{}*", self.namespaced(prefix))).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.l1_cache.invalidate_all();
        self.delete_matching(&format!("{}*", self.namespace)).await?;
        Ok(())
    }
}

/// Cache key builder
///
/// Keys have the shape `match:{user}:{operation}:{params}` so that all of a
/// user's entries share one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    operation: &'static str,
    user_id: String,
    params: String,
}

impl CacheKey {
    fn new(operation: &'static str, user_id: &str, params: String) -> Self {
        Self {
            operation,
            user_id: user_id.to_string(),
            params,
        }
    }

    pub fn matches(user_id: &str, limit: usize) -> Self {
        Self::new("matches", user_id, format!("limit={}", limit))
    }

    pub fn detailed(user_id: &str, limit: usize, include_insights: bool) -> Self {
        Self::new(
            "detailed",
            user_id,
            format!("limit={}&insights={}", limit, include_insights),
        )
    }

    pub fn perfect(user_id: &str, limit: usize) -> Self {
        Self::new("perfect", user_id, format!("limit={}", limit))
    }

    pub fn high_score(user_id: &str, threshold: f64, limit: usize) -> Self {
        Self::new(
            "high_score",
            user_id,
            format!("threshold={:.2}&limit={}", threshold, limit),
        )
    }

    pub fn insights(user_id: &str) -> Self {
        Self::new("insights", user_id, String::new())
    }

    /// Prefix shared by every key belonging to `user_id`
    pub fn user_prefix(user_id: &str) -> String {
        format!("match:{}:", urlencoding::encode(user_id))
    }

    pub fn render(&self) -> String {
        format!("{}{}:{}", Self::user_prefix(&self.user_id), self.operation, self.params)
    }
}

/// Time-boxed memoization of ranked results
///
/// Store failures are logged and read as misses; caching never fails a
/// request.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let rendered = key.render();

        match self.store.get(&rendered).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    tracing::trace!("Cache hit: {}", rendered);
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!("Discarding undecodable cache entry {}: {}", rendered, e);
                    if let Err(e) = self.store.delete(&rendered).await {
                        tracing::warn!("Cache delete failed for {}: {}", rendered, e);
                    }
                    None
                }
            },
            Ok(None) => {
                tracing::trace!("Cache miss: {}", rendered);
                None
            }
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", rendered, e);
                None
            }
        }
    }

    pub async fn set<T>(&self, key: &CacheKey, value: &T)
    where
        T: Serialize,
    {
        let rendered = key.render();

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", rendered, e);
                return;
            }
        };

        if let Err(e) = self.store.set(&rendered, bytes, self.ttl).await {
            tracing::warn!("Cache write failed for {}: {}", rendered, e);
        }
    }

    /// Evict every entry keyed to `user_id`
    pub async fn invalidate_user(&self, user_id: &str) {
        match self.store.delete_prefix(&CacheKey::user_prefix(user_id)).await {
            Ok(removed) => tracing::debug!("Invalidated {} cache entries for user {}", removed, user_id),
            Err(e) => tracing::warn!("Failed to invalidate cache for user {}: {}", user_id, e),
        }
    }

    /// Evict everything
    ///
    /// Used on property mutation: without a reverse index from property to
    /// keys, clearing the whole cache is the only correct option.
    pub async fn invalidate_all(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!("Failed to clear result cache: {}", e);
        } else {
            tracing::debug!("Cleared result cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use chrono::TimeZone;

    fn setup() -> (Arc<ManualClock>, ResultCache) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (clock, ResultCache::new(store, DEFAULT_TTL))
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let (_clock, cache) = setup();
        let key = CacheKey::matches("user123", 20);

        cache.set(&key, &vec!["p1".to_string(), "p2".to_string()]).await;
        let value: Option<Vec<String>> = cache.get(&key).await;

        assert_eq!(value, Some(vec!["p1".to_string(), "p2".to_string()]));
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let (clock, cache) = setup();
        let key = CacheKey::insights("user123");
        cache.set(&key, &42u32).await;

        clock.advance(chrono::Duration::seconds(299));
        assert_eq!(cache.get::<u32>(&key).await, Some(42));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get::<u32>(&key).await, None);
    }

    #[tokio::test]
    async fn test_stale_entry_is_evicted_on_read() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
        let store = MemoryStore::new(clock.clone());
        store.set("k", b"v".to_vec(), Duration::from_secs(10)).await.unwrap();

        clock.advance(chrono::Duration::seconds(11));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_entries_are_swept_on_write() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
        let store = MemoryStore::new(clock.clone());

        for i in 0..1000 {
            store.set(&format!("k{}", i), b"v".to_vec(), DEFAULT_TTL).await.unwrap();
        }
        assert_eq!(store.len().await, 1000);

        clock.advance(chrono::Duration::hours(24));
        store.set("fresh", b"v".to_vec(), DEFAULT_TTL).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("fresh").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_full_store_evicts_oldest_entry() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
        let store = MemoryStore::with_capacity(clock.clone(), 3);

        for key in ["a", "b", "c"] {
            store.set(key, b"v".to_vec(), DEFAULT_TTL).await.unwrap();
            clock.advance(chrono::Duration::seconds(1));
        }

        // Overwriting an existing key never evicts
        store.set("b", b"w".to_vec(), DEFAULT_TTL).await.unwrap();
        assert_eq!(store.len().await, 3);

        store.set("d", b"v".to_vec(), DEFAULT_TTL).await.unwrap();

        assert_eq!(store.len().await, 3);
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some(b"w".to_vec()));
        assert_eq!(store.get("d").await.unwrap(), Some(b"v".to_vec()));
    }

    struct StickyStore(MemoryStore);

    #[async_trait]
    impl KeyValueStore for StickyStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
            self.0.set(key, value, ttl).await
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "connection dropped")).into())
        }

        async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
            self.0.delete_prefix(prefix).await
        }

        async fn clear(&self) -> Result<(), CacheError> {
            self.0.clear().await
        }
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss_even_if_delete_fails() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
        let store = Arc::new(StickyStore(MemoryStore::new(clock)));
        let cache = ResultCache::new(store.clone(), DEFAULT_TTL);
        let key = CacheKey::insights("alice");

        store.set(&key.render(), b"not json".to_vec(), DEFAULT_TTL).await.unwrap();

        assert_eq!(cache.get::<u32>(&key).await, None);
        // The entry survives the failed delete but keeps reading as a miss
        assert_eq!(store.0.len().await, 1);
        assert_eq!(cache.get::<u32>(&key).await, None);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_discarded() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
        let store = Arc::new(MemoryStore::new(clock));
        let cache = ResultCache::new(store.clone(), DEFAULT_TTL);
        let key = CacheKey::insights("alice");

        store.set(&key.render(), b"not json".to_vec(), DEFAULT_TTL).await.unwrap();

        assert_eq!(cache.get::<u32>(&key).await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let (_clock, cache) = setup();
        let key = CacheKey::perfect("u", 10);
        cache.set(&key, &1u8).await;
        cache.set(&key, &2u8).await;
        assert_eq!(cache.get::<u8>(&key).await, Some(2));
    }

    #[tokio::test]
    async fn test_invalidate_user_only_touches_that_user() {
        let (_clock, cache) = setup();
        cache.set(&CacheKey::matches("alice", 20), &1u8).await;
        cache.set(&CacheKey::insights("alice"), &2u8).await;
        cache.set(&CacheKey::matches("bob", 20), &3u8).await;

        cache.invalidate_user("alice").await;

        assert_eq!(cache.get::<u8>(&CacheKey::matches("alice", 20)).await, None);
        assert_eq!(cache.get::<u8>(&CacheKey::insights("alice")).await, None);
        assert_eq!(cache.get::<u8>(&CacheKey::matches("bob", 20)).await, Some(3));

        cache.invalidate_all().await;
        assert_eq!(cache.get::<u8>(&CacheKey::matches("bob", 20)).await, None);
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::matches("user123", 20).render(), "match:user123:matches:limit=20");
        assert_eq!(
            CacheKey::high_score("user123", 80.0, 50).render(),
            "match:user123:high_score:threshold=80.00&limit=50"
        );
        assert_eq!(CacheKey::insights("a:b").render(), "match:a%3Ab:insights:");
        assert_ne!(CacheKey::matches("u", 10), CacheKey::matches("u", 20));
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_redis_store_set_get() {
        let store = RedisStore::new("redis://127.0.0.1:6379", "rent-match-test:", 1000, DEFAULT_TTL)
            .await
            .expect("Failed to create cache");

        store.set("test_key", b"test_value".to_vec(), DEFAULT_TTL).await.unwrap();
        assert_eq!(store.get("test_key").await.unwrap(), Some(b"test_value".to_vec()));

        store.delete("test_key").await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.get("test_key").await.unwrap(), None);
    }
}
