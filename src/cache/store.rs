//! Cache Store Module
//!
//! Main cache container combining the key index with LRU tracking and the
//! per-entry refresh engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{
    CacheKey, CacheStats, Counters, DefaultKeyCodec, Entry, KeyCodec, LoadResult, LruTracker,
    Params,
};
use crate::config::{CacheConfig, EvictionMode};
use crate::error::{CacheError, Result};
use crate::loader::{declared_arity, Loader};
use crate::tasks::Refresher;

type CacheOutcome<L> = Result<LoadResult<<L as Loader>::Value, <L as Loader>::Error>>;

// == Index ==
/// Key space of a cache: the entry map plus the optional recency order.
struct Index<L: Loader> {
    entries: HashMap<CacheKey, Arc<Entry<L>>>,
    lru: Option<LruTracker>,
}

impl<L: Loader> Index<L> {
    fn new(eviction: EvictionMode) -> Self {
        Self {
            entries: HashMap::new(),
            lru: match eviction {
                EvictionMode::Lru => Some(LruTracker::new()),
                EvictionMode::None => None,
            },
        }
    }

    /// Returns the entry for `key`, creating it if needed.
    ///
    /// Both hits and insertions become most recently used. Only an insertion
    /// can push the index past `capacity`, in which case the least recently
    /// used entries are dropped before returning.
    fn get_or_insert(
        &mut self,
        key: CacheKey,
        params: L::Params,
        capacity: Option<usize>,
        counters: &Counters,
    ) -> Arc<Entry<L>> {
        if let Some(entry) = self.entries.get(&key) {
            let entry = Arc::clone(entry);
            if let Some(lru) = self.lru.as_mut() {
                lru.touch(&key);
            }
            return entry;
        }

        let entry = Arc::new(Entry::new(key.clone(), params));
        self.entries.insert(key.clone(), Arc::clone(&entry));
        debug!(key = %key, "Created cache entry");

        if let Some(lru) = self.lru.as_mut() {
            lru.touch(&key);
            if let Some(capacity) = capacity {
                while self.entries.len() > capacity {
                    let Some(evicted) = lru.evict_oldest() else {
                        break;
                    };
                    self.entries.remove(&evicted);
                    counters.record_eviction();
                    debug!(key = %evicted, "Evicted least recently used entry");
                }
            }
        }
        entry
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        if let Some(lru) = self.lru.as_mut() {
            lru.remove(key.as_str());
        }
        true
    }

    fn clear(&mut self) {
        self.entries.clear();
        if let Some(lru) = self.lru.as_mut() {
            lru.clear();
        }
    }
}

// == Cache ==
/// In-process load-through cache.
///
/// Results of the loader are memoized per key for `ttl`. Stale results are
/// served while a single background load refreshes them; only the very first
/// read of a key waits for the loader.
pub struct Cache<L: Loader> {
    /// Structural lock over the key space
    index: RwLock<Index<L>>,
    codec: Box<dyn KeyCodec<L::Params>>,
    refresher: Refresher<L>,
    counters: Arc<Counters>,
    config: CacheConfig,
    ttl: Duration,
    arity: usize,
    shutdown: CancellationToken,
}

impl<L: Loader> Cache<L> {
    // == Constructor ==
    /// Creates a cache over `loader` with the default key codec.
    ///
    /// # Errors
    /// - `InvalidLoader` if the loader has no fixed arity
    /// - `InvalidConfig` if `config` is out of range
    pub fn new(loader: L, ttl: Duration, config: CacheConfig) -> Result<Self> {
        CacheBuilder::new(loader, ttl).config(config).build()
    }

    /// Starts a [`CacheBuilder`].
    pub fn builder(loader: L, ttl: Duration) -> CacheBuilder<L> {
        CacheBuilder::new(loader, ttl)
    }

    // == Get ==
    /// Returns the loader's result for `params`.
    ///
    /// The outer `Result` reports cache misuse; the inner one is the loader's
    /// own outcome, passed through verbatim (cached errors included).
    pub async fn get(&self, params: L::Params) -> CacheOutcome<L> {
        self.get_inner(params, None).await
    }

    /// Like [`Cache::get`], but a caller waiting on a cold load gives up with
    /// `Cancelled` once `token` fires. The load itself carries on, and the
    /// token never influences the key.
    pub async fn get_with_cancel(
        &self,
        params: L::Params,
        token: &CancellationToken,
    ) -> CacheOutcome<L> {
        if !self.config.cancellation_support {
            return Err(CacheError::CancellationUnsupported);
        }
        self.get_inner(params, Some(token)).await
    }

    async fn get_inner(
        &self,
        params: L::Params,
        cancel: Option<&CancellationToken>,
    ) -> CacheOutcome<L> {
        let actual = params.arity();
        if actual != self.arity {
            return Err(CacheError::ArityMismatch {
                expected: self.arity,
                actual,
            });
        }

        let key = self.codec.encode(&params);
        let entry = self.lookup_or_insert(key, params).await;
        entry.value(&self.refresher, cancel).await
    }

    async fn lookup_or_insert(&self, key: CacheKey, params: L::Params) -> Arc<Entry<L>> {
        // Without recency tracking a hit needs no exclusive access.
        if self.config.eviction == EvictionMode::None {
            let index = self.index.read().await;
            if let Some(entry) = index.entries.get(&key) {
                return Arc::clone(entry);
            }
        }

        let mut index = self.index.write().await;
        index.get_or_insert(key, params, self.config.effective_capacity(), &self.counters)
    }

    // == Remove ==
    /// Removes the entry for `params`, returning whether it was present.
    ///
    /// A load in flight for the removed entry is not cancelled; its result is
    /// discarded with the entry.
    pub async fn remove(&self, params: &L::Params) -> bool {
        let key = self.codec.encode(params);
        let removed = self.index.write().await.remove(&key);
        if removed {
            debug!(key = %key, "Removed cache entry");
        }
        removed
    }

    // == Purge ==
    /// Removes every entry.
    pub async fn purge(&self) {
        self.index.write().await.clear();
        debug!("Purged cache");
    }

    // == Contains ==
    /// Checks whether `params` has an entry, without loading or touching it.
    pub async fn contains(&self, params: &L::Params) -> bool {
        let key = self.codec.encode(params);
        self.index.read().await.entries.contains_key(&key)
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub async fn len(&self) -> usize {
        self.index.read().await.entries.len()
    }

    // == Is Empty ==
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len().await)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of parameters every call must carry.
    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl<L: Loader> Drop for Cache<L> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<L: Loader> fmt::Debug for Cache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .index
            .try_read()
            .map(|index| index.entries.len())
            .ok();
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("ttl", &self.ttl)
            .field("arity", &self.arity)
            .field("entries", &entries)
            .finish()
    }
}

// == Cache Builder ==
/// Builder for [`Cache`] instances.
///
/// # Example
///
/// ```ignore
/// use lcache::{loader_fn, CacheBuilder, EvictionMode};
/// use std::time::Duration;
///
/// let cache = CacheBuilder::new(
///     loader_fn(|(id,): &(u64,)| Ok::<_, String>(format!("user {id}"))),
///     Duration::from_secs(30),
/// )
/// .eviction(EvictionMode::Lru)
/// .capacity(1024)
/// .build()?;
///
/// let user = cache.get((7,)).await??;
/// ```
pub struct CacheBuilder<L: Loader> {
    loader: L,
    ttl: Duration,
    config: CacheConfig,
    codec: Option<Box<dyn KeyCodec<L::Params>>>,
}

impl<L: Loader> CacheBuilder<L> {
    pub fn new(loader: L, ttl: Duration) -> Self {
        Self {
            loader,
            ttl,
            config: CacheConfig::default(),
            codec: None,
        }
    }

    /// Replaces every option with `config`.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn eviction(mut self, eviction: EvictionMode) -> Self {
        self.config.eviction = eviction;
        self
    }

    pub fn cancellation_support(mut self, enabled: bool) -> Self {
        self.config.cancellation_support = enabled;
        self
    }

    /// Caches ordinary loader errors for `error_ttl` instead of the full ttl.
    pub fn error_ttl(mut self, error_ttl: Duration) -> Self {
        self.config.error_ttl = Some(error_ttl);
        self
    }

    /// Uses `codec` instead of [`DefaultKeyCodec`].
    pub fn key_codec<C>(mut self, codec: C) -> Self
    where
        C: KeyCodec<L::Params> + 'static,
    {
        self.codec = Some(Box::new(codec));
        self
    }

    /// Validates the loader and options and builds the cache.
    pub fn build(self) -> Result<Cache<L>> {
        let arity = declared_arity(&self.loader)?;
        self.config.validate()?;

        let counters = Arc::new(Counters::new());
        let shutdown = CancellationToken::new();
        let load_token = if self.config.cancellation_support {
            shutdown.clone()
        } else {
            CancellationToken::new()
        };
        let refresher = Refresher::new(
            Arc::new(self.loader),
            self.ttl,
            self.config.error_ttl,
            Arc::clone(&counters),
            load_token,
        );

        debug!(
            arity,
            ttl_ms = self.ttl.as_millis() as u64,
            capacity = self.config.capacity,
            eviction = %self.config.eviction,
            "Cache initialized"
        );

        Ok(Cache {
            index: RwLock::new(Index::new(self.config.eviction)),
            codec: self.codec.unwrap_or_else(|| Box::new(DefaultKeyCodec)),
            refresher,
            counters,
            config: self.config,
            ttl: self.ttl,
            arity,
            shutdown,
        })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::codec_fn;
    use crate::loader::loader_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    const TTL: Duration = Duration::from_secs(300);

    fn sum_loader(
        calls: Arc<AtomicUsize>,
    ) -> impl Loader<Params = (u32, u32), Value = u32, Error = String> {
        loader_fn(move |p: &(u32, u32)| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(p.0 + p.1)
        })
    }

    fn lru_cache(
        capacity: usize,
        calls: Arc<AtomicUsize>,
    ) -> Cache<impl Loader<Params = (u32, u32), Value = u32, Error = String>> {
        CacheBuilder::new(sum_loader(calls), TTL)
            .eviction(EvictionMode::Lru)
            .capacity(capacity)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_cache_new() {
        let cache = Cache::new(
            sum_loader(Arc::new(AtomicUsize::new(0))),
            TTL,
            CacheConfig::default(),
        )
        .unwrap();
        assert_eq!(cache.len().await, 0);
        assert!(cache.is_empty().await);
        assert_eq!(cache.arity(), 2);
        assert_eq!(cache.ttl(), TTL);
    }

    #[tokio::test]
    async fn test_cache_get_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Cache::new(sum_loader(calls.clone()), TTL, CacheConfig::default()).unwrap();

        assert_eq!(cache.get((1, 2)).await, Ok(Ok(3)));
        assert_eq!(cache.get((1, 2)).await, Ok(Ok(3)));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_cache_invalid_loader() {
        let loader = loader_fn(|p: &Vec<u32>| Ok::<_, String>(p.iter().sum::<u32>()));
        let res = Cache::new(loader, TTL, CacheConfig::default());
        assert!(matches!(res, Err(CacheError::InvalidLoader(_))));
    }

    #[tokio::test]
    async fn test_cache_arity_mismatch() {
        let loader =
            loader_fn(|p: &Vec<u32>| Ok::<_, String>(p.iter().sum::<u32>())).with_arity(2);
        let cache = Cache::new(loader, TTL, CacheConfig::default()).unwrap();

        assert_eq!(cache.get(vec![1, 2]).await, Ok(Ok(3)));
        assert_eq!(
            cache.get(vec![1, 2, 3]).await,
            Err(CacheError::ArityMismatch {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_cache_invalid_config() {
        let res = CacheBuilder::new(sum_loader(Arc::new(AtomicUsize::new(0))), TTL)
            .error_ttl(Duration::ZERO)
            .build();
        assert!(matches!(res, Err(CacheError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_cache_lru_eviction() {
        let cache = lru_cache(2, Arc::new(AtomicUsize::new(0)));

        cache.get((1, 2)).await.unwrap().unwrap();
        assert_eq!(cache.len().await, 1);
        cache.get((2, 3)).await.unwrap().unwrap();
        assert_eq!(cache.len().await, 2);
        cache.get((3, 4)).await.unwrap().unwrap();
        assert_eq!(cache.len().await, 2);

        assert!(!cache.contains(&(1, 2)).await);
        assert!(cache.contains(&(2, 3)).await);
        assert!(cache.contains(&(3, 4)).await);
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_cache_lru_touch_on_get() {
        let cache = lru_cache(2, Arc::new(AtomicUsize::new(0)));

        cache.get((1, 1)).await.unwrap().unwrap();
        cache.get((2, 2)).await.unwrap().unwrap();
        // hit on (1, 1) makes (2, 2) the eviction candidate
        cache.get((1, 1)).await.unwrap().unwrap();
        cache.get((3, 3)).await.unwrap().unwrap();

        assert!(cache.contains(&(1, 1)).await);
        assert!(!cache.contains(&(2, 2)).await);
    }

    #[tokio::test]
    async fn test_cache_unbounded_never_evicts() {
        let cache = Cache::new(
            sum_loader(Arc::new(AtomicUsize::new(0))),
            TTL,
            CacheConfig {
                capacity: 2,
                ..Default::default()
            },
        )
        .unwrap();

        for i in 0..5 {
            cache.get((i, i)).await.unwrap().unwrap();
        }
        assert_eq!(cache.len().await, 5);
    }

    #[tokio::test]
    async fn test_cache_remove() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = lru_cache(10, calls.clone());

        cache.get((1, 2)).await.unwrap().unwrap();
        assert!(cache.remove(&(1, 2)).await);
        assert!(!cache.remove(&(1, 2)).await);
        assert!(cache.is_empty().await);

        cache.get((1, 2)).await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_purge() {
        let cache = lru_cache(10, Arc::new(AtomicUsize::new(0)));

        for i in 0..4 {
            cache.get((i, 0)).await.unwrap().unwrap();
        }
        cache.purge().await;

        assert!(cache.is_empty().await);
        cache.get((9, 0)).await.unwrap().unwrap();
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_cache_custom_codec() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheBuilder::new(sum_loader(calls.clone()), TTL)
            .key_codec(codec_fn(|p: &(u32, u32)| format!("{}", p.0.min(p.1))))
            .build()
            .unwrap();

        assert_eq!(cache.get((1, 5)).await, Ok(Ok(6)));
        // same key under the custom codec: served from cache
        assert_eq!(cache.get((7, 1)).await, Ok(Ok(6)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_cancellation_unsupported() {
        let cache = Cache::new(
            sum_loader(Arc::new(AtomicUsize::new(0))),
            TTL,
            CacheConfig::default(),
        )
        .unwrap();
        let token = CancellationToken::new();

        let res = cache.get_with_cancel((1, 2), &token).await;
        assert_eq!(assert_err!(res), CacheError::CancellationUnsupported);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = lru_cache(10, Arc::new(AtomicUsize::new(0)));

        let first = cache.get((1, 2)).await.unwrap().unwrap(); // miss
        let second = cache.get((1, 2)).await.unwrap().unwrap(); // hit
        assert_eq!(first, second);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.total_entries, 1);
    }
}
