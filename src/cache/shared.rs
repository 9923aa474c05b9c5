//! Shared Cache Module
//!
//! Async handle around a [`CacheStore`] for use across tasks, plus the
//! helpers built on it: memoization, preload, warmup and the auto-cleanup
//! lifecycle.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{CacheStats, CacheStore, EvictionStrategy, SetOptions};
use crate::error::Result;
use crate::tasks::spawn_cleanup_task;

/// Derives a cache key from call arguments; `None` bypasses the cache.
pub type KeyGenerator<A> = Arc<dyn Fn(&A) -> Option<String> + Send + Sync>;

// == Shared Cache ==
/// Cloneable handle to one cache store.
///
/// Construct once at startup and pass clones to collaborators.
pub struct SharedCache<V> {
    store: Arc<RwLock<CacheStore<V>>>,
    cleanup: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<V> Clone for SharedCache<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cleanup: Arc::clone(&self.cleanup),
        }
    }
}

impl<V> SharedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(store: CacheStore<V>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            cleanup: Arc::new(Mutex::new(None)),
        }
    }

    /// Wraps `store` and immediately starts the periodic sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_auto_cleanup(store: CacheStore<V>, interval: Duration) -> Self {
        let cache = Self::new(store);
        cache.start_auto_cleanup(interval);
        cache
    }

    /// The underlying store, for callers that need several operations under one lock.
    pub fn store(&self) -> Arc<RwLock<CacheStore<V>>> {
        Arc::clone(&self.store)
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.store.write().await.get(key)
    }

    pub async fn set(&self, key: impl Into<String>, value: V, options: SetOptions) {
        self.store.write().await.set(key, value, options);
    }

    pub async fn invalidate(&self, key: &str) -> usize {
        self.store.write().await.invalidate(key)
    }

    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        self.store.write().await.invalidate_by_tag(tag)
    }

    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        self.store.write().await.invalidate_by_pattern(pattern)
    }

    pub async fn cleanup(&self) -> usize {
        self.store.write().await.cleanup()
    }

    pub async fn clear(&self) -> usize {
        self.store.write().await.clear()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.store.read().await.keys()
    }

    pub async fn get_by_tag(&self, tag: &str) -> Vec<(String, V)> {
        self.store.read().await.get_by_tag(tag)
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    // == Warmup ==
    /// Stores every `(key, value, options)` triple.
    pub async fn warmup<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, V, SetOptions)>,
    {
        let mut store = self.store.write().await;
        for (key, value, options) in entries {
            store.set(key, value, options);
        }
    }

    // == Preload ==
    /// Fetches and stores every key not already cached, concurrently.
    ///
    /// A failed fetch is reported in its outcome and leaves the cache untouched.
    pub async fn preload<F, Fut, E>(&self, keys: Vec<String>, fetch: F) -> Vec<PreloadOutcome>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Display,
    {
        let fetch = &fetch;
        let tasks = keys.into_iter().map(|key| async move {
            if self.store.read().await.contains_key(&key) {
                return PreloadOutcome::cached(key);
            }

            match fetch(key.clone()).await {
                Ok(value) => {
                    self.set(key.clone(), value, SetOptions::new()).await;
                    PreloadOutcome::fetched(key)
                }
                Err(err) => {
                    warn!("Preload failed for key {}: {}", key, err);
                    PreloadOutcome::failed(key, err.to_string())
                }
            }
        });

        join_all(tasks).await
    }

    // == Memoize ==
    /// Wraps `f` so that successful results are served from this cache.
    pub fn memoize<A, F, Fut, E>(&self, f: F, options: MemoizeOptions<A>) -> Memoized<V, A, F>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        Memoized {
            cache: self.clone(),
            f,
            options,
        }
    }

    // == Auto Cleanup ==
    /// Starts the periodic sweep, replacing any sweep already running.
    pub fn start_auto_cleanup(&self, interval: Duration) {
        let handle = spawn_cleanup_task(self.store(), interval);
        if let Some(previous) = self.cleanup.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the periodic sweep. Returns false if none was running.
    pub fn stop_auto_cleanup(&self) -> bool {
        match self.cleanup.lock().take() {
            Some(handle) => {
                handle.abort();
                info!("Cache auto-cleanup stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_auto_cleanup_running(&self) -> bool {
        self.cleanup
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<V> SharedCache<V>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }
}

// == Preload Outcome ==
/// Result of preloading one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadOutcome {
    pub key: String,
    pub success: bool,
    /// The key was already cached and nothing was fetched
    pub cached: bool,
    pub error: Option<String>,
}

impl PreloadOutcome {
    fn cached(key: String) -> Self {
        Self {
            key,
            success: true,
            cached: true,
            error: None,
        }
    }

    fn fetched(key: String) -> Self {
        Self {
            key,
            success: true,
            cached: false,
            error: None,
        }
    }

    fn failed(key: String, error: String) -> Self {
        Self {
            key,
            success: false,
            cached: false,
            error: Some(error),
        }
    }
}

// == Memoize Options ==
/// Key derivation and storage options for [`SharedCache::memoize`].
pub struct MemoizeOptions<A> {
    key_generator: KeyGenerator<A>,
    set_options: SetOptions,
}

impl<A: Serialize> Default for MemoizeOptions<A> {
    /// Keys are the JSON serialization of the arguments.
    fn default() -> Self {
        Self {
            key_generator: Arc::new(|args: &A| serde_json::to_string(args).ok()),
            set_options: SetOptions::new(),
        }
    }
}

impl<A> MemoizeOptions<A> {
    pub fn with_key_generator<G>(generator: G) -> Self
    where
        G: Fn(&A) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            key_generator: Arc::new(generator),
            set_options: SetOptions::new(),
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.set_options = self.set_options.ttl(ttl);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_options = self.set_options.tags(tags);
        self
    }

    pub fn strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.set_options = self.set_options.strategy(strategy);
        self
    }
}

// == Memoized ==
/// A function whose successful results are cached.
///
/// Errors are never cached and reach the caller unchanged.
pub struct Memoized<V, A, F> {
    cache: SharedCache<V>,
    f: F,
    options: MemoizeOptions<A>,
}

impl<V, A, F> Memoized<V, A, F>
where
    V: Clone + Send + Sync + 'static,
{
    pub async fn call<Fut, E>(&self, args: A) -> std::result::Result<V, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let key = (self.options.key_generator)(&args);

        if let Some(key) = &key {
            if let Some(cached) = self.cache.get(key).await {
                return Ok(cached);
            }
        } else {
            warn!("Memoize key generation failed; calling through without cache");
        }

        let result = (self.f)(args).await?;

        if let Some(key) = key {
            self.cache
                .set(key, result.clone(), self.options.set_options.clone())
                .await;
        }

        Ok(result)
    }

    /// Drops the cached result for `args`, if any.
    pub async fn forget(&self, args: &A) -> usize {
        match (self.options.key_generator)(args) {
            Some(key) => self.cache.invalidate(&key).await,
            None => 0,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> SharedCache<String> {
        SharedCache::new(CacheStore::new(100, Duration::from_secs(300)))
    }

    #[tokio::test]
    async fn test_memoize_caches_success() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let lookup = cache.memoize(
            move |id: u32| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(format!("user-{}", id))
                }
            },
            MemoizeOptions::default().tags(["users"]),
        );

        assert_eq!(lookup.call(7).await, Ok("user-7".to_string()));
        assert_eq!(lookup.call(7).await, Ok("user-7".to_string()));
        assert_eq!(lookup.call(8).await, Ok("user-8".to_string()));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Default key is the JSON form of the arguments
        assert_eq!(cache.get("7").await, Some("user-7".to_string()));
        assert_eq!(cache.invalidate_by_tag("users").await, 2);
    }

    #[tokio::test]
    async fn test_memoize_never_caches_errors() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let flaky = cache.memoize(
            move |(a, b): (u32, u32)| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<String, _>(format!("failed {}+{}", a, b))
                }
            },
            MemoizeOptions::default(),
        );

        assert_eq!(flaky.call((1, 2)).await, Err("failed 1+2".to_string()));
        assert_eq!(flaky.call((1, 2)).await, Err("failed 1+2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_memoize_custom_key_and_forget() {
        let cache = cache();
        let lookup = cache.memoize(
            |name: String| async move { Ok::<_, String>(name.to_uppercase()) },
            MemoizeOptions::with_key_generator(|name: &String| Some(format!("upper:{}", name))),
        );

        assert_eq!(lookup.call("abc".to_string()).await, Ok("ABC".to_string()));
        assert_eq!(cache.keys().await, vec!["upper:abc".to_string()]);
        assert_eq!(lookup.forget(&"abc".to_string()).await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_memoize_uncacheable_key_calls_through() {
        let cache = cache();
        let lookup = cache.memoize(
            |n: u32| async move { Ok::<_, String>(n.to_string()) },
            MemoizeOptions::with_key_generator(|_: &u32| None),
        );

        assert_eq!(lookup.call(5).await, Ok("5".to_string()));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_preload_skips_cached_and_reports_failures() {
        let cache = cache();
        cache.set("a", "cached".to_string(), SetOptions::new()).await;

        let outcomes = cache
            .preload(
                vec!["a".to_string(), "b".to_string(), "bad".to_string()],
                |key: String| async move {
                    if key == "bad" {
                        Err(format!("no row for {}", key))
                    } else {
                        Ok(format!("fetched-{}", key))
                    }
                },
            )
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success && outcomes[0].cached);
        assert!(outcomes[1].success && !outcomes[1].cached);
        assert!(!outcomes[2].success);
        assert_eq!(outcomes[2].error.as_deref(), Some("no row for bad"));

        assert_eq!(cache.get("a").await, Some("cached".to_string()));
        assert_eq!(cache.get("b").await, Some("fetched-b".to_string()));
        assert_eq!(cache.get("bad").await, None);
    }

    #[tokio::test]
    async fn test_warmup() {
        let cache = cache();
        cache
            .warmup(vec![
                ("a".to_string(), "1".to_string(), SetOptions::new().tags(["t"])),
                ("b".to_string(), "2".to_string(), SetOptions::new().tags(["t"])),
            ])
            .await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get_by_tag("t").await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_cleanup_lifecycle() {
        let cache = SharedCache::with_auto_cleanup(
            CacheStore::<String>::new(10, Duration::from_millis(100)),
            Duration::from_secs(1),
        );
        cache.set("a", "1".to_string(), SetOptions::new()).await;
        assert!(cache.is_auto_cleanup_running());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(cache.store().read().await.peek("a").is_none());

        assert!(cache.stop_auto_cleanup());
        assert!(!cache.stop_auto_cleanup());

        // No sweep after stop: the entry stays physically present
        cache.set("b", "2".to_string(), SetOptions::new()).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(cache.store().read().await.peek("b").is_some());
        assert!(!cache.is_auto_cleanup_running());
    }

    #[tokio::test]
    async fn test_stats_through_handle() {
        let cache = cache();
        cache.set("k", "v".to_string(), SetOptions::new()).await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }
}
