//! Layered cache engine.
//!
//! Lookups go through three tiers in order:
//!
//! 1. the in-process memory tier (valid until its slot expires),
//! 2. the durable [`BackingStore`] (fresh per its stored timestamp; hits are
//!    copied back into memory),
//! 3. the in-flight map, so concurrent callers for one key share a single
//!    computation.
//!
//! On a full miss the computation is spawned onto the runtime and its handle
//! is published in the in-flight map. The task finishes even if every caller
//! goes away, writes both tiers, then unregisters itself.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::{counter, histogram};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use super::backing::BackingStore;
use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::mutex_lock;
use super::{
    METRIC_COALESCED_TOTAL, METRIC_FETCH_MS, METRIC_MEMORY_HIT_TOTAL, METRIC_MISS_TOTAL,
    METRIC_STORE_HIT_TOTAL,
};

const SOURCE: &str = "cache::engine";

type Erased = Arc<dyn Any + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Erased>>;

/// Failures produced by the engine itself rather than the wrapped computation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache key could not be encoded: {0}")]
    Key(String),
    #[error("cached computation for `{key}` aborted: {message}")]
    TaskAborted { key: String, message: String },
    #[error("cached value for `{key}` has an unexpected type")]
    TypeMismatch { key: String },
}

/// One value held by the memory tier.
#[derive(Clone)]
pub struct MemorySlot {
    data: Erased,
    expires: Instant,
}

impl MemorySlot {
    pub fn is_valid(&self, now: Instant) -> bool {
        now < self.expires
    }
}

struct EngineInner {
    memory: DashMap<String, MemorySlot>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    store: BackingStore,
    config: CacheConfig,
}

/// Process-wide cache state, cheap to clone and share.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<EngineInner>,
}

impl CacheEngine {
    pub fn new(store: BackingStore, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                memory: DashMap::new(),
                in_flight: Mutex::new(HashMap::new()),
                store,
                config,
            }),
        }
    }

    /// An engine with the memory tier only.
    pub fn memory_only(config: CacheConfig) -> Self {
        Self::new(BackingStore::unavailable(config.clone()), config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &BackingStore {
        &self.inner.store
    }

    /// Wraps `compute` so every call goes through the cache under `name`.
    pub fn wrap<A, T, E, F, Fut>(
        &self,
        name: &'static str,
        ttl: u64,
        compute: F,
    ) -> Cached<A, T, E, F>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Cached {
            engine: self.clone(),
            name,
            ttl,
            compute,
            _marker: PhantomData,
        }
    }

    /// Returns the cached value for `name(args)` or computes it.
    pub async fn get_or_compute<A, T, E, F, Fut>(
        &self,
        name: &str,
        args: &A,
        ttl: u64,
        compute: F,
    ) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        E: From<CacheError> + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = CacheKey::for_call(name, args)
            .map_err(|err| E::from(CacheError::Key(err.to_string())))?;
        self.get_or_compute_key(key, ttl, compute).await
    }

    /// Same as [`get_or_compute`](Self::get_or_compute) for a prebuilt key.
    pub async fn get_or_compute_key<T, E, F, Fut>(
        &self,
        key: CacheKey,
        ttl: u64,
        compute: F,
    ) -> Result<T, E>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        E: From<CacheError> + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let namespace = key.namespace().to_string();

        if let Some(value) = self.inner.memory_get::<T>(key.as_str()) {
            debug!(key = key.as_str(), tier = "memory", "Cache hit");
            counter!(METRIC_MEMORY_HIT_TOTAL, "name" => namespace).increment(1);
            return Ok(value);
        }

        if let Some(value) = self.inner.store.get::<T>(key.as_str(), Some(ttl)).await {
            debug!(key = key.as_str(), tier = "store", "Cache hit");
            counter!(METRIC_STORE_HIT_TOTAL, "name" => namespace).increment(1);
            self.inner.memory_put(key.as_str(), value.clone(), ttl);
            return Ok(value);
        }

        let task = {
            let mut in_flight = mutex_lock(&self.inner.in_flight, SOURCE, "get_or_compute");
            match in_flight.get(key.as_str()) {
                Some(existing) => {
                    debug!(key = key.as_str(), "Joining in-flight refresh");
                    counter!(METRIC_COALESCED_TOTAL, "name" => namespace).increment(1);
                    existing.clone()
                }
                None => {
                    // A refresh may have finished between the tier checks and this lock.
                    if let Some(value) = self.inner.memory_get::<T>(key.as_str()) {
                        counter!(METRIC_MEMORY_HIT_TOTAL, "name" => namespace).increment(1);
                        return Ok(value);
                    }
                    counter!(METRIC_MISS_TOTAL, "name" => namespace.clone()).increment(1);
                    let task = self.spawn_refresh(key.clone(), namespace, ttl, compute());
                    in_flight.insert(key.to_string(), task.clone());
                    task
                }
            }
        };

        let output = task.await;
        match output.downcast_ref::<Result<T, E>>() {
            Some(result) => result.clone(),
            None => Err(E::from(CacheError::TypeMismatch {
                key: key.into_string(),
            })),
        }
    }

    fn spawn_refresh<T, E, Fut>(
        &self,
        key: CacheKey,
        namespace: String,
        ttl: u64,
        computation: Fut,
    ) -> InFlight
    where
        T: Clone + Serialize + Send + Sync + 'static,
        E: From<CacheError> + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let started_at = Instant::now();
            info!(key = task_key.as_str(), "Cache miss, computing value");

            let result = computation.await;
            histogram!(METRIC_FETCH_MS, "name" => namespace)
                .record(started_at.elapsed().as_secs_f64() * 1000.0);

            if let Ok(value) = &result {
                inner.memory_put(task_key.as_str(), value.clone(), ttl);
                inner.store.set(task_key.as_str(), value, ttl).await;
            }
            inner.finish(task_key.as_str());

            Arc::new(result) as Erased
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match handle.await {
                Ok(output) => output,
                Err(err) => {
                    inner.finish(key.as_str());
                    let error = E::from(CacheError::TaskAborted {
                        key: key.into_string(),
                        message: err.to_string(),
                    });
                    Arc::new(Err::<T, E>(error)) as Erased
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Keys in the durable tier starting with `prefix`.
    pub async fn list(&self, prefix: &str) -> Vec<String> {
        self.inner.store.list(prefix).await
    }

    /// Drops `key` from both tiers. Returns whether the durable delete succeeded.
    pub async fn delete(&self, key: &str) -> bool {
        self.inner.memory.remove(key);
        self.inner.store.delete(key).await
    }

    /// Empties the memory tier, as a process restart would.
    pub fn clear_memory(&self) {
        self.inner.memory.clear();
    }

    pub fn in_flight_len(&self) -> usize {
        mutex_lock(&self.inner.in_flight, SOURCE, "in_flight_len").len()
    }
}

impl EngineInner {
    fn memory_get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        let now = Instant::now();
        let value = {
            let slot = self.memory.get(key)?;
            if !slot.is_valid(now) {
                None
            } else {
                slot.data.downcast_ref::<T>().cloned()
            }
        };
        if value.is_none() {
            self.memory.remove_if(key, |_, slot| !slot.is_valid(now));
        }
        value
    }

    fn memory_put<T>(&self, key: &str, value: T, ttl: u64)
    where
        T: Send + Sync + 'static,
    {
        let slot = MemorySlot {
            data: Arc::new(value),
            expires: Instant::now() + Duration::from_secs(ttl),
        };
        self.memory.insert(key.to_string(), slot);
    }

    fn finish(&self, key: &str) {
        mutex_lock(&self.in_flight, SOURCE, "finish").remove(key);
    }
}

/// A computation bound to the engine under a fixed name and freshness window.
pub struct Cached<A, T, E, F> {
    engine: CacheEngine,
    name: &'static str,
    ttl: u64,
    compute: F,
    _marker: PhantomData<fn(A) -> Result<T, E>>,
}

impl<A, T, E, F, Fut> Cached<A, T, E, F>
where
    A: Serialize,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: From<CacheError> + Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    pub async fn call(&self, args: A) -> Result<T, E> {
        let key = CacheKey::for_call(self.name, &args)
            .map_err(|err| E::from(CacheError::Key(err.to_string())))?;
        self.engine
            .get_or_compute_key(key, self.ttl, || (self.compute)(args))
            .await
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::backing::{KvBackend, StoreError};

    #[derive(Debug, Clone, PartialEq)]
    struct TestError(String);

    impl From<CacheError> for TestError {
        fn from(err: CacheError) -> Self {
            Self(err.to_string())
        }
    }

    #[derive(Default)]
    struct SharedBackend {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl KvBackend for SharedBackend {
        fn name(&self) -> &'static str {
            "shared"
        }

        async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.entries.lock().expect("lock").get(key).cloned())
        }

        async fn put_raw(&self, key: &str, value: Vec<u8>, _: u64) -> Result<(), StoreError> {
            self.entries
                .lock()
                .expect("lock")
                .insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.entries.lock().expect("lock").remove(key);
            Ok(())
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            Ok(self
                .entries
                .lock()
                .expect("lock")
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn(String) -> BoxFuture<'static, Result<String, TestError>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |id: String| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(format!("value-{id}"))
            }
            .boxed()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_coalesce() {
        let engine = CacheEngine::memory_only(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = Arc::new(engine.wrap("load", 60, counting(&calls)));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cached = Arc::clone(&cached);
                tokio::spawn(async move { cached.call("a".to_string()).await })
            })
            .collect();

        for handle in handles {
            let value = handle.await.expect("join").expect("value");
            assert_eq!(value, "value-a");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn errors_are_shared_and_not_cached() {
        let engine = CacheEngine::memory_only(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let failing = engine.wrap("fail", 60, move |_: ()| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<String, _>(TestError("upstream down".into()))
            }
        });

        let (first, second) = tokio::join!(failing.call(()), failing.call(()));
        assert_eq!(first, Err(TestError("upstream down".into())));
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let third = failing.call(()).await;
        assert!(third.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn memory_tier_expires_after_ttl() {
        let engine = CacheEngine::memory_only(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = engine.wrap("load", 60, counting(&calls));

        cached.call("a".into()).await.expect("first");
        cached.call("a".into()).await.expect("memory hit");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        cached.call("a".into()).await.expect("refresh");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn durable_tier_survives_memory_loss() {
        let backend = Arc::new(SharedBackend::default());
        let config = CacheConfig::default();
        let engine = CacheEngine::new(BackingStore::new(backend.clone(), config.clone()), config);
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = engine.wrap("load", 60, counting(&calls));

        assert_eq!(cached.call("a".into()).await.expect("value"), "value-a");
        assert_eq!(engine.list("load:").await, [r#"load:["a"]"#.to_string()]);

        engine.clear_memory();
        assert_eq!(cached.call("a".into()).await.expect("value"), "value-a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(engine.delete(r#"load:["a"]"#).await);
        cached.call("a".into()).await.expect("value");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_arguments_use_distinct_keys() {
        let engine = CacheEngine::memory_only(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = engine.wrap("load", 60, counting(&calls));

        assert_eq!(cached.call("a".into()).await.expect("a"), "value-a");
        assert_eq!(cached.call("b".into()).await.expect("b"), "value-b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn type_mismatch_falls_through_to_compute() {
        let engine = CacheEngine::memory_only(CacheConfig::default());
        let _: Result<u32, TestError> = engine
            .get_or_compute("shape", &("k",), 60, || async { Ok(7u32) })
            .await;

        let result: Result<String, TestError> = engine
            .get_or_compute("shape", &("k",), 60, || async { Ok("text".to_string()) })
            .await;
        // The memory slot holds a u32, so the lookup falls through to a fresh computation.
        assert_eq!(result, Ok("text".to_string()));
    }
}
