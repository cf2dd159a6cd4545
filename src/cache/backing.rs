//! Durable tier adapter.
//!
//! Wraps a [`KvBackend`] with timestamped entries and staleness checks.
//! Every backend failure is logged, counted and reported to callers as a
//! miss (`None`) or a failed write (`false`); nothing here returns an error.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::METRIC_STORE_ERROR_TOTAL;

const SOURCE: &str = "cache::backing";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("kv request failed: {message}")]
    Http { message: String },
    #[error("kv backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("kv io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("kv payload could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    pub fn http(err: impl std::fmt::Display) -> Self {
        Self::Http {
            message: err.to_string(),
        }
    }
}

/// Raw key-value operations offered by a durable backend.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value`; the backend may drop it after `expiration_ttl` seconds.
    async fn put_raw(&self, key: &str, value: Vec<u8>, expiration_ttl: u64)
    -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Value stored in the durable tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry<T> {
    pub data: T,
    /// Creation instant in epoch milliseconds.
    pub timestamp: i64,
    /// Freshness window in seconds.
    pub ttl: u64,
}

impl<T> StoredEntry<T> {
    /// Fresh iff `now - timestamp < window`, where the window is the caller's
    /// expectation or, without one, the ttl recorded at write time.
    pub fn is_fresh(&self, now_ms: i64, expected_freshness: Option<u64>) -> bool {
        let window_secs = expected_freshness.unwrap_or(self.ttl);
        let window_ms = i64::try_from(window_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) < window_ms
    }
}

/// Durable tier shared by every cached lookup in the process.
#[derive(Clone)]
pub struct BackingStore {
    backend: Option<Arc<dyn KvBackend>>,
    config: CacheConfig,
}

impl BackingStore {
    pub fn new(backend: Arc<dyn KvBackend>, config: CacheConfig) -> Self {
        Self {
            backend: Some(backend),
            config,
        }
    }

    /// A store without a backend: every read misses and every write fails.
    pub fn unavailable(config: CacheConfig) -> Self {
        Self {
            backend: None,
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("none", |backend| backend.name())
    }

    pub async fn get<T>(&self, key: &str, expected_freshness: Option<u64>) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let backend = self.backend.as_ref()?;

        let bytes = match backend.get_raw(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                record_failure("get", backend.name(), key, &err);
                return None;
            }
        };

        let entry: StoredEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                record_failure("get.decode", backend.name(), key, &StoreError::from(err));
                return None;
            }
        };

        if !entry.is_fresh(now_ms(), expected_freshness) {
            debug!(
                target_module = SOURCE,
                key,
                age_ms = now_ms() - entry.timestamp,
                ttl = entry.ttl,
                "Durable entry is stale"
            );
            return None;
        }

        Some(entry.data)
    }

    pub async fn set<T>(&self, key: &str, value: &T, freshness: u64) -> bool
    where
        T: Serialize + ?Sized,
    {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };

        let entry = StoredEntry {
            data: value,
            timestamp: now_ms(),
            ttl: freshness,
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                record_failure("set.encode", backend.name(), key, &StoreError::from(err));
                return false;
            }
        };

        match backend
            .put_raw(key, bytes, self.config.physical_ttl(freshness))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                record_failure("set", backend.name(), key, &err);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        match backend.delete(key).await {
            Ok(()) => true,
            Err(err) => {
                record_failure("delete", backend.name(), key, &err);
                false
            }
        }
    }

    pub async fn list(&self, prefix: &str) -> Vec<String> {
        let Some(backend) = self.backend.as_ref() else {
            return Vec::new();
        };
        match backend.list(prefix).await {
            Ok(mut keys) => {
                keys.sort();
                keys
            }
            Err(err) => {
                record_failure("list", backend.name(), prefix, &err);
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStore")
            .field("backend", &self.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

fn record_failure(op: &'static str, backend: &'static str, key: &str, err: &StoreError) {
    warn!(
        op,
        target_module = SOURCE,
        backend,
        key,
        error = %err,
        result = "degraded_to_miss",
        "Durable cache operation failed"
    );
    counter!(METRIC_STORE_ERROR_TOTAL, "op" => op).increment(1);
}

pub(crate) fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
