//! Cache configuration.
//!
//! Controls the freshness window and the durable tier via the `[cache]` section.

use std::time::Duration;

use serde::Deserialize;

use super::environment::BackendPreference;

// Default values for cache configuration
const DEFAULT_REVALIDATE_SECONDS: u64 = 60;
const DEFAULT_KV_TTL_MULTIPLIER: u64 = 3;
const DEFAULT_KV_MIN_EXPIRATION_SECS: u64 = 60;

/// Cache configuration from the `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Durable tier selection; `auto` probes the environment once.
    pub backend: BackendPreference,
    /// Freshness window in seconds shared by every cached lookup.
    pub revalidate_seconds: u64,
    /// Physical expiry of durable entries as a multiple of the freshness window.
    pub kv_ttl_multiplier: u64,
    /// Smallest expiry the durable backend accepts.
    pub kv_min_expiration_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            revalidate_seconds: DEFAULT_REVALIDATE_SECONDS,
            kv_ttl_multiplier: DEFAULT_KV_TTL_MULTIPLIER,
            kv_min_expiration_secs: DEFAULT_KV_MIN_EXPIRATION_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            revalidate_seconds: settings.revalidate_seconds.get(),
            kv_ttl_multiplier: settings.kv_ttl_multiplier.get(),
            kv_min_expiration_secs: settings.kv_min_expiration_secs,
        }
    }
}

impl CacheConfig {
    pub fn revalidate(&self) -> Duration {
        Duration::from_secs(self.revalidate_seconds)
    }

    /// Physical expiry for a durable entry with the given freshness window.
    ///
    /// Never shorter than the window itself, so the durable tier cannot evict a
    /// value the freshness check would still accept.
    pub fn physical_ttl(&self, freshness_secs: u64) -> u64 {
        freshness_secs
            .saturating_mul(self.kv_ttl_multiplier.max(1))
            .max(self.kv_min_expiration_secs)
    }
}
