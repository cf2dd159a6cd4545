//! Siteweave cache system.
//!
//! Every upstream read is mediated by the [`CacheEngine`]:
//!
//! - **Memory tier**: per-process slots with an absolute expiry
//! - **Durable tier**: a [`BackingStore`] over a key-value backend, shared
//!   across restarts and instances
//! - **Coalescing**: one in-flight computation per key
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "auto"            # auto | edge_kv | platform | local
//! revalidate_seconds = 60
//! kv_ttl_multiplier = 3
//! kv_min_expiration_secs = 60
//! ```

mod backing;
mod config;
mod engine;
mod environment;
mod keys;
mod lock;

pub use backing::{BackingStore, KvBackend, StoreError, StoredEntry};
pub use config::CacheConfig;
pub use engine::{CacheEngine, CacheError, Cached, MemorySlot};
pub use environment::{
    BackendPreference, DurableTier, EnvironmentProbe, durable_tier, resolve as resolve_tier,
};
pub use keys::{CacheKey, KEY_DELIMITER};

pub const METRIC_MEMORY_HIT_TOTAL: &str = "siteweave_cache_memory_hit_total";
pub const METRIC_STORE_HIT_TOTAL: &str = "siteweave_cache_store_hit_total";
pub const METRIC_COALESCED_TOTAL: &str = "siteweave_cache_coalesced_total";
pub const METRIC_MISS_TOTAL: &str = "siteweave_cache_miss_total";
pub const METRIC_STORE_ERROR_TOTAL: &str = "siteweave_cache_store_error_total";
pub const METRIC_FETCH_MS: &str = "siteweave_cache_fetch_ms";
