//! Durable tier backends and their selection.

mod file;
mod http;

use std::sync::Arc;

use tracing::info;

use crate::cache::{BackingStore, CacheConfig, DurableTier, KvBackend, durable_tier};
use crate::config::Settings;
use crate::infra::error::InfraError;

pub use file::FileKvBackend;
pub use http::HttpKvBackend;

/// Backend for an already resolved tier; `None` for the memory-only tier.
pub fn backend_for(
    tier: DurableTier,
    settings: &Settings,
) -> Result<Option<Arc<dyn KvBackend>>, InfraError> {
    let backend: Option<Arc<dyn KvBackend>> = match tier {
        DurableTier::EdgeKv => Some(Arc::new(HttpKvBackend::from_settings(&settings.edge_kv)?)),
        DurableTier::Platform => Some(Arc::new(FileKvBackend::from_settings(
            &settings.platform_cache,
        )?)),
        DurableTier::Local => None,
    };
    Ok(backend)
}

/// Resolves the process-wide durable tier and wraps its backend.
pub fn build_backing_store(settings: &Settings) -> Result<BackingStore, InfraError> {
    let config = CacheConfig::from(&settings.cache);
    let tier = durable_tier(settings.cache.backend, settings.environment_probe());

    let store = match backend_for(tier, settings)? {
        Some(backend) => BackingStore::new(backend, config),
        None => BackingStore::unavailable(config),
    };
    info!(
        tier = tier.as_str(),
        backend = store.backend_name(),
        "Durable cache tier ready"
    );
    Ok(store)
}
