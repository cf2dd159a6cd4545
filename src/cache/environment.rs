//! Durable tier selection.
//!
//! The backend is chosen once per process. Later calls observe the first
//! decision even if the configuration they pass differs.

use std::fmt;

use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::info;

static DETECTED_TIER: OnceCell<DurableTier> = OnceCell::new();

/// Configured backend preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    #[default]
    Auto,
    EdgeKv,
    Platform,
    Local,
}

impl std::str::FromStr for BackendPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "edge_kv" | "edge-kv" => Ok(Self::EdgeKv),
            "platform" => Ok(Self::Platform),
            "local" | "none" => Ok(Self::Local),
            other => Err(format!(
                "unknown cache backend `{other}` (expected auto|edge_kv|platform|local)"
            )),
        }
    }
}

/// Resolved durable tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableTier {
    /// Networked edge key-value store.
    EdgeKv,
    /// Platform-managed persistent cache directory.
    Platform,
    /// No durable tier; memory only.
    Local,
}

impl DurableTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurableTier::EdgeKv => "edge_kv",
            DurableTier::Platform => "platform",
            DurableTier::Local => "local",
        }
    }
}

impl fmt::Display for DurableTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the running environment provides.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentProbe {
    pub edge_kv_configured: bool,
    pub platform_cache_configured: bool,
}

/// Pure resolution of a preference against a probe.
pub fn resolve(preference: BackendPreference, probe: EnvironmentProbe) -> DurableTier {
    match preference {
        BackendPreference::EdgeKv => DurableTier::EdgeKv,
        BackendPreference::Platform => DurableTier::Platform,
        BackendPreference::Local => DurableTier::Local,
        BackendPreference::Auto if probe.edge_kv_configured => DurableTier::EdgeKv,
        BackendPreference::Auto if probe.platform_cache_configured => DurableTier::Platform,
        BackendPreference::Auto => DurableTier::Local,
    }
}

/// Process-wide tier, resolved on first use.
pub fn durable_tier(preference: BackendPreference, probe: EnvironmentProbe) -> DurableTier {
    *DETECTED_TIER.get_or_init(|| {
        let tier = resolve(preference, probe);
        info!(
            ?preference,
            tier = tier.as_str(),
            "Selected durable cache tier"
        );
        tier
    })
}
