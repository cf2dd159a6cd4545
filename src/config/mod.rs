//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::{BackendPreference, EnvironmentProbe};

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "siteweave";
const ENV_PREFIX: &str = "SITEWEAVE";
const DEFAULT_POSTS_PER_PAGE: u32 = 12;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_SEARCH_BATCH_SIZE: u32 = 5;
const DEFAULT_REVALIDATE_SECONDS: u64 = 60;
const DEFAULT_KV_TTL_MULTIPLIER: u64 = 3;
const DEFAULT_KV_MIN_EXPIRATION_SECS: u64 = 60;
const DEFAULT_EDGE_KV_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_EDGE_KV_TIMEOUT_SECS: u64 = 5;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub upstream: UpstreamSettings,
    pub cache: CacheSettings,
    pub edge_kv: EdgeKvSettings,
    pub platform_cache: PlatformCacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub root_id: Option<String>,
    pub posts_per_page: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: Option<Url>,
    pub api_token: Option<String>,
    pub timeout: Duration,
    pub fetch_attempts: u32,
    pub retry_delay: Duration,
    pub search_batch_size: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: BackendPreference,
    pub revalidate_seconds: NonZeroU64,
    pub kv_ttl_multiplier: NonZeroU64,
    pub kv_min_expiration_secs: u64,
}

#[derive(Debug, Clone)]
pub struct EdgeKvSettings {
    pub base_url: Url,
    /// Per-request bound; a slower store counts as a miss.
    pub timeout: Duration,
    pub account_id: Option<String>,
    pub namespace_id: Option<String>,
    pub api_token: Option<String>,
}

impl EdgeKvSettings {
    pub fn is_configured(&self) -> bool {
        self.account_id.is_some() && self.namespace_id.is_some() && self.api_token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PlatformCacheSettings {
    pub directory: Option<PathBuf>,
}

impl Settings {
    /// What the configured environment offers for durable caching.
    pub fn environment_probe(&self) -> EnvironmentProbe {
        EnvironmentProbe {
            edge_kv_configured: self.edge_kv.is_configured(),
            platform_cache_configured: self.platform_cache.directory.is_some(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    site: RawSiteSettings,
    upstream: RawUpstreamSettings,
    cache: RawCacheSettings,
    edge_kv: RawEdgeKvSettings,
    platform_cache: RawPlatformCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SiteOverrides) {
        if let Some(root_id) = overrides.root_id.as_ref() {
            self.site.root_id = Some(root_id.clone());
        }
        if let Some(url) = overrides.upstream_base_url.as_ref() {
            self.upstream.base_url = Some(url.clone());
        }
        if let Some(attempts) = overrides.upstream_fetch_attempts {
            self.upstream.fetch_attempts = Some(attempts);
        }
        if let Some(backend) = overrides.cache_backend {
            self.cache.backend = Some(backend);
        }
        if let Some(seconds) = overrides.cache_revalidate_seconds {
            self.cache.revalidate_seconds = Some(seconds);
        }
        if let Some(directory) = overrides.platform_cache_directory.as_ref() {
            self.platform_cache.directory = Some(directory.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            site,
            upstream,
            cache,
            edge_kv,
            platform_cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            site: build_site_settings(site)?,
            upstream: build_upstream_settings(upstream)?,
            cache: build_cache_settings(cache)?,
            edge_kv: build_edge_kv_settings(edge_kv)?,
            platform_cache: build_platform_cache_settings(platform_cache)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let posts_per_page = site.posts_per_page.unwrap_or(DEFAULT_POSTS_PER_PAGE);

    Ok(SiteSettings {
        root_id: non_empty(site.root_id),
        posts_per_page: non_zero_u32(posts_per_page.into(), "site.posts_per_page")?,
    })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let base_url = non_empty(upstream.base_url)
        .map(|value| parse_base_url(&value, "upstream.base_url"))
        .transpose()?;

    let timeout_secs = upstream
        .timeout_seconds
        .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "upstream.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let search_batch_size = upstream
        .search_batch_size
        .unwrap_or(DEFAULT_SEARCH_BATCH_SIZE);

    Ok(UpstreamSettings {
        base_url,
        api_token: non_empty(upstream.api_token),
        timeout: Duration::from_secs(timeout_secs),
        fetch_attempts: upstream.fetch_attempts.unwrap_or(DEFAULT_FETCH_ATTEMPTS),
        retry_delay: Duration::from_millis(
            upstream.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
        ),
        search_batch_size: non_zero_u32(search_batch_size.into(), "upstream.search_batch_size")?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let revalidate_seconds = cache
        .revalidate_seconds
        .unwrap_or(DEFAULT_REVALIDATE_SECONDS);
    let kv_ttl_multiplier = cache.kv_ttl_multiplier.unwrap_or(DEFAULT_KV_TTL_MULTIPLIER);

    Ok(CacheSettings {
        backend: cache.backend.unwrap_or_default(),
        revalidate_seconds: NonZeroU64::new(revalidate_seconds).ok_or_else(|| {
            LoadError::invalid("cache.revalidate_seconds", "must be greater than zero")
        })?,
        kv_ttl_multiplier: NonZeroU64::new(kv_ttl_multiplier).ok_or_else(|| {
            LoadError::invalid("cache.kv_ttl_multiplier", "must be greater than zero")
        })?,
        kv_min_expiration_secs: cache
            .kv_min_expiration_secs
            .unwrap_or(DEFAULT_KV_MIN_EXPIRATION_SECS),
    })
}

fn build_edge_kv_settings(edge_kv: RawEdgeKvSettings) -> Result<EdgeKvSettings, LoadError> {
    let base_url = edge_kv
        .base_url
        .unwrap_or_else(|| DEFAULT_EDGE_KV_BASE_URL.to_string());

    let timeout_secs = edge_kv
        .timeout_seconds
        .unwrap_or(DEFAULT_EDGE_KV_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "edge_kv.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(EdgeKvSettings {
        base_url: parse_base_url(&base_url, "edge_kv.base_url")?,
        timeout: Duration::from_secs(timeout_secs),
        account_id: non_empty(edge_kv.account_id),
        namespace_id: non_empty(edge_kv.namespace_id),
        api_token: non_empty(edge_kv.api_token),
    })
}

fn build_platform_cache_settings(
    platform_cache: RawPlatformCacheSettings,
) -> Result<PlatformCacheSettings, LoadError> {
    let directory = platform_cache
        .directory
        .filter(|path| !path.as_os_str().is_empty());

    Ok(PlatformCacheSettings { directory })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    root_id: Option<String>,
    posts_per_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    base_url: Option<String>,
    api_token: Option<String>,
    timeout_seconds: Option<u64>,
    fetch_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    search_batch_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<BackendPreference>,
    revalidate_seconds: Option<u64>,
    kv_ttl_multiplier: Option<u64>,
    kv_min_expiration_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEdgeKvSettings {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
    account_id: Option<String>,
    namespace_id: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPlatformCacheSettings {
    directory: Option<PathBuf>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Parses a base URL so that relative joins append to its path.
fn parse_base_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let mut url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(LoadError::invalid(key, format!("`{value}` cannot be a base URL")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }

    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;

    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
