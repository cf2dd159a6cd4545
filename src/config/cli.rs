use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::cache::BackendPreference;

/// Command-line arguments for the siteweave binary.
#[derive(Debug, Parser)]
#[command(
    name = "siteweave",
    version,
    about = "Cached site model over a remote block/database content service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SITEWEAVE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SiteOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Populate every cached view and the search index.
    Warm,
    /// List published posts, newest first.
    Posts(PostsArgs),
    /// Resolve a slug to its published post.
    Resolve(ResolveArgs),
    /// Full-text search over published posts.
    Search(SearchArgs),
    /// Inspect the durable cache tier.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct PostsArgs {
    /// Only posts carrying this tag.
    #[arg(long, value_name = "TAG")]
    pub tag: Option<String>,

    /// 1-based page number.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub page: usize,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    #[arg(value_name = "SLUG")]
    pub slug: String,
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    #[arg(value_name = "KEYWORD")]
    pub keyword: String,

    /// Rebuild the search index before querying.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub rebuild: bool,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// List durable keys starting with a prefix.
    List {
        #[arg(value_name = "PREFIX", default_value = "")]
        prefix: String,
    },
    /// Delete one key from both cache tiers.
    Delete {
        #[arg(value_name = "KEY")]
        key: String,
    },
}

#[derive(Debug, Args, Default, Clone)]
pub struct SiteOverrides {
    /// Override the root collection ID.
    #[arg(long = "root-id", value_name = "ID", global = true)]
    pub root_id: Option<String>,

    /// Override the upstream subtree endpoint.
    #[arg(long = "upstream-base-url", value_name = "URL", global = true)]
    pub upstream_base_url: Option<String>,

    /// Override the number of upstream fetch attempts.
    #[arg(long = "upstream-fetch-attempts", value_name = "COUNT", global = true)]
    pub upstream_fetch_attempts: Option<u32>,

    /// Override the durable cache backend (auto|edge_kv|platform|local).
    #[arg(long = "cache-backend", value_name = "BACKEND", global = true)]
    pub cache_backend: Option<BackendPreference>,

    /// Override the freshness window in seconds.
    #[arg(long = "cache-revalidate-seconds", value_name = "SECONDS", global = true)]
    pub cache_revalidate_seconds: Option<u64>,

    /// Override the platform cache directory.
    #[arg(long = "platform-cache-directory", value_name = "PATH", global = true)]
    pub platform_cache_directory: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}
