use std::{process, sync::Arc};

use serde::Serialize;
use siteweave::{
    application::{AppError, SiteOptions, SiteServices, error::error_chain, fetch::RetryPolicy},
    cache::{CacheConfig, CacheEngine},
    config::{self, CacheCommand, Command, PostsArgs, Settings},
    domain::page::PageRecord,
    infra::{error::InfraError, kv, telemetry, upstream::HttpSubtreeSource},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let chain = error_chain(error);
    if dispatcher::has_been_set() {
        error!(error = %error, ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, ?chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args.command.unwrap_or(Command::Warm);

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let engine = build_engine(&settings)?;

    match command {
        Command::Cache(args) => run_cache(&engine, args.command).await,
        command => {
            let root_id = settings
                .site
                .root_id
                .clone()
                .ok_or_else(|| InfraError::configuration("site.root_id is required"))?;
            let services = build_services(&settings, engine)?;
            run_site_command(&services, &settings, &root_id, command).await
        }
    }
}

fn build_engine(settings: &Settings) -> Result<CacheEngine, AppError> {
    let store = kv::build_backing_store(settings)?;
    Ok(CacheEngine::new(store, CacheConfig::from(&settings.cache)))
}

fn build_services(settings: &Settings, engine: CacheEngine) -> Result<SiteServices, AppError> {
    let source = HttpSubtreeSource::from_settings(&settings.upstream)?;
    let options = SiteOptions {
        retry: RetryPolicy {
            attempts: settings.upstream.fetch_attempts,
            delay: settings.upstream.retry_delay,
        },
        search_batch_size: settings.upstream.search_batch_size.get() as usize,
        ..SiteOptions::default()
    };
    Ok(SiteServices::new(engine, Arc::new(source), options))
}

async fn run_site_command(
    services: &SiteServices,
    settings: &Settings,
    root_id: &str,
    command: Command,
) -> Result<(), AppError> {
    match command {
        Command::Warm => {
            let report = services.warm(root_id).await?;
            print_json(&report)
        }
        Command::Posts(args) => run_posts(services, settings, root_id, args).await,
        Command::Resolve(args) => match services.resolve_slug(root_id, &args.slug).await? {
            Some(page) => print_json(&page),
            None => Err(AppError::not_found(format!("post `{}`", args.slug))),
        },
        Command::Search(args) => {
            if args.rebuild {
                let entries = services.rebuild_search_index(root_id).await?;
                info!(entries, "Rebuilt search index");
            }
            let hits = services.search(root_id, &args.keyword).await?;
            print_json(&hits)
        }
        Command::Cache(args) => run_cache(services.engine(), args.command).await,
    }
}

#[derive(Serialize)]
struct PostListing<'a> {
    page: usize,
    total_pages: usize,
    posts: Vec<&'a PageRecord>,
}

async fn run_posts(
    services: &SiteServices,
    settings: &Settings,
    root_id: &str,
    args: PostsArgs,
) -> Result<(), AppError> {
    let site = services.get_site_data(root_id).await?;
    let per_page = settings.site.posts_per_page.get() as usize;

    let listing = match args.tag.as_deref() {
        Some(tag) => {
            let tagged = site.posts_with_tag(tag);
            let total_pages = tagged.len().div_ceil(per_page).max(1);
            let page = args.page.clamp(1, total_pages);
            PostListing {
                page,
                total_pages,
                posts: tagged
                    .into_iter()
                    .skip((page - 1) * per_page)
                    .take(per_page)
                    .collect(),
            }
        }
        None => {
            let total_pages = site.total_pages(per_page).max(1);
            let page = args.page.clamp(1, total_pages);
            PostListing {
                page,
                total_pages,
                posts: site.page(page, per_page).iter().collect(),
            }
        }
    };
    print_json(&listing)
}

async fn run_cache(engine: &CacheEngine, command: CacheCommand) -> Result<(), AppError> {
    match command {
        CacheCommand::List { prefix } => {
            let keys = engine.list(&prefix).await;
            print_json(&keys)
        }
        CacheCommand::Delete { key } => {
            // Without a durable tier only the memory slot is dropped.
            if engine.delete(&key).await || !engine.store().is_available() {
                info!(key = key.as_str(), "Deleted cache entry");
                Ok(())
            } else {
                Err(AppError::unexpected(format!("failed to delete `{key}`")))
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{encoded}");
    Ok(())
}
