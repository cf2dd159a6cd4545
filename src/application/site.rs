//! Entry point of the site model used by the rendering layer and the CLI.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::application::error::SiteError;
use crate::application::fetch::{PageFetcher, RetryPolicy};
use crate::application::search::{DEFAULT_BATCH_SIZE, SearchService};
use crate::application::upstream::SubtreeSource;
use crate::application::{base_data, blocks, catalog, config_page, slug_index};
use crate::cache::CacheEngine;
use crate::domain::page::{PageRecord, PropertyExtractor, SchemaExtractor};
use crate::domain::record_map::RecordMap;
use crate::domain::search::SearchHit;
use crate::domain::site::{BaseData, SiteData, SlugIndex};
use crate::domain::slug::SlugPolicy;

/// Tunables of the site model beyond the cache itself.
#[derive(Debug, Clone, Copy)]
pub struct SiteOptions {
    pub retry: RetryPolicy,
    pub search_batch_size: usize,
    pub slug_policy: SlugPolicy,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            search_batch_size: DEFAULT_BATCH_SIZE,
            slug_policy: SlugPolicy::default(),
        }
    }
}

/// Outcome of [`SiteServices::warm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub items: usize,
    pub slugs: usize,
    pub published_posts: usize,
    pub indexed_posts: usize,
}

/// Cached views over one upstream content tree.
///
/// Build once at start-up and share; every lookup goes through the
/// [`CacheEngine`] it was built with.
pub struct SiteServices {
    engine: CacheEngine,
    fetcher: Arc<PageFetcher>,
    extractor: Arc<dyn PropertyExtractor>,
    search: SearchService,
    slug_policy: SlugPolicy,
    ttl: u64,
}

impl SiteServices {
    pub fn new(engine: CacheEngine, source: Arc<dyn SubtreeSource>, options: SiteOptions) -> Self {
        let extractor = Arc::new(SchemaExtractor::new(options.slug_policy));
        Self::with_extractor(engine, source, extractor, options)
    }

    pub fn with_extractor(
        engine: CacheEngine,
        source: Arc<dyn SubtreeSource>,
        extractor: Arc<dyn PropertyExtractor>,
        options: SiteOptions,
    ) -> Self {
        let ttl = engine.config().revalidate_seconds;
        let fetcher = Arc::new(PageFetcher::new(&engine, source, options.retry, ttl));
        let search = SearchService::new(
            Arc::clone(&fetcher),
            engine.config().revalidate(),
            options.search_batch_size,
        );

        Self {
            engine,
            fetcher,
            extractor,
            search,
            slug_policy: options.slug_policy,
            ttl,
        }
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    pub async fn get_base_data(&self, root_id: &str) -> Result<BaseData, SiteError> {
        base_data::get_base_data(&self.engine, &self.fetcher, root_id, self.ttl).await
    }

    pub async fn get_post_blocks(
        &self,
        id: &str,
        slice: Option<usize>,
    ) -> Result<RecordMap, SiteError> {
        blocks::get_post_blocks(&self.fetcher, id, slice).await
    }

    pub async fn get_config_page_id(&self, root_id: &str) -> Result<String, SiteError> {
        let base = self.get_base_data(root_id).await?;
        config_page::locate_config_page(&self.fetcher, &base.config_page_ids).await
    }

    pub async fn get_slug_index(&self, root_id: &str) -> Result<SlugIndex, SiteError> {
        slug_index::get_slug_index(
            &self.engine,
            &self.fetcher,
            root_id,
            self.ttl,
            self.slug_policy,
        )
        .await
    }

    /// The published post routed at `slug`, if any.
    #[instrument(skip(self))]
    pub async fn resolve_slug(
        &self,
        root_id: &str,
        slug: &str,
    ) -> Result<Option<PageRecord>, SiteError> {
        let index = self.get_slug_index(root_id).await?;
        let base = self.get_base_data(root_id).await?;
        Ok(slug_index::resolve_slug(
            &index,
            &base,
            self.extractor.as_ref(),
            slug,
        ))
    }

    pub async fn get_site_data(&self, root_id: &str) -> Result<SiteData, SiteError> {
        catalog::get_site_data(
            &self.engine,
            &self.fetcher,
            &self.extractor,
            root_id,
            self.ttl,
        )
        .await
    }

    pub async fn search(&self, root_id: &str, keyword: &str) -> Result<Vec<SearchHit>, SiteError> {
        let site = self.get_site_data(root_id).await?;
        Ok(self.search.search(&site.published_posts, keyword).await)
    }

    /// Builds the search snapshot ahead of the first query.
    pub async fn prewarm_search(&self, root_id: &str) -> Result<usize, SiteError> {
        let site = self.get_site_data(root_id).await?;
        Ok(self.search.prewarm(&site.published_posts).await)
    }

    pub async fn rebuild_search_index(&self, root_id: &str) -> Result<usize, SiteError> {
        let site = self.get_site_data(root_id).await?;
        Ok(self.search.rebuild(&site.published_posts).await.len())
    }

    /// Populates every cached view of the site.
    #[instrument(skip(self))]
    pub async fn warm(&self, root_id: &str) -> Result<WarmReport, SiteError> {
        let base = self.get_base_data(root_id).await?;
        let index = self.get_slug_index(root_id).await?;
        let site = self.get_site_data(root_id).await?;
        let indexed_posts = self.search.prewarm(&site.published_posts).await;

        let report = WarmReport {
            items: base.page_ids.len(),
            slugs: index.len(),
            published_posts: site.published_posts.len(),
            indexed_posts,
        };
        info!(?report, "Warmed site caches");
        Ok(report)
    }

    /// Durable cache keys starting with `prefix`.
    pub async fn cache_keys(&self, prefix: &str) -> Vec<String> {
        self.engine.list(prefix).await
    }

    pub async fn delete_cache_entry(&self, key: &str) -> bool {
        self.engine.delete(key).await
    }
}
