//! Published view of the site: posts, navigation and tags.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::application::base_data::get_base_data;
use crate::application::config_page::locate_config_page;
use crate::application::error::SiteError;
use crate::application::fetch::PageFetcher;
use crate::cache::CacheEngine;
use crate::domain::page::{PageRecord, PropertyExtractor};
use crate::domain::site::{BaseData, SiteData};

pub const CACHE_NAME: &str = "get_site_data";

/// Cached [`SiteData`] of the site rooted at `root_id`.
#[instrument(skip(engine, fetcher, extractor))]
pub async fn get_site_data(
    engine: &CacheEngine,
    fetcher: &Arc<PageFetcher>,
    extractor: &Arc<dyn PropertyExtractor>,
    root_id: &str,
    ttl: u64,
) -> Result<SiteData, SiteError> {
    let inner = engine.clone();
    let fetcher = Arc::clone(fetcher);
    let extractor = Arc::clone(extractor);
    let root = root_id.to_string();
    engine
        .get_or_compute(CACHE_NAME, &(root_id,), ttl, move || async move {
            let base = get_base_data(&inner, &fetcher, &root, ttl).await?;
            let config_page_id = locate_config_page(&fetcher, &base.config_page_ids).await?;
            let pages = parse_pages(&base, Some(config_page_id.as_str()), extractor.as_ref());
            info!(root_id = root.as_str(), pages = pages.len(), "Assembled site data");
            Ok(SiteData::from_pages(pages, Some(config_page_id)))
        })
        .await
}

/// Fully parses every item except the configuration item.
///
/// Items that fail to parse are logged and left out.
pub fn parse_pages(
    base: &BaseData,
    config_page_id: Option<&str>,
    extractor: &dyn PropertyExtractor,
) -> Vec<PageRecord> {
    base.page_ids
        .iter()
        .filter(|id| Some(id.as_str()) != config_page_id)
        .filter_map(|id| match extractor.extract(id, &base.blocks, &base.schema) {
            Ok(page) => Some(page),
            Err(err) => {
                warn!(item_id = id.as_str(), error = %err, "Skipping unparsable item");
                None
            }
        })
        .collect()
}
