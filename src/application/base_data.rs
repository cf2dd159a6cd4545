//! The single upstream read every derived view is computed from.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::error::SiteError;
use crate::application::fetch::PageFetcher;
use crate::cache::CacheEngine;
use crate::domain::record_map::{Block, RecordMap};
use crate::domain::site::BaseData;

pub const CACHE_NAME: &str = "get_whole_site_data";

/// Name of the reserved view listing configuration candidates.
pub const CONFIG_VIEW_NAME: &str = "Config";

/// Cached [`BaseData`] for the site rooted at `root_id`.
#[instrument(skip(engine, fetcher))]
pub async fn get_base_data(
    engine: &CacheEngine,
    fetcher: &Arc<PageFetcher>,
    root_id: &str,
    ttl: u64,
) -> Result<BaseData, SiteError> {
    let fetcher = Arc::clone(fetcher);
    let root = root_id.to_string();
    engine
        .get_or_compute(CACHE_NAME, &(root_id,), ttl, move || async move {
            let blocks = fetcher.get_page_with_retry(&root).await?;
            build_base_data(&root, blocks)
        })
        .await
}

/// Validates the root item and collects the IDs of its collection.
pub fn build_base_data(root_id: &str, blocks: RecordMap) -> Result<BaseData, SiteError> {
    let root = blocks.block(root_id).ok_or_else(|| SiteError::MissingRoot {
        id: root_id.to_string(),
    })?;
    if !root.is_collection() {
        return Err(SiteError::shape(format!(
            "root `{root_id}` is a `{}` block, expected a collection",
            root.kind
        )));
    }

    let collection_id = root_collection_id(root, &blocks).ok_or_else(|| {
        SiteError::shape(format!("root `{root_id}` has no collection"))
    })?;
    let schema = blocks
        .collection(&collection_id)
        .map(|collection| collection.schema.clone())
        .ok_or_else(|| SiteError::shape(format!("collection `{collection_id}` is missing")))?;

    let page_ids = collection_page_ids(&blocks, &collection_id, &root.view_ids);
    let config_page_ids = config_page_ids(&blocks, &collection_id, &root.view_ids);
    debug!(
        root_id,
        pages = page_ids.len(),
        config_candidates = config_page_ids.len(),
        "Collected collection items"
    );

    Ok(BaseData {
        root_id: root_id.to_string(),
        blocks,
        schema,
        page_ids,
        config_page_ids,
    })
}

fn root_collection_id(root: &Block, blocks: &RecordMap) -> Option<String> {
    if let Some(id) = root.collection_id.as_ref() {
        return Some(id.clone());
    }
    blocks.collection.keys().min().cloned()
}

/// Union of all view results, first occurrence order.
pub fn collection_page_ids(blocks: &RecordMap, collection_id: &str, view_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    view_ids
        .iter()
        .flat_map(|view_id| blocks.view_block_ids(collection_id, view_id))
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn config_page_ids(blocks: &RecordMap, collection_id: &str, view_ids: &[String]) -> Vec<String> {
    let mut candidates: Vec<&str> = view_ids.iter().map(String::as_str).collect();
    let mut others: Vec<&str> = blocks
        .collection_view
        .keys()
        .map(String::as_str)
        .filter(|id| !candidates.contains(id))
        .collect();
    others.sort_unstable();
    candidates.extend(others);

    candidates
        .into_iter()
        .find(|view_id| {
            blocks
                .collection_view
                .get(*view_id)
                .and_then(|record| record.value.as_ref())
                .and_then(|view| view.name.as_deref())
                == Some(CONFIG_VIEW_NAME)
        })
        .map(|view_id| blocks.view_block_ids(collection_id, view_id).to_vec())
        .unwrap_or_default()
}
