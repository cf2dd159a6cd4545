//! Locates the configuration item among the `Config` view candidates.

use tracing::{debug, info, instrument};

use crate::application::blocks::get_post_blocks;
use crate::application::error::SiteError;
use crate::application::fetch::PageFetcher;
use crate::domain::record_map::RecordMap;

/// Columns a configuration table must declare.
pub const CONFIG_COLUMNS: [&str; 3] = ["name", "value", "type"];

/// Returns the first candidate whose subtree embeds a configuration table.
///
/// A root without `Config` candidates, or whose candidates all lack the
/// table, is a shape violation.
#[instrument(skip(fetcher, candidates), fields(candidates = candidates.len()))]
pub async fn locate_config_page(
    fetcher: &PageFetcher,
    candidates: &[String],
) -> Result<String, SiteError> {
    if candidates.is_empty() {
        return Err(SiteError::shape(
            "no configuration candidates: the root has no `Config` view",
        ));
    }

    for candidate in candidates {
        let blocks = get_post_blocks(fetcher, candidate, None).await?;
        if has_config_table(&blocks, candidate) {
            info!(config_page_id = candidate.as_str(), "Located configuration item");
            return Ok(candidate.clone());
        }
        debug!(candidate = candidate.as_str(), "Candidate has no configuration table");
    }

    Err(SiteError::shape(format!(
        "none of {} configuration candidates embeds a name/value/type table",
        candidates.len()
    )))
}

/// Whether a direct child of `page_id` is an inline collection with the
/// configuration columns.
pub fn has_config_table(blocks: &RecordMap, page_id: &str) -> bool {
    let Some(page) = blocks.block(page_id) else {
        return false;
    };

    page.content
        .iter()
        .filter_map(|child| blocks.block(child))
        .filter(|child| child.is_collection())
        .filter_map(|child| child.collection_id.as_deref())
        .filter_map(|collection_id| blocks.collection(collection_id))
        .any(|collection| {
            CONFIG_COLUMNS
                .iter()
                .all(|name| collection.schema.values().any(|column| column.name == *name))
        })
}
