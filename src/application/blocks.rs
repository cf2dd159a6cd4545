//! Content subtree of a single item, prepared for rendering and indexing.

use std::collections::HashSet;

use serde_json::Value;
use tracing::instrument;

use crate::application::error::SiteError;
use crate::application::fetch::PageFetcher;
use crate::domain::record_map::RecordMap;

/// Code-block language labels the renderer's highlighter knows under another name.
const LANGUAGE_ALIASES: &[(&str, &str)] = &[("C++", "cpp"), ("C#", "csharp"), ("Assembly", "asm6502")];

/// Fetches the subtree of `id` through the cache and post-processes it.
///
/// `slice` keeps only the first `n` blocks below the root (document order).
#[instrument(skip(fetcher))]
pub async fn get_post_blocks(
    fetcher: &PageFetcher,
    id: &str,
    slice: Option<usize>,
) -> Result<RecordMap, SiteError> {
    let blocks = fetcher.get_page_with_retry(id).await?;
    Ok(filter_post_blocks(blocks, id, slice))
}

pub fn filter_post_blocks(mut blocks: RecordMap, root_id: &str, slice: Option<usize>) -> RecordMap {
    if let Some(limit) = slice.filter(|limit| *limit > 0) {
        let kept: HashSet<String> = blocks
            .descendants(root_id)
            .into_iter()
            .take(limit)
            .map(|block| block.id.clone())
            .collect();
        blocks
            .block
            .retain(|id, _| id == root_id || kept.contains(id));
    }

    for (id, record) in blocks.block.iter_mut() {
        let Some(block) = record.value.as_mut() else {
            continue;
        };
        if id == root_id {
            block.properties = None;
            continue;
        }
        if block.kind == "code"
            && let Some(language) = block
                .properties
                .as_mut()
                .and_then(|props| props.get_mut("language"))
        {
            map_language(language);
        }
    }

    blocks
}

fn map_language(decorations: &mut Value) {
    let Some(Value::String(label)) = decorations.pointer_mut("/0/0") else {
        return;
    };
    if let Some((_, alias)) = LANGUAGE_ALIASES.iter().find(|(from, _)| *from == label.as_str()) {
        *label = (*alias).to_string();
    }
}
