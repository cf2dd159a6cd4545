//! Slug → item routing index.

use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::application::base_data::get_base_data;
use crate::application::config_page::locate_config_page;
use crate::application::error::SiteError;
use crate::application::fetch::PageFetcher;
use crate::cache::CacheEngine;
use crate::domain::page::{PageKind, PageRecord, PageStatus, PropertyExtractor, SchemaExtractor};
use crate::domain::site::{BaseData, SlugEntry, SlugIndex};
use crate::domain::slug::SlugPolicy;

pub const CACHE_NAME: &str = "get_slug_index";

/// Cached slug index of the site rooted at `root_id`.
#[instrument(skip(engine, fetcher, policy))]
pub async fn get_slug_index(
    engine: &CacheEngine,
    fetcher: &Arc<PageFetcher>,
    root_id: &str,
    ttl: u64,
    policy: SlugPolicy,
) -> Result<SlugIndex, SiteError> {
    let inner = engine.clone();
    let fetcher = Arc::clone(fetcher);
    let root = root_id.to_string();
    engine
        .get_or_compute(CACHE_NAME, &(root_id,), ttl, move || async move {
            let base = get_base_data(&inner, &fetcher, &root, ttl).await?;
            let config_page_id = locate_config_page(&fetcher, &base.config_page_ids).await?;
            Ok(build_slug_index(&base, Some(config_page_id.as_str()), &policy))
        })
        .await
}

/// Reads slug, type and status of every item except the configuration item.
///
/// The first item claiming a slug keeps it.
pub fn build_slug_index(
    base: &BaseData,
    config_page_id: Option<&str>,
    policy: &SlugPolicy,
) -> SlugIndex {
    let mut index = SlugIndex::with_capacity(base.page_ids.len());

    for id in &base.page_ids {
        if Some(id.as_str()) == config_page_id {
            continue;
        }
        let column = |name: &str| SchemaExtractor::text_column(&base.blocks, id, &base.schema, name);
        let slug = policy.normalize(&column("slug"), id);
        let entry = SlugEntry {
            item_id: id.clone(),
            kind: column("type").parse::<PageKind>().ok(),
            status: column("status").parse::<PageStatus>().ok(),
        };

        match index.entry(slug) {
            Entry::Occupied(existing) => {
                debug!(
                    slug = existing.key().as_str(),
                    kept = existing.get().item_id.as_str(),
                    dropped = id.as_str(),
                    "Duplicate slug"
                );
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
    }

    index
}

/// Resolves a slug to a published post.
///
/// Items missing from `index` (created after it was built) are found by a
/// full scan over `base`.
pub fn resolve_slug(
    index: &SlugIndex,
    base: &BaseData,
    extractor: &dyn PropertyExtractor,
    slug: &str,
) -> Option<PageRecord> {
    if let Some(entry) = index.get(slug) {
        if !entry.is_published_post() {
            return None;
        }
        return match extractor.extract(&entry.item_id, &base.blocks, &base.schema) {
            Ok(page) => Some(page),
            Err(err) => {
                warn!(item_id = entry.item_id.as_str(), error = %err, "Failed to parse indexed item");
                None
            }
        };
    }

    debug!(slug, "Slug not indexed, scanning all items");
    base.page_ids.iter().find_map(|id| {
        match extractor.extract(id, &base.blocks, &base.schema) {
            Ok(page) if page.slug == slug && page.is_published_post() => Some(page),
            Ok(_) => None,
            Err(err) => {
                warn!(item_id = id.as_str(), error = %err, "Skipping unparsable item");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::base_data::build_base_data;
    use crate::domain::record_map::{Block, RecordMapBuilder, text_property};

    const SCHEMA: &[(&str, &str, &str)] = &[
        ("t", "title", "title"),
        ("s", "slug", "text"),
        ("k", "type", "select"),
        ("u", "status", "select"),
    ];

    fn item(id: &str, slug: &str, kind: &str, status: &str) -> Block {
        Block::new(id, "page")
            .with_property("t", text_property(id))
            .with_property("s", text_property(slug))
            .with_property("k", text_property(kind))
            .with_property("u", text_property(status))
    }

    fn base(ids: &[&str], blocks: Vec<Block>) -> BaseData {
        let mut builder =
            RecordMapBuilder::new().database("root", "coll", SCHEMA, &[("v", "All", ids)]);
        for block in blocks {
            builder = builder.block(block);
        }
        build_base_data("root", builder.build()).expect("base data")
    }

    #[test]
    fn first_slug_wins_and_config_item_is_skipped() {
        let base = base(
            &["a", "b", "cfg"],
            vec![
                item("a", "hello", "Post", "Published"),
                item("b", "hello", "Post", "Draft"),
                item("cfg", "config", "Config", "Published"),
            ],
        );

        let index = build_slug_index(&base, Some("cfg"), &SlugPolicy::default());

        assert_eq!(index.len(), 1);
        assert_eq!(index["hello"].item_id, "a");
        assert!(index["hello"].is_published_post());
    }

    #[test]
    fn empty_slug_falls_back_to_item_id() {
        let base = base(&["abc"], vec![item("abc", "", "Page", "Published")]);
        let index = build_slug_index(&base, None, &SlugPolicy::default());
        assert_eq!(index["abc"].kind, Some(PageKind::Page));
    }

    #[test]
    fn indexed_non_posts_do_not_resolve() {
        let base = base(
            &["a", "b"],
            vec![
                item("a", "about", "Page", "Published"),
                item("b", "draft", "Post", "Draft"),
            ],
        );
        let index = build_slug_index(&base, None, &SlugPolicy::default());
        let extractor = SchemaExtractor::default();

        assert!(resolve_slug(&index, &base, &extractor, "about").is_none());
        assert!(resolve_slug(&index, &base, &extractor, "draft").is_none());
    }

    #[test]
    fn unindexed_slug_is_found_by_scan() {
        let stale = base(&["a"], vec![item("a", "old", "Post", "Published")]);
        let index = build_slug_index(&stale, None, &SlugPolicy::default());

        let fresh = base(
            &["a", "n"],
            vec![
                item("a", "old", "Post", "Published"),
                item("n", "new-post", "Post", "Published"),
            ],
        );
        let extractor = SchemaExtractor::default();

        let page = resolve_slug(&index, &fresh, &extractor, "new-post").expect("scan hit");
        assert_eq!(page.id, "n");
        assert!(resolve_slug(&index, &fresh, &extractor, "missing").is_none());
    }
}
