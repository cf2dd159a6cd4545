//! Site-level snapshots derived from the root collection.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::page::{PageKind, PageRecord, PageStatus};
use super::record_map::{RecordMap, Schema};

/// Number of entries in [`SiteData::latest_posts`].
pub const LATEST_POSTS: usize = 6;

/// Raw upstream snapshot every derived view is computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseData {
    pub root_id: String,
    pub blocks: RecordMap,
    pub schema: Schema,
    /// Item IDs of the root collection, de-duplicated, in view order.
    pub page_ids: Vec<String>,
    /// Items listed in the reserved `Config` view.
    pub config_page_ids: Vec<String>,
}

/// Routing identity of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugEntry {
    pub item_id: String,
    pub kind: Option<PageKind>,
    pub status: Option<PageStatus>,
}

impl SlugEntry {
    pub fn is_published_post(&self) -> bool {
        self.kind == Some(PageKind::Post) && self.status == Some(PageStatus::Published)
    }
}

pub type SlugIndex = HashMap<String, SlugEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOption {
    pub name: String,
    pub count: usize,
}

/// Published view of the site consumed by the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteData {
    pub published_posts: Vec<PageRecord>,
    pub latest_posts: Vec<PageRecord>,
    pub nav_pages: Vec<PageRecord>,
    pub tag_options: Vec<TagOption>,
    pub config_page_id: Option<String>,
}

impl SiteData {
    /// Assembles the site view from fully parsed items.
    ///
    /// Posts are ordered newest first; ties keep upstream order.
    pub fn from_pages(pages: Vec<PageRecord>, config_page_id: Option<String>) -> Self {
        let mut published_posts = Vec::new();
        let mut nav_pages = Vec::new();

        for page in pages {
            if !page.is_published() {
                continue;
            }
            match page.kind {
                Some(PageKind::Post) => published_posts.push(page),
                Some(kind) if kind.is_navigation() => nav_pages.push(page),
                _ => {}
            }
        }

        published_posts.sort_by(|a, b| b.date.cmp(&a.date));
        let latest_posts = published_posts.iter().take(LATEST_POSTS).cloned().collect();
        let tag_options = tag_options(&published_posts);

        Self {
            published_posts,
            latest_posts,
            nav_pages,
            tag_options,
            config_page_id,
        }
    }

    pub fn posts_with_tag(&self, tag: &str) -> Vec<&PageRecord> {
        self.published_posts
            .iter()
            .filter(|post| post.tags.iter().any(|candidate| candidate == tag))
            .collect()
    }

    /// One page of published posts; `page` is 1-based and clamped into range.
    pub fn page(&self, page: usize, per_page: usize) -> &[PageRecord] {
        let per_page = per_page.max(1);
        let pages = self.total_pages(per_page).max(1);
        let page = page.clamp(1, pages);
        let start = (page - 1) * per_page;
        let end = (start + per_page).min(self.published_posts.len());
        &self.published_posts[start.min(end)..end]
    }

    pub fn total_pages(&self, per_page: usize) -> usize {
        self.published_posts.len().div_ceil(per_page.max(1))
    }
}

fn tag_options(posts: &[PageRecord]) -> Vec<TagOption> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for post in posts {
        for tag in &post.tags {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    let mut options: Vec<TagOption> = counts
        .into_iter()
        .map(|(name, count)| TagOption {
            name: name.to_string(),
            count,
        })
        .collect();
    // BTreeMap iteration already orders names; a stable sort keeps that on ties.
    options.sort_by(|a, b| b.count.cmp(&a.count));
    options
}
