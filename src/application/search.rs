//! In-process full-text search over published posts.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::application::blocks::get_post_blocks;
use crate::application::fetch::PageFetcher;
use crate::domain::page::PageRecord;
use crate::domain::search::{
    SearchHit, SearchIndex, SearchIndexEntry, content_fragments, indexed_snippets,
    metadata_snippets, normalize_keyword,
};

/// Upper bound on concurrent subtree fetches while building.
pub const DEFAULT_BATCH_SIZE: usize = 5;

struct Snapshot {
    index: Arc<SearchIndex>,
    expires: Instant,
    fingerprint: String,
}

impl Snapshot {
    fn serves(&self, fingerprint: &str, now: Instant) -> bool {
        now < self.expires && self.fingerprint == fingerprint
    }
}

/// Owns the search index snapshot of this process.
///
/// The snapshot is rebuilt when its window lapses or the set of published
/// posts changes. Concurrent searches wait on one build.
pub struct SearchService {
    fetcher: Arc<PageFetcher>,
    window: Duration,
    batch_size: usize,
    snapshot: Mutex<Option<Snapshot>>,
}

impl SearchService {
    pub fn new(fetcher: Arc<PageFetcher>, window: Duration, batch_size: usize) -> Self {
        Self {
            fetcher,
            window,
            batch_size: batch_size.max(1),
            snapshot: Mutex::new(None),
        }
    }

    /// Posts matching `keyword`, in input order, with up to three snippets each.
    #[instrument(skip(self, posts), fields(posts = posts.len()))]
    pub async fn search(&self, posts: &[PageRecord], keyword: &str) -> Vec<SearchHit> {
        let Some(keyword) = normalize_keyword(keyword) else {
            return Vec::new();
        };
        let index = self.index_for(posts).await;

        let hits: Vec<SearchHit> = posts
            .iter()
            .filter(|post| post.is_published_post())
            .filter_map(|post| {
                let snippets = match index.get(&post.id) {
                    Some(entry) => indexed_snippets(entry, &keyword),
                    None => metadata_snippets(post, &keyword),
                };
                (!snippets.is_empty()).then(|| SearchHit {
                    page: post.clone(),
                    snippets,
                })
            })
            .collect();

        debug!(keyword = keyword.as_str(), hits = hits.len(), "Search finished");
        hits
    }

    /// Builds the snapshot now unless a valid one is already held.
    pub async fn prewarm(&self, posts: &[PageRecord]) -> usize {
        info!("Pre-warming search index");
        self.index_for(posts).await.len()
    }

    /// Replaces the snapshot with a fresh build regardless of its validity.
    pub async fn rebuild(&self, posts: &[PageRecord]) -> Arc<SearchIndex> {
        let fingerprint = fingerprint(posts);
        let mut snapshot = self.snapshot.lock().await;
        let index = Arc::new(self.build_index(posts).await);
        *snapshot = Some(Snapshot {
            index: Arc::clone(&index),
            expires: Instant::now() + self.window,
            fingerprint,
        });
        index
    }

    async fn index_for(&self, posts: &[PageRecord]) -> Arc<SearchIndex> {
        let fingerprint = fingerprint(posts);
        let mut snapshot = self.snapshot.lock().await;

        if let Some(current) = snapshot.as_ref()
            && current.serves(&fingerprint, Instant::now())
        {
            debug!("Search index snapshot hit");
            return Arc::clone(&current.index);
        }

        info!("Search index snapshot missing or stale, rebuilding");
        let index = Arc::new(self.build_index(posts).await);
        *snapshot = Some(Snapshot {
            index: Arc::clone(&index),
            expires: Instant::now() + self.window,
            fingerprint,
        });
        index
    }

    async fn build_index(&self, posts: &[PageRecord]) -> SearchIndex {
        let published: Vec<&PageRecord> =
            posts.iter().filter(|post| post.is_published_post()).collect();
        info!(posts = published.len(), "Building search index");

        let mut index = SearchIndex::with_capacity(published.len());
        for batch in published.chunks(self.batch_size) {
            let entries = join_all(batch.iter().map(|post| self.build_entry(post))).await;
            for entry in entries.into_iter().flatten() {
                index.insert(entry.id.clone(), entry);
            }
        }

        info!(
            entries = index.len(),
            skipped = published.len().saturating_sub(index.len()),
            "Built search index"
        );
        index
    }

    /// `None` when the content cannot be fetched; such posts are matched on
    /// metadata until a later build indexes them.
    async fn build_entry(&self, post: &PageRecord) -> Option<SearchIndexEntry> {
        match get_post_blocks(&self.fetcher, &post.id, None).await {
            Ok(blocks) => Some(SearchIndexEntry::new(
                post,
                content_fragments(&blocks, &post.id),
            )),
            Err(err) => {
                warn!(post_id = post.id.as_str(), error = %err, "Leaving post out of search index");
                None
            }
        }
    }
}

/// Sorted, comma-joined IDs of the published posts.
pub fn fingerprint(posts: &[PageRecord]) -> String {
    let mut ids: Vec<&str> = posts
        .iter()
        .filter(|post| post.is_published_post())
        .map(|post| post.id.as_str())
        .collect();
    ids.sort_unstable();
    ids.join(",")
}
