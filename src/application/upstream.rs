//! Port to the upstream content service.

use async_trait::async_trait;

use crate::application::error::SiteError;
use crate::domain::record_map::RecordMap;

/// Loads the subtree rooted at an item.
///
/// Failures are transient from the caller's point of view and are retried by
/// [`fetch_with_retry`](crate::application::fetch::fetch_with_retry).
#[async_trait]
pub trait SubtreeSource: Send + Sync {
    async fn fetch_subtree(&self, id: &str) -> Result<RecordMap, SiteError>;
}
