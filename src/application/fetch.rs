//! Retrying subtree fetch, cached per item ID.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{error, info, warn};

use crate::application::error::SiteError;
use crate::application::upstream::SubtreeSource;
use crate::cache::{CacheEngine, Cached};
use crate::domain::record_map::RecordMap;

pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_FETCH_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Calls the upstream at most `policy.attempts` times, sleeping `policy.delay`
/// between failed attempts.
pub async fn fetch_with_retry(
    source: &dyn SubtreeSource,
    id: &str,
    policy: RetryPolicy,
) -> Result<RecordMap, SiteError> {
    for attempt in 1..=policy.attempts {
        let remaining = policy.attempts - attempt;
        info!(page_id = id, attempt, remaining, "Requesting subtree");

        match source.fetch_subtree(id).await {
            Ok(blocks) => return Ok(blocks),
            Err(err) => {
                warn!(page_id = id, attempt, remaining, error = %err, "Subtree request failed");
                if remaining > 0 {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    error!(page_id = id, attempts = policy.attempts, "Subtree request exhausted retries");
    Err(SiteError::FetchExhausted {
        id: id.to_string(),
        attempts: policy.attempts,
    })
}

type SubtreeFn =
    Box<dyn Fn((String,)) -> BoxFuture<'static, Result<RecordMap, SiteError>> + Send + Sync>;

/// Cached `get_page_with_retry`, keyed on the item ID alone.
pub struct PageFetcher {
    cached: Cached<(String,), RecordMap, SiteError, SubtreeFn>,
}

impl PageFetcher {
    pub const CACHE_NAME: &'static str = "get_page_with_retry";

    pub fn new(
        engine: &CacheEngine,
        source: Arc<dyn SubtreeSource>,
        policy: RetryPolicy,
        ttl: u64,
    ) -> Self {
        let compute: SubtreeFn = Box::new(move |(id,): (String,)| {
            let source = Arc::clone(&source);
            async move { fetch_with_retry(source.as_ref(), &id, policy).await }.boxed()
        });

        Self {
            cached: engine.wrap(Self::CACHE_NAME, ttl, compute),
        }
    }

    pub async fn get_page_with_retry(&self, id: &str) -> Result<RecordMap, SiteError> {
        self.cached.call((id.to_string(),)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::cache::CacheConfig;

    struct FlakySource {
        calls: AtomicU32,
        failures: u32,
    }

    impl FlakySource {
        fn new(failures: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
            }
        }
    }

    #[async_trait]
    impl SubtreeSource for FlakySource {
        async fn fetch_subtree(&self, id: &str) -> Result<RecordMap, SiteError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(SiteError::upstream(id, "connection reset"));
            }
            Ok(RecordMap::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_exact_attempts() {
        let source = FlakySource::new(u32::MAX);
        let started = Instant::now();

        let err = fetch_with_retry(&source, "abc", RetryPolicy::default())
            .await
            .expect_err("all attempts fail");

        assert_eq!(
            err,
            SiteError::FetchExhausted {
                id: "abc".into(),
                attempts: 3
            }
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let source = FlakySource::new(2);
        let started = Instant::now();

        fetch_with_retry(&source, "abc", RetryPolicy::default())
            .await
            .expect("third attempt succeeds");

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn zero_attempts_fail_without_calling_upstream() {
        let source = FlakySource::new(0);
        let policy = RetryPolicy {
            attempts: 0,
            delay: Duration::ZERO,
        };

        let err = fetch_with_retry(&source, "abc", policy)
            .await
            .expect_err("no budget");
        assert!(matches!(err, SiteError::FetchExhausted { attempts: 0, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_fetch_retries_once_per_key() {
        let source = Arc::new(FlakySource::new(1));
        let engine = CacheEngine::memory_only(CacheConfig::default());
        let fetcher = PageFetcher::new(&engine, source.clone(), RetryPolicy::default(), 60);

        let (first, second) = tokio::join!(
            fetcher.get_page_with_retry("abc"),
            fetcher.get_page_with_retry("abc")
        );
        first.expect("first");
        second.expect("second");
        fetcher.get_page_with_retry("abc").await.expect("memory hit");

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
