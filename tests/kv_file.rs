use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use siteweave::application::SiteError;
use siteweave::cache::{BackingStore, CacheConfig, CacheEngine, KvBackend};
use siteweave::infra::kv::FileKvBackend;
use tempfile::TempDir;

#[tokio::test]
async fn values_survive_a_new_backend_instance() {
    let dir = TempDir::new().expect("tempdir");
    FileKvBackend::new(dir.path())
        .put_raw("get_site_data:[\"root\"]", b"{}".to_vec(), 60)
        .await
        .expect("put");

    let reopened = FileKvBackend::new(dir.path());
    assert_eq!(
        reopened
            .get_raw("get_site_data:[\"root\"]")
            .await
            .expect("get")
            .as_deref(),
        Some(b"{}".as_slice())
    );
    assert_eq!(reopened.get_raw("other").await.expect("get"), None);
}

#[tokio::test]
async fn expired_records_read_as_absent_and_are_removed() {
    let dir = TempDir::new().expect("tempdir");
    let backend = FileKvBackend::new(dir.path());
    backend
        .put_raw("short", b"1".to_vec(), 0)
        .await
        .expect("put");

    assert_eq!(backend.get_raw("short").await.expect("get"), None);
    let remaining = std::fs::read_dir(dir.path()).expect("read dir").count();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn list_filters_by_prefix_and_delete_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let backend = FileKvBackend::new(dir.path());
    for key in [
        "get_page_with_retry:[\"a\"]",
        "get_page_with_retry:[\"b\"]",
        "get_slug_index:[\"r\"]",
    ] {
        backend.put_raw(key, b"0".to_vec(), 60).await.expect("put");
    }

    let mut keys = backend.list("get_page_with_retry").await.expect("list");
    keys.sort();
    assert_eq!(keys, ["get_page_with_retry:[\"a\"]", "get_page_with_retry:[\"b\"]"]);

    backend.delete("get_slug_index:[\"r\"]").await.expect("delete");
    backend.delete("get_slug_index:[\"r\"]").await.expect("delete twice");
    assert!(backend.list("get_slug_index").await.expect("list").is_empty());
}

#[tokio::test]
async fn list_skips_undecodable_files() {
    let dir = TempDir::new().expect("tempdir");
    let backend = FileKvBackend::new(dir.path());
    backend
        .put_raw("get_site_data:[\"root\"]", b"{}".to_vec(), 60)
        .await
        .expect("put");
    std::fs::write(dir.path().join("garbage.json"), b"not json").expect("write");

    assert_eq!(
        backend.list("get_site_data").await.expect("list"),
        ["get_site_data:[\"root\"]"]
    );

    let store = BackingStore::new(Arc::new(backend), CacheConfig::default());
    assert_eq!(store.list("get_site_data").await, ["get_site_data:[\"root\"]"]);
}

#[tokio::test]
async fn missing_directory_lists_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let backend = FileKvBackend::new(dir.path().join("not-yet"));
    assert!(backend.list("").await.expect("list").is_empty());
}

#[tokio::test]
async fn engine_serves_durable_hits_after_memory_is_cleared() {
    let dir = TempDir::new().expect("tempdir");
    let config = CacheConfig::default();
    let store = BackingStore::new(Arc::new(FileKvBackend::new(dir.path())), config.clone());
    let engine = CacheEngine::new(store, config.clone());
    let computed = Arc::new(AtomicUsize::new(0));

    let compute = |computed: Arc<AtomicUsize>| {
        move || async move {
            computed.fetch_add(1, Ordering::SeqCst);
            Ok::<_, SiteError>(vec!["hello".to_string()])
        }
    };

    let first = engine
        .get_or_compute("greeting", &("en",), 60, compute(Arc::clone(&computed)))
        .await
        .expect("first");
    engine.clear_memory();
    let second = engine
        .get_or_compute("greeting", &("en",), 60, compute(Arc::clone(&computed)))
        .await
        .expect("second");

    assert_eq!(first, second);
    assert_eq!(computed.load(Ordering::SeqCst), 1);

    // A fresh engine over the same directory behaves like a restarted process.
    let restarted = CacheEngine::new(
        BackingStore::new(Arc::new(FileKvBackend::new(dir.path())), config.clone()),
        config,
    );
    let third = restarted
        .get_or_compute("greeting", &("en",), 60, compute(Arc::clone(&computed)))
        .await
        .expect("third");
    assert_eq!(third, first);
    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert_eq!(restarted.list("greeting").await, ["greeting:[\"en\"]"]);
}
