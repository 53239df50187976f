//! Integration tests for indexing through a DackBoxContext
//!
//! - Commits reach the search index and their dirty markers are acked
//! - Startup bootstrap: full rebuild without a sentinel, dirty replay with one
//! - Records that fail to index during a rebuild stay dirty and are retried
//! - Explicit close and on-disk configuration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dackbox_core::{BucketRegistry, Error, KvStore, Record, Result};
use dackbox_engine::{
    remove_reindex_markers, DackBox, DackBoxConfig, DackBoxContext, Deleter, IndexingConfig,
    InitializedBucket, Upserter, CONFIG_FILE_NAME,
};
use dackbox_index::{
    Indexer, MemoryIndex, Query, RecordWrapper, SearchIndex, WrappedIndex, WrapperRegistry,
};
use dackbox_storage::RecordStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Image {
    id: String,
    name: String,
}

impl Record for Image {
    fn id(&self) -> &str {
        &self.id
    }
}

fn image(id: &str, name: &str) -> Image {
    Image {
        id: id.to_string(),
        name: name.to_string(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config() -> DackBoxConfig {
    DackBoxConfig {
        indexing: IndexingConfig {
            ack_interval_ms: 10,
            max_batch_size: 100,
        },
        ..Default::default()
    }
}

fn buckets() -> BucketRegistry {
    BucketRegistry::new().with_bucket(b"image", "images").unwrap()
}

fn search_stack() -> (Arc<WrappedIndex>, Arc<MemoryIndex>) {
    let wrappers = Arc::new(WrapperRegistry::new());
    wrappers.register_wrapper(b"image", Arc::new(RecordWrapper::<Image>::new("images")));
    let index = Arc::new(MemoryIndex::new());
    (Arc::new(WrappedIndex::new(wrappers, index.clone())), index)
}

fn initialized() -> Vec<InitializedBucket> {
    vec![InitializedBucket::new(b"image", "images")]
}

/// Fails the first attempt to index `key`, then delegates
struct FailOnce {
    inner: Arc<WrappedIndex>,
    key: Vec<u8>,
    failed: AtomicBool,
}

impl FailOnce {
    fn new(inner: Arc<WrappedIndex>, key: &[u8]) -> Self {
        Self {
            inner,
            key: key.to_vec(),
            failed: AtomicBool::new(false),
        }
    }
}

impl Indexer for FailOnce {
    fn index(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key == self.key.as_slice() && !self.failed.swap(true, Ordering::SeqCst) {
            return Err(Error::store("index unavailable"));
        }
        self.inner.index(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.delete(key)
    }
}

/// Commit records through a DackBox with no indexer attached, leaving them dirty
fn write_offline(store: Arc<dyn KvStore>, upserts: &[Image], deletes: &[&str]) {
    let dackbox = DackBox::open(store, config(), buckets()).unwrap();
    let mut txn = dackbox.new_transaction().unwrap();
    for record in upserts {
        Upserter::<Image>::new(b"image").upsert(&mut txn, record).unwrap();
    }
    for id in deletes {
        Deleter::new(b"image").delete(&mut txn, id).unwrap();
    }
    txn.commit().unwrap();
}

// ============================================================================
// Live indexing
// ============================================================================

#[test]
fn test_commits_are_indexed_and_acked() {
    init_tracing();
    let (indexer, index) = search_stack();
    let context = DackBoxContext::open(
        config(),
        Arc::new(RecordStore::ephemeral()),
        buckets(),
        indexer,
    )
    .unwrap();
    let dackbox = context.dackbox();

    let mut txn = dackbox.new_transaction().unwrap();
    let upserter = Upserter::<Image>::new(b"image");
    upserter.upsert(&mut txn, &image("i1", "nginx")).unwrap();
    upserter.upsert(&mut txn, &image("i2", "redis")).unwrap();
    txn.commit().unwrap();

    assert!(context.wait_indexed(TIMEOUT));
    assert_eq!(
        index.get("images", "i1").unwrap(),
        Some(json!({"id": "i1", "name": "nginx"}))
    );
    assert_eq!(
        index
            .search("images", &Query::matching("name", "redis"))
            .unwrap(),
        vec!["i2"]
    );
    assert!(dackbox.get_keys_to_index().unwrap().is_empty());

    let mut txn = dackbox.new_transaction().unwrap();
    Deleter::new(b"image").delete(&mut txn, "i1").unwrap();
    txn.commit().unwrap();
    assert!(context.wait_indexed(TIMEOUT));
    assert_eq!(index.count("images").unwrap(), 1);
    assert!(dackbox.get_keys_to_index().unwrap().is_empty());

    context.close().unwrap();
}

// ============================================================================
// Bootstrap
// ============================================================================

#[test]
fn test_missing_sentinel_rebuilds_bucket() {
    init_tracing();
    let store: Arc<dyn KvStore> = Arc::new(RecordStore::ephemeral());
    write_offline(
        Arc::clone(&store),
        &[image("i1", "nginx"), image("i2", "redis")],
        &[],
    );

    let (indexer, index) = search_stack();
    index.index("images", "stale", json!({"name": "gone"})).unwrap();
    let context = DackBoxContext::open(config(), store, buckets(), indexer).unwrap();

    let reports = context
        .init(&initialized(), Some(&*index), TIMEOUT)
        .unwrap();
    assert!(reports[0].full_rebuild);
    assert_eq!(reports[0].queued, 2);
    assert_eq!(
        index.search("images", &Query::All).unwrap(),
        vec!["i1", "i2"]
    );
    assert!(context.dackbox().get_keys_to_index().unwrap().is_empty());

    // The sentinel is now set and nothing is dirty
    let reports = context
        .init(&initialized(), Some(&*index), TIMEOUT)
        .unwrap();
    assert!(!reports[0].full_rebuild);
    assert_eq!(reports[0].queued, 0);
}

#[test]
fn test_sentinel_present_replays_only_dirty_keys() {
    init_tracing();
    let store: Arc<dyn KvStore> = Arc::new(RecordStore::ephemeral());
    let (indexer, index) = search_stack();
    // Stays open: closing it would close the shared store
    let first =
        DackBoxContext::open(config(), Arc::clone(&store), buckets(), indexer.clone()).unwrap();
    let mut txn = first.dackbox().new_transaction().unwrap();
    let upserter = Upserter::<Image>::new(b"image");
    for (id, name) in [("i1", "nginx"), ("i2", "redis"), ("i3", "mysql")] {
        upserter.upsert(&mut txn, &image(id, name)).unwrap();
    }
    txn.commit().unwrap();
    first.init(&initialized(), Some(&*index), TIMEOUT).unwrap();
    assert!(first.wait_indexed(TIMEOUT));
    first.indexer().stop();

    // Written while no indexer runs: i2 changes, i3 goes away
    write_offline(Arc::clone(&store), &[image("i2", "postgres")], &["i3"]);

    let context = DackBoxContext::open(config(), store, buckets(), indexer).unwrap();
    let reports = context
        .init(&initialized(), Some(&*index), TIMEOUT)
        .unwrap();
    assert!(!reports[0].full_rebuild);
    assert_eq!(reports[0].queued, 2);
    assert_eq!(
        index.get("images", "i2").unwrap(),
        Some(json!({"id": "i2", "name": "postgres"}))
    );
    assert_eq!(index.get("images", "i3").unwrap(), None);
    assert_eq!(
        index.search("images", &Query::All).unwrap(),
        vec!["i1", "i2"]
    );
    assert!(context.dackbox().get_keys_to_index().unwrap().is_empty());
}

#[test]
fn test_failed_record_survives_full_rebuild() {
    init_tracing();
    let store: Arc<dyn KvStore> = Arc::new(RecordStore::ephemeral());
    write_offline(
        Arc::clone(&store),
        &[image("i1", "nginx"), image("i2", "redis")],
        &[],
    );

    let (wrapped, index) = search_stack();
    let indexer = Arc::new(FailOnce::new(wrapped, b"image\0i1"));
    let context = DackBoxContext::open(config(), store, buckets(), indexer).unwrap();

    let reports = context
        .init(&initialized(), Some(&*index), TIMEOUT)
        .unwrap();
    assert!(reports[0].full_rebuild);
    assert_eq!(reports[0].queued, 2);
    assert_eq!(reports[0].failed, 1);
    assert_eq!(index.search("images", &Query::All).unwrap(), vec!["i2"]);
    assert_eq!(
        context.dackbox().get_keys_to_index().unwrap(),
        vec![b"image\0i1".to_vec()]
    );

    // No sentinel was written, so the next start rebuilds again
    let reports = context
        .init(&initialized(), Some(&*index), TIMEOUT)
        .unwrap();
    assert!(reports[0].full_rebuild);
    assert_eq!(reports[0].failed, 0);
    assert_eq!(
        index.search("images", &Query::All).unwrap(),
        vec!["i1", "i2"]
    );
    assert!(context.dackbox().get_keys_to_index().unwrap().is_empty());

    let reports = context
        .init(&initialized(), Some(&*index), TIMEOUT)
        .unwrap();
    assert!(!reports[0].full_rebuild);
    assert_eq!(reports[0].queued, 0);
}

#[test]
fn test_removed_markers_force_full_rebuild() {
    init_tracing();
    let (indexer, index) = search_stack();
    let context = DackBoxContext::open(
        config(),
        Arc::new(RecordStore::ephemeral()),
        buckets(),
        indexer,
    )
    .unwrap();
    context.init(&initialized(), None, TIMEOUT).unwrap();

    remove_reindex_markers(context.dackbox(), &initialized()).unwrap();
    let reports = context
        .init(&initialized(), Some(&*index), TIMEOUT)
        .unwrap();
    assert!(reports[0].full_rebuild);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_close_is_idempotent_and_stops_indexing() {
    let (indexer, _) = search_stack();
    let context = DackBoxContext::open(
        config(),
        Arc::new(RecordStore::ephemeral()),
        buckets(),
        indexer,
    )
    .unwrap();
    context.close().unwrap();
    context.close().unwrap();
    assert!(context.indexer().is_stopped());
    assert!(context.dackbox().new_transaction().is_err());
}

#[test]
fn test_open_dir_writes_default_config_and_persists() {
    let dir = tempdir().unwrap();
    {
        let (indexer, _) = search_stack();
        let context = DackBoxContext::open_dir(dir.path(), buckets(), indexer).unwrap();
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        let mut txn = context.dackbox().new_transaction().unwrap();
        Upserter::<Image>::new(b"image")
            .upsert(&mut txn, &image("i1", "nginx"))
            .unwrap();
        txn.commit().unwrap();
        context.close().unwrap();
    }

    let (indexer, index) = search_stack();
    let context = DackBoxContext::open_dir(dir.path(), buckets(), indexer).unwrap();
    let reports = context
        .init(&initialized(), Some(&*index), TIMEOUT)
        .unwrap();
    assert!(reports[0].full_rebuild);
    assert_eq!(index.count("images").unwrap(), 1);
}
