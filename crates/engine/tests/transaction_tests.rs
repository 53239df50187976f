//! Integration tests for DackBox transactions
//!
//! - Committed edges are visible to later transactions and survive restart
//! - Read-only transactions keep their snapshot while writers commit
//! - A failed store commit merges nothing and releases everything
//! - Dirty markers and the index queue follow commits

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dackbox_core::{BucketRegistry, Error, KvStore, KvTxn, Result, SortedKeys};
use dackbox_engine::{DackBox, DackBoxConfig, Reader, Upserter};
use dackbox_graph::RGraph;
use dackbox_storage::{DurabilityMode, RecordStore};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Image {
    id: String,
    name: String,
    tags: Vec<String>,
}

impl dackbox_core::Record for Image {
    fn id(&self) -> &str {
        &self.id
    }
}

fn image(id: &str, name: &str) -> Image {
    Image {
        id: id.to_string(),
        name: name.to_string(),
        tags: vec!["latest".to_string()],
    }
}

fn buckets() -> BucketRegistry {
    BucketRegistry::new()
        .with_bucket(b"image", "images")
        .unwrap()
        .with_bucket(b"component", "components")
        .unwrap()
}

fn keys(items: &[&str]) -> SortedKeys {
    SortedKeys::sort(items.iter().map(|s| s.as_bytes().to_vec()).collect())
}

fn open(store: Arc<dyn KvStore>) -> DackBox {
    DackBox::open(store, DackBoxConfig::default(), buckets()).unwrap()
}

fn set_edges(dackbox: &DackBox, from: &str, to: &[&str]) {
    let mut txn = dackbox.new_transaction().unwrap();
    txn.graph_mut()
        .unwrap()
        .set_refs(from.as_bytes(), keys(to))
        .unwrap();
    txn.commit().unwrap();
}

/// Store whose commits fail while `fail` is set
struct FlakyStore {
    inner: RecordStore,
    fail: Arc<AtomicBool>,
}

struct FlakyTxn {
    inner: Box<dyn KvTxn>,
    fail: Arc<AtomicBool>,
}

impl KvStore for FlakyStore {
    fn begin(&self, writable: bool) -> Result<Box<dyn KvTxn>> {
        Ok(Box::new(FlakyTxn {
            inner: self.inner.begin(writable)?,
            fail: Arc::clone(&self.fail),
        }))
    }
}

impl KvTxn for FlakyTxn {
    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.inner.delete(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan_prefix(prefix)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            self.inner.discard();
            return Err(Error::store("disk full"));
        }
        self.inner.commit()
    }

    fn discard(self: Box<Self>) {
        self.inner.discard();
    }
}

// ============================================================================
// Edge durability
// ============================================================================

#[test]
fn test_committed_edges_visible_to_later_transactions() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    set_edges(&dackbox, "image\0i1", &["component\0a", "component\0b"]);

    let txn = dackbox.new_read_only_transaction().unwrap();
    assert_eq!(
        txn.graph().get_refs_from(b"image\0i1"),
        keys(&["component\0a", "component\0b"])
    );
    assert_eq!(txn.graph().get_refs_to(b"component\0b"), keys(&["image\0i1"]));

    let view = dackbox.new_graph_view();
    assert_eq!(view.count_refs_from(b"image\0i1"), 2);
}

#[test]
fn test_edges_survive_restart() {
    let dir = tempdir().unwrap();
    {
        let store = Arc::new(RecordStore::open(dir.path(), DurabilityMode::Always).unwrap());
        let dackbox = open(store.clone());
        let mut txn = dackbox.new_transaction().unwrap();
        Upserter::<Image>::new(b"image")
            .upsert_with_refs(&mut txn, &image("i1", "nginx"), &[b"component\0a".to_vec()])
            .unwrap();
        txn.commit().unwrap();
        dackbox.close().unwrap();
    }

    let store = Arc::new(RecordStore::open(dir.path(), DurabilityMode::Always).unwrap());
    let dackbox = open(store);
    let txn = dackbox.new_read_only_transaction().unwrap();
    assert_eq!(
        txn.graph().get_refs_from(b"image\0i1"),
        keys(&["component\0a"])
    );
    assert_eq!(
        Reader::<Image>::new(b"image").get(&txn, "i1").unwrap(),
        Some(image("i1", "nginx"))
    );
}

#[test]
fn test_uncommitted_edges_are_not_persisted() {
    let store = Arc::new(RecordStore::ephemeral());
    let dackbox = open(store.clone());
    {
        let mut txn = dackbox.new_transaction().unwrap();
        txn.graph_mut()
            .unwrap()
            .set_refs(b"image\0i1", keys(&["component\0a"]))
            .unwrap();
        assert!(txn.graph().has_refs_from(b"image\0i1"));
        txn.discard();
    }
    assert!(!dackbox.new_graph_view().has_refs_from(b"image\0i1"));

    let reopened = open(store);
    assert!(!reopened.new_graph_view().has_refs_from(b"image\0i1"));
}

// ============================================================================
// Snapshot isolation
// ============================================================================

#[test]
fn test_read_only_transaction_keeps_snapshot() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    set_edges(&dackbox, "image\0i1", &["component\0a"]);
    let upserter = Upserter::<Image>::new(b"image");
    let mut txn = dackbox.new_transaction().unwrap();
    upserter.upsert(&mut txn, &image("i1", "nginx")).unwrap();
    txn.commit().unwrap();

    let reader = dackbox.new_read_only_transaction().unwrap();

    let mut writer = dackbox.new_transaction().unwrap();
    writer
        .graph_mut()
        .unwrap()
        .set_refs(b"image\0i1", keys(&["component\0b"]))
        .unwrap();
    upserter.upsert(&mut writer, &image("i1", "redis")).unwrap();
    writer.commit().unwrap();

    assert_eq!(
        reader.graph().get_refs_from(b"image\0i1"),
        keys(&["component\0a"])
    );
    assert!(!reader.graph().has_refs_to(b"component\0b"));
    assert_eq!(
        Reader::<Image>::new(b"image").get(&reader, "i1").unwrap(),
        Some(image("i1", "nginx"))
    );

    let fresh = dackbox.new_read_only_transaction().unwrap();
    assert_eq!(
        fresh.graph().get_refs_from(b"image\0i1"),
        keys(&["component\0b"])
    );
}

#[test]
fn test_concurrent_readers_see_stable_snapshots() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    set_edges(&dackbox, "image\0i1", &["component\0c0"]);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let txn = dackbox.new_read_only_transaction().unwrap();
            let expected = txn.graph().get_refs_from(b"image\0i1");
            thread::spawn(move || {
                for _ in 0..50 {
                    assert_eq!(txn.graph().get_refs_from(b"image\0i1"), expected);
                    thread::yield_now();
                }
            })
        })
        .collect();

    for i in 1..20 {
        let target = format!("component\0c{}", i);
        set_edges(&dackbox, "image\0i1", &[target.as_str()]);
    }
    for handle in readers {
        handle.join().unwrap();
    }
    assert_eq!(dackbox.pinned_snapshots(), 0);
}

#[test]
fn test_writers_are_serialized() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let dackbox = dackbox.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    let mut txn = dackbox.new_transaction().unwrap();
                    let from = format!("image\0t{}", t);
                    let to = format!("component\0{}", i);
                    txn.graph_mut()
                        .unwrap()
                        .add_refs(from.as_bytes(), &[to.into_bytes()])
                        .unwrap();
                    txn.commit().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let view = dackbox.new_graph_view();
    for t in 0..4 {
        assert_eq!(view.count_refs_from(format!("image\0t{}", t).as_bytes()), 10);
    }
    assert_eq!(view.count_refs_to(b"component\x005"), 4);
    assert_eq!(dackbox.metrics().total_committed, 40);
}

// ============================================================================
// Commit failure
// ============================================================================

#[test]
fn test_failed_commit_merges_nothing() {
    let fail = Arc::new(AtomicBool::new(false));
    let store = Arc::new(FlakyStore {
        inner: RecordStore::ephemeral(),
        fail: Arc::clone(&fail),
    });
    let dackbox = open(store);

    let mut txn = dackbox.new_transaction().unwrap();
    Upserter::<Image>::new(b"image")
        .upsert_with_refs(&mut txn, &image("i1", "nginx"), &[b"component\0a".to_vec()])
        .unwrap();
    fail.store(true, Ordering::SeqCst);
    assert!(matches!(txn.commit(), Err(Error::StoreIo(_))));
    fail.store(false, Ordering::SeqCst);

    assert!(!dackbox.new_graph_view().has_refs_from(b"image\0i1"));
    assert!(dackbox.queue().is_empty());
    assert_eq!(dackbox.pinned_snapshots(), 0);
    assert_eq!(dackbox.metrics().total_aborted, 1);

    // The writer slot was released
    let txn = dackbox.new_transaction().unwrap();
    assert_eq!(txn.get(b"image\0i1").unwrap(), None);
    assert!(dackbox.get_keys_to_index().unwrap().is_empty());
}

#[test]
fn test_read_only_transaction_rejects_graph_writes() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    let mut txn = dackbox.new_read_only_transaction().unwrap();
    assert!(matches!(txn.graph_mut(), Err(Error::InvalidOperation(_))));
    assert!(matches!(
        txn.set(b"image\0i1", b"x"),
        Err(Error::InvalidOperation(_))
    ));
    txn.commit().unwrap();
    assert_eq!(dackbox.metrics().active_count, 0);
}

// ============================================================================
// Dirty tracking
// ============================================================================

#[test]
fn test_commit_marks_dirty_and_queues() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    let upserter = Upserter::<Image>::new(b"image");
    let mut txn = dackbox.new_transaction().unwrap();
    upserter.upsert(&mut txn, &image("i1", "nginx")).unwrap();
    upserter.upsert(&mut txn, &image("i2", "redis")).unwrap();
    upserter.upsert(&mut txn, &image("i1", "nginx-2")).unwrap();
    txn.commit().unwrap();

    assert_eq!(
        dackbox.get_keys_to_index().unwrap(),
        vec![b"image\0i1".to_vec(), b"image\0i2".to_vec()]
    );
    assert_eq!(dackbox.dirty_keys_in(b"image").unwrap().len(), 2);
    assert!(dackbox.dirty_keys_in(b"component").unwrap().is_empty());

    let (key, value) = dackbox.queue().pop().unwrap();
    assert_eq!(key, b"image\0i1".to_vec());
    let decoded: Image = dackbox_core::decode(&value.unwrap()).unwrap();
    assert_eq!(decoded.name, "nginx-2");
}

#[test]
fn test_ack_skips_keys_queued_again() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    let upserter = Upserter::<Image>::new(b"image");
    let mut txn = dackbox.new_transaction().unwrap();
    upserter.upsert(&mut txn, &image("i1", "nginx")).unwrap();
    upserter.upsert(&mut txn, &image("i2", "redis")).unwrap();
    txn.commit().unwrap();

    // i1 was handled; i2 is still waiting in the queue
    dackbox.queue().pop().unwrap();
    dackbox
        .ack_keys_indexed(&[b"image\0i1".to_vec(), b"image\0i2".to_vec()])
        .unwrap();
    assert_eq!(
        dackbox.get_keys_to_index().unwrap(),
        vec![b"image\0i2".to_vec()]
    );
}

#[test]
fn test_ack_skips_keys_still_being_indexed() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    let upserter = Upserter::<Image>::new(b"image");
    let stop = AtomicBool::new(false);
    let key = b"image\0i1".to_vec();

    let mut txn = dackbox.new_transaction().unwrap();
    upserter.upsert(&mut txn, &image("i1", "v1")).unwrap();
    txn.commit().unwrap();
    let (popped, _) = dackbox.queue().pop_wait(&stop).unwrap();
    dackbox.queue().task_done(&popped);

    // v2 is picked up by a worker before the ack for v1 lands
    let mut txn = dackbox.new_transaction().unwrap();
    upserter.upsert(&mut txn, &image("i1", "v2")).unwrap();
    txn.commit().unwrap();
    let (popped, value) = dackbox.queue().pop_wait(&stop).unwrap();
    let decoded: Image = dackbox_core::decode(&value.unwrap()).unwrap();
    assert_eq!(decoded.name, "v2");

    dackbox.ack_keys_indexed(&[key.clone()]).unwrap();
    assert_eq!(dackbox.get_keys_to_index().unwrap(), vec![key.clone()]);

    // Once v2 is finished its own ack clears the marker
    dackbox.queue().task_done(&popped);
    dackbox.ack_keys_indexed(&[key]).unwrap();
    assert!(dackbox.get_keys_to_index().unwrap().is_empty());
}

#[test]
fn test_metrics_track_lifecycle() {
    let dackbox = open(Arc::new(RecordStore::ephemeral()));
    dackbox.new_transaction().unwrap().commit().unwrap();
    dackbox.new_transaction().unwrap().discard();
    drop(dackbox.new_read_only_transaction().unwrap());

    let metrics = dackbox.metrics();
    assert_eq!(metrics.total_started, 3);
    assert_eq!(metrics.total_committed, 1);
    assert_eq!(metrics.total_discarded, 2);
    assert_eq!(metrics.active_count, 0);
    assert!(dackbox
        .coordinator()
        .wait_for_idle(Duration::from_millis(10)));
}
