//! The DackBox coordinator
//!
//! A `DackBox` pairs a [`KvStore`] with a [`SharedHistory`] of the reference
//! graph and hands out transactions that span both. The history's write lock
//! is the coordinator lock. Lock order is always the store writer gate first,
//! then the coordinator lock:
//!
//! - a write transaction takes the writer gate (blocking), then pins a graph
//!   snapshot;
//! - a read-only transaction opens its store snapshot and pins its graph
//!   snapshot under the coordinator lock, so both describe one instant;
//! - commit runs the store commit under the coordinator lock and merges the
//!   graph modification only after it succeeded.
//!
//! Nothing may read a [`RemoteGraph`](dackbox_graph::RemoteGraph) while
//! holding the coordinator lock.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use dackbox_core::{
    bucket_prefix, display_key, get_bucket_key, BucketRegistry, Error, KvStore, Result,
    SortedKeys,
};
use dackbox_graph::{
    load_edge_rows, DiscardableGraph, Graph, GraphProvider, RWGraph, SharedHistory,
};
use dackbox_index::{IndexQueue, WaitableQueue};

use crate::config::DackBoxConfig;
use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use crate::transaction::Transaction;

pub(crate) struct DackBoxInner {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) history: SharedHistory,
    pub(crate) queue: Arc<IndexQueue>,
    pub(crate) config: DackBoxConfig,
    pub(crate) buckets: BucketRegistry,
    pub(crate) coordinator: TransactionCoordinator,
}

/// Transactional store with an MVCC reference graph
///
/// Cheap to clone; clones share the store, the history and the index queue.
#[derive(Clone)]
pub struct DackBox {
    pub(crate) inner: Arc<DackBoxInner>,
}

impl std::fmt::Debug for DackBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DackBox")
            .field("graph_bucket", &self.inner.config.graph_bucket)
            .field("buckets", &self.inner.buckets.len())
            .field("pinned", &self.inner.history.pinned())
            .field("queued", &self.inner.queue.len())
            .finish()
    }
}

impl DackBox {
    /// Open over `store`, rebuilding the graph from its persisted edge rows
    ///
    /// # Errors
    ///
    /// - `Config` if `config` does not validate
    /// - `BucketConflict` if a registered bucket reuses a reserved name
    /// - `Serialization` if an edge row does not decode; the engine must not
    ///   start on a graph it cannot rebuild
    /// - `StoreIo` if the store cannot be read
    pub fn open(
        store: Arc<dyn KvStore>,
        config: DackBoxConfig,
        buckets: BucketRegistry,
    ) -> Result<Self> {
        config.validate()?;
        for reserved in config.reserved_buckets() {
            if buckets.contains(reserved.as_bytes()) {
                return Err(Error::BucketConflict(format!(
                    "bucket '{}' is reserved",
                    reserved
                )));
            }
        }

        let graph = load_graph(store.as_ref(), &config, &buckets)?;
        info!(
            target: "dackbox::graph",
            sources = graph.len(),
            edges = graph.edge_count(),
            buckets = buckets.len(),
            "Graph loaded"
        );

        Ok(Self {
            inner: Arc::new(DackBoxInner {
                store,
                history: SharedHistory::new(graph),
                queue: Arc::new(WaitableQueue::new()),
                config,
                buckets,
                coordinator: TransactionCoordinator::new(),
            }),
        })
    }

    /// Open a read-write transaction
    ///
    /// Blocks while another write transaction is open.
    pub fn new_transaction(&self) -> Result<Transaction> {
        let kv = self.inner.store.begin(true)?;
        let ts = self.inner.history.hold();
        Ok(Transaction::new(self.clone(), kv, ts))
    }

    /// Open a read-only transaction
    pub fn new_read_only_transaction(&self) -> Result<Transaction> {
        let (kv, ts) = {
            let mut history = self.inner.history.lock();
            let kv = self.inner.store.begin(false)?;
            (kv, history.hold())
        };
        Ok(Transaction::new(self.clone(), kv, ts))
    }

    /// Pin the current graph for traversal without a store transaction
    pub fn new_graph_view(&self) -> DiscardableGraph {
        self.inner.history.new_graph_view()
    }

    /// Write one key/value pair produced by `provide`
    ///
    /// `provide` runs under the coordinator lock, so keep it short.
    pub fn atomic_kv_update<F>(&self, provide: F) -> Result<()>
    where
        F: FnOnce() -> (Vec<u8>, Vec<u8>),
    {
        let mut kv = self.inner.store.begin(true)?;
        let _history = self.inner.history.lock();
        let (key, value) = provide();
        kv.set(&key, &value)?;
        kv.commit()
    }

    /// Drop the dirty markers of `keys`
    ///
    /// Keys queued again since, or still being indexed, keep their marker.
    pub fn ack_keys_indexed(&self, keys: &[Vec<u8>]) -> Result<()> {
        let dirty = self.inner.config.dirty_bucket.as_bytes();
        let mut kv = self.inner.store.begin(true)?;
        // Commits push onto the queue under the coordinator lock
        let _history = self.inner.history.lock();
        let mut removed = 0usize;
        for key in keys {
            if self.inner.queue.is_pending(key) {
                continue;
            }
            kv.delete(&get_bucket_key(dirty, key))?;
            removed += 1;
        }
        kv.commit()?;
        debug!(
            target: "dackbox::index",
            acked = keys.len(),
            removed,
            "Dirty markers cleared"
        );
        Ok(())
    }

    /// Queue every record of `bucket`, marking each one dirty
    ///
    /// Markers of records that no longer exist are dropped in the same write.
    /// Returns the number of records queued.
    pub(crate) fn requeue_bucket(&self, bucket: &[u8]) -> Result<usize> {
        let dirty = self.inner.config.dirty_bucket.as_bytes();
        let mut kv = self.inner.store.begin(true)?;
        let _history = self.inner.history.lock();

        let records = kv.scan_prefix(&bucket_prefix(bucket))?;
        let staged: FxHashSet<Vec<u8>> = records
            .iter()
            .map(|(key, _)| get_bucket_key(dirty, key))
            .collect();
        let mut dropped = 0usize;
        for marker in kv.keys_with_prefix(&bucket_prefix(&get_bucket_key(dirty, bucket)))? {
            if !staged.contains(&marker) {
                kv.delete(&marker)?;
                dropped += 1;
            }
        }
        for marker in &staged {
            kv.set(marker, &[])?;
        }
        kv.commit()?;

        let queued = records.len();
        self.inner
            .queue
            .push_all(records.into_iter().map(|(key, value)| (key, Some(value))));
        debug!(
            target: "dackbox::index",
            bucket = %display_key(bucket),
            queued,
            dropped,
            "Bucket requeued"
        );
        Ok(queued)
    }

    /// Every record key marked dirty and not yet acknowledged
    pub fn get_keys_to_index(&self) -> Result<Vec<Vec<u8>>> {
        self.dirty_keys_under(&bucket_prefix(self.inner.config.dirty_bucket.as_bytes()))
    }

    /// Dirty record keys of one bucket
    pub fn dirty_keys_in(&self, bucket: &[u8]) -> Result<Vec<Vec<u8>>> {
        let dirty = self.inner.config.dirty_bucket.as_bytes();
        self.dirty_keys_under(&bucket_prefix(&get_bucket_key(dirty, bucket)))
    }

    fn dirty_keys_under(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let strip = bucket_prefix(self.inner.config.dirty_bucket.as_bytes()).len();
        let kv = self.inner.store.begin(false)?;
        let keys = kv
            .keys_with_prefix(prefix)?
            .into_iter()
            .map(|marker| marker[strip..].to_vec())
            .collect();
        kv.discard();
        Ok(keys)
    }

    /// The index queue fed by commits
    pub fn queue(&self) -> &Arc<IndexQueue> {
        &self.inner.queue
    }

    /// The configuration this DackBox was opened with
    pub fn config(&self) -> &DackBoxConfig {
        &self.inner.config
    }

    /// The registered record buckets
    pub fn buckets(&self) -> &BucketRegistry {
        &self.inner.buckets
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.inner.store
    }

    /// Transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.inner.coordinator.metrics()
    }

    /// Transaction lifecycle tracking
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.inner.coordinator
    }

    /// Number of distinct pinned graph snapshots
    pub fn pinned_snapshots(&self) -> usize {
        self.inner.history.pinned()
    }

    /// Close the underlying store
    pub fn close(&self) -> Result<()> {
        self.inner.store.close()
    }
}

impl GraphProvider for DackBox {
    fn new_graph_view(&self) -> DiscardableGraph {
        DackBox::new_graph_view(self)
    }
}

// ============================================================================
// Graph loading
// ============================================================================

fn load_graph(
    store: &dyn KvStore,
    config: &DackBoxConfig,
    buckets: &BucketRegistry,
) -> Result<Graph> {
    let kv = store.begin(false)?;
    let rows = load_edge_rows(kv.as_ref(), config.graph_bucket.as_bytes())?;
    kv.discard();

    let mut graph = Graph::new();
    let mut skipped = 0usize;
    for (from, targets) in rows {
        if buckets.bucket_of(&from).is_none() {
            let err = Error::GraphInconsistency(format!(
                "source {} lies in no registered bucket",
                display_key(&from)
            ));
            warn!(target: "dackbox::graph", error = %err, "Skipping persisted edge row");
            skipped += targets.len();
            continue;
        }
        let (kept, dropped): (Vec<Vec<u8>>, Vec<Vec<u8>>) = targets
            .into_vec()
            .into_iter()
            .partition(|to| buckets.bucket_of(to).is_some());
        for to in &dropped {
            let err = Error::GraphInconsistency(format!(
                "edge {} -> {} points into no registered bucket",
                display_key(&from),
                display_key(to)
            ));
            warn!(target: "dackbox::graph", error = %err, "Skipping persisted edge");
        }
        skipped += dropped.len();
        graph.set_refs(&from, SortedKeys::from_sorted_unchecked(kept));
    }
    if skipped > 0 {
        warn!(target: "dackbox::graph", skipped, "Persisted edges skipped while loading graph");
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dackbox_graph::RGraph;
    use dackbox_storage::RecordStore;

    fn keys(items: &[&str]) -> SortedKeys {
        SortedKeys::sort(items.iter().map(|s| s.as_bytes().to_vec()).collect())
    }

    fn registry() -> BucketRegistry {
        BucketRegistry::new()
            .with_bucket(b"image", "images")
            .unwrap()
            .with_bucket(b"cve", "cves")
            .unwrap()
    }

    fn put_row(store: &RecordStore, from: &str, to: &SortedKeys) {
        let mut kv = store.begin(true).unwrap();
        kv.set(
            &get_bucket_key(b"dackbox_graph", from.as_bytes()),
            &to.marshal().unwrap(),
        )
        .unwrap();
        kv.commit().unwrap();
    }

    #[test]
    fn test_open_replays_edges() {
        let store = RecordStore::ephemeral();
        put_row(&store, "image\0i1", &keys(&["cve\0c1", "cve\0c2"]));
        let dackbox =
            DackBox::open(Arc::new(store), DackBoxConfig::default(), registry()).unwrap();
        let view = dackbox.new_graph_view();
        assert_eq!(view.get_refs_from(b"image\0i1"), keys(&["cve\0c1", "cve\0c2"]));
        assert_eq!(view.get_refs_to(b"cve\0c2"), keys(&["image\0i1"]));
    }

    #[test]
    fn test_open_skips_unregistered_edges() {
        let store = RecordStore::ephemeral();
        put_row(&store, "pod\0p1", &keys(&["image\0i1"]));
        put_row(&store, "image\0i1", &keys(&["cve\0c1", "node\0n1"]));
        let dackbox =
            DackBox::open(Arc::new(store), DackBoxConfig::default(), registry()).unwrap();
        let view = dackbox.new_graph_view();
        assert!(!view.has_refs_from(b"pod\0p1"));
        assert_eq!(view.get_refs_from(b"image\0i1"), keys(&["cve\0c1"]));
    }

    #[test]
    fn test_open_fails_on_corrupt_edge_row() {
        let store = RecordStore::ephemeral();
        let mut kv = store.begin(true).unwrap();
        kv.set(b"dackbox_graph\0image\0i1", &[0xff]).unwrap();
        kv.commit().unwrap();
        let result = DackBox::open(Arc::new(store), DackBoxConfig::default(), registry());
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_reserved_bucket_cannot_be_registered() {
        let buckets = registry().with_bucket(b"dackbox_dirty", "dirty").unwrap();
        let result = DackBox::open(
            Arc::new(RecordStore::ephemeral()),
            DackBoxConfig::default(),
            buckets,
        );
        assert!(matches!(result, Err(Error::BucketConflict(_))));
    }

    #[test]
    fn test_atomic_kv_update() {
        let store = Arc::new(RecordStore::ephemeral());
        let dackbox = DackBox::open(store.clone(), DackBoxConfig::default(), registry()).unwrap();
        dackbox
            .atomic_kv_update(|| (b"meta\0version".to_vec(), b"7".to_vec()))
            .unwrap();
        let kv = store.begin(false).unwrap();
        assert_eq!(kv.get(b"meta\0version").unwrap(), Some(b"7".to_vec()));
    }

    #[test]
    fn test_graph_view_pins_until_dropped() {
        let dackbox = DackBox::open(
            Arc::new(RecordStore::ephemeral()),
            DackBoxConfig::default(),
            registry(),
        )
        .unwrap();
        let view = dackbox.new_graph_view();
        assert_eq!(dackbox.pinned_snapshots(), 1);
        drop(view);
        assert_eq!(dackbox.pinned_snapshots(), 0);
    }
}
