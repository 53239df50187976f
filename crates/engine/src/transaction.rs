//! Transactions spanning the record store and the reference graph
//!
//! A transaction owns one store transaction and a copy-on-write overlay over
//! the graph snapshot it pinned. Reads see the snapshot plus the
//! transaction's own writes. Edge changes go through [`Transaction::graph_mut`],
//! which stages edge rows in the same store batch as the records.
//!
//! Lifecycle: `Open -> Committed | Discarded`. `commit` and `discard` consume
//! the transaction; dropping an open transaction discards it.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use dackbox_core::{get_bucket_key, Error, KvTxn, Result};
use dackbox_graph::{ModifiedGraph, PersistedGraph, RemoteGraph};
use dackbox_index::IndexEntry;

use crate::dackbox::DackBox;

/// A unit of work over records and edges
pub struct Transaction {
    dackbox: DackBox,
    kv: Option<Box<dyn KvTxn>>,
    graph: ModifiedGraph<RemoteGraph>,
    ts: u64,
    dirty: Vec<(Vec<u8>, IndexEntry)>,
    dirty_slots: FxHashMap<Vec<u8>, usize>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("ts", &self.ts)
            .field("writable", &self.is_writable())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(dackbox: DackBox, kv: Box<dyn KvTxn>, ts: u64) -> Self {
        dackbox.inner.coordinator.record_start(kv.is_writable());
        let graph = ModifiedGraph::new(dackbox.inner.history.remote(ts));
        Self {
            dackbox,
            kv: Some(kv),
            graph,
            ts,
            dirty: Vec::new(),
            dirty_slots: FxHashMap::default(),
        }
    }

    /// Graph snapshot timestamp pinned by this transaction
    pub fn timestamp(&self) -> u64 {
        self.ts
    }

    /// Whether this transaction may write
    pub fn is_writable(&self) -> bool {
        self.kv.as_ref().is_some_and(|kv| kv.is_writable())
    }

    fn kv(&self) -> Result<&dyn KvTxn> {
        self.kv
            .as_deref()
            .ok_or_else(|| Error::invalid("transaction already finished"))
    }

    fn kv_mut(&mut self) -> Result<&mut Box<dyn KvTxn>> {
        self.kv
            .as_mut()
            .ok_or_else(|| Error::invalid("transaction already finished"))
    }

    /// Read a raw value
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.kv()?.get(key)
    }

    /// Stage a raw write; does not mark the key dirty
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.kv_mut()?.set(key, value)
    }

    /// Stage a raw delete; does not mark the key dirty
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.kv_mut()?.delete(key)
    }

    /// Every (key, value) pair under `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.kv()?.scan_prefix(prefix)
    }

    /// Every key under `prefix`, in key order
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.kv()?.keys_with_prefix(prefix)
    }

    /// The graph as this transaction sees it
    pub fn graph(&self) -> &ModifiedGraph<RemoteGraph> {
        &self.graph
    }

    /// Edge mutation handle staging rows into this transaction
    ///
    /// # Errors
    ///
    /// `InvalidOperation` on a read-only transaction.
    pub fn graph_mut(&mut self) -> Result<PersistedGraph<'_>> {
        let kv = self
            .kv
            .as_mut()
            .ok_or_else(|| Error::invalid("transaction already finished"))?;
        if !kv.is_writable() {
            return Err(Error::invalid("graph writes need a read-write transaction"));
        }
        Ok(PersistedGraph::new(
            kv.as_mut(),
            &mut self.graph,
            self.dackbox.inner.config.graph_bucket.as_bytes(),
        ))
    }

    /// Queue `key` for indexing once this transaction commits
    ///
    /// `None` removes the key from the index. Marking a key twice keeps the
    /// latest value.
    pub fn mark_dirty(&mut self, key: &[u8], value: IndexEntry) {
        match self.dirty_slots.get(key) {
            Some(&slot) => self.dirty[slot].1 = value,
            None => {
                self.dirty_slots.insert(key.to_vec(), self.dirty.len());
                self.dirty.push((key.to_vec(), value));
            }
        }
    }

    /// Keys marked dirty so far, in marking order
    pub fn dirty_keys(&self) -> impl Iterator<Item = &[u8]> {
        self.dirty.iter().map(|(key, _)| key.as_slice())
    }

    /// Commit records and edges atomically
    ///
    /// Dirty markers are staged into the same batch. The store commit runs
    /// under the coordinator lock; only if it succeeds is the graph
    /// modification merged and the dirty entries queued for indexing.
    /// Committing a read-only transaction just releases it.
    pub fn commit(mut self) -> Result<()> {
        let Some(mut kv) = self.kv.take() else {
            return Ok(());
        };
        let inner = std::sync::Arc::clone(&self.dackbox.inner);

        if !kv.is_writable() {
            kv.discard();
            inner.history.release(self.ts);
            inner.coordinator.record_commit();
            return Ok(());
        }

        if let Err(e) = stage_dirty_markers(kv.as_mut(), &inner.config.dirty_bucket, &self.dirty) {
            kv.discard();
            inner.history.release(self.ts);
            inner.coordinator.record_abort();
            warn!(target: "dackbox::txn", ts = self.ts, error = %e, "Transaction aborted");
            return Err(e);
        }

        let modification = self.graph.modification();
        let dirty = std::mem::take(&mut self.dirty);
        let queued = dirty.len();
        {
            let mut history = inner.history.lock();
            history.release(self.ts);
            if let Err(e) = kv.commit() {
                drop(history);
                inner.coordinator.record_abort();
                warn!(target: "dackbox::txn", ts = self.ts, error = %e, "Transaction aborted");
                return Err(e);
            }
            history.apply(&modification);
            inner.queue.push_all(dirty);
        }

        inner.coordinator.record_commit();
        debug!(
            target: "dackbox::txn",
            ts = self.ts,
            edge_rows = modification.len(),
            queued,
            "Transaction committed"
        );
        Ok(())
    }

    /// Abandon every staged write and release the snapshot
    pub fn discard(self) {
        drop(self);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(kv) = self.kv.take() {
            kv.discard();
            self.dackbox.inner.history.release(self.ts);
            self.dackbox.inner.coordinator.record_discard();
            debug!(target: "dackbox::txn", ts = self.ts, "Transaction discarded");
        }
    }
}

fn stage_dirty_markers(
    kv: &mut dyn KvTxn,
    dirty_bucket: &str,
    dirty: &[(Vec<u8>, IndexEntry)],
) -> Result<()> {
    for (key, _) in dirty {
        kv.set(&get_bucket_key(dirty_bucket.as_bytes(), key), &[])?;
    }
    Ok(())
}
