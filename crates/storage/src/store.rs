//! Versioned, single-writer record store
//!
//! `RecordStore` is the concrete `KvStore` the engine runs on. It keeps every
//! key as a version chain in an ordered map so prefix scans come out in key
//! order, and hands out snapshot transactions:
//!
//! - A read-only transaction pins the current store version and reads the
//!   newest value `<=` that version for its whole lifetime.
//! - A writable transaction takes the single-writer gate at `begin`, buffers
//!   its writes, and on commit appends them to the commit log (if any) and
//!   installs them under a new version in one step.
//!
//! Old versions are pruned on commit once no open transaction can see them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use dackbox_core::{Error, KvStore, KvTxn, Result};

use crate::chain::VersionChain;
use crate::gate::WriterGate;
use crate::wal::{CommitLog, CommitRecord, DurabilityMode, LogOp};

/// File name of the commit log inside a store directory
pub const LOG_FILE_NAME: &str = "dackbox.log";

struct StoreInner {
    data: RwLock<BTreeMap<Vec<u8>, VersionChain>>,
    version: AtomicU64,
    /// Pinned snapshot versions of open transactions, with counts
    readers: Mutex<BTreeMap<u64, usize>>,
    gate: WriterGate,
    log: Option<Mutex<CommitLog>>,
    closed: AtomicBool,
}

impl StoreInner {
    fn pin(&self) -> u64 {
        let mut readers = self.readers.lock();
        let snapshot = self.version.load(Ordering::Acquire);
        *readers.entry(snapshot).or_insert(0) += 1;
        snapshot
    }

    fn unpin(&self, snapshot: u64) {
        let mut readers = self.readers.lock();
        if let Some(count) = readers.get_mut(&snapshot) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&snapshot);
            }
        }
    }

    fn min_pinned(&self) -> Option<u64> {
        self.readers.lock().keys().next().copied()
    }

    fn apply(&self, version: u64, writes: &BTreeMap<Vec<u8>, Option<Vec<u8>>>) {
        let mut data = self.data.write();
        for (key, value) in writes {
            match data.get_mut(key) {
                Some(chain) => chain.push(version, value.clone()),
                None => {
                    if value.is_some() {
                        data.insert(key.clone(), VersionChain::new(version, value.clone()));
                    }
                }
            }
        }
        self.version.store(version, Ordering::Release);
    }

    fn gc_keys<'a>(&self, keys: impl Iterator<Item = &'a Vec<u8>>) {
        let horizon = self
            .min_pinned()
            .unwrap_or_else(|| self.version.load(Ordering::Acquire));
        let mut data = self.data.write();
        for key in keys {
            let dead = match data.get_mut(key) {
                Some(chain) => {
                    chain.gc(horizon);
                    chain.is_dead(horizon)
                }
                None => false,
            };
            if dead {
                data.remove(key);
            }
        }
    }
}

/// In-process record store with optional commit log
#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("version", &self.version())
            .field("keys", &self.len())
            .field("durable", &self.inner.log.is_some())
            .finish()
    }
}

impl RecordStore {
    fn from_parts(log: Option<CommitLog>, records: Vec<CommitRecord>) -> Self {
        let mut data: BTreeMap<Vec<u8>, VersionChain> = BTreeMap::new();
        let mut version = 0;
        for record in records {
            version = version.max(record.version);
            for op in record.ops {
                let (key, value) = match op {
                    LogOp::Put { key, value } => (key, Some(value)),
                    LogOp::Delete { key } => (key, None),
                };
                match value {
                    Some(value) => {
                        data.insert(key, VersionChain::new(record.version, Some(value)));
                    }
                    None => {
                        data.remove(&key);
                    }
                }
            }
        }
        Self {
            inner: Arc::new(StoreInner {
                data: RwLock::new(data),
                version: AtomicU64::new(version),
                readers: Mutex::new(BTreeMap::new()),
                gate: WriterGate::new(),
                log: log.map(Mutex::new),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Purely in-memory store, lost on drop
    pub fn ephemeral() -> Self {
        Self::from_parts(None, Vec::new())
    }

    /// Open a store rooted at directory `dir`
    ///
    /// With [`DurabilityMode::Cache`] nothing is read or written on disk.
    /// Otherwise the commit log in `dir` is replayed and appended to.
    pub fn open(dir: impl AsRef<Path>, mode: DurabilityMode) -> Result<Self> {
        if !mode.requires_log() {
            return Ok(Self::ephemeral());
        }
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path: PathBuf = dir.join(LOG_FILE_NAME);
        let (log, records) = CommitLog::open(&path, mode)?;
        let replayed = records.len();
        let store = Self::from_parts(Some(log), records);
        info!(
            target: "dackbox::storage",
            path = %path.display(),
            commits = replayed,
            version = store.version(),
            keys = store.len(),
            "Record store opened"
        );
        Ok(store)
    }

    /// Latest committed version
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Number of keys with at least one retained version
    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    /// True if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a writable transaction is open
    pub fn has_active_writer(&self) -> bool {
        self.inner.gate.is_held()
    }

    /// Open a concrete transaction (see [`KvStore::begin`])
    pub fn begin_txn(&self, writable: bool) -> Result<StoreTxn> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::store("record store is closed"));
        }
        if writable {
            self.inner.gate.acquire();
        }
        let snapshot = self.inner.pin();
        Ok(StoreTxn {
            inner: Arc::clone(&self.inner),
            snapshot,
            writable,
            writes: BTreeMap::new(),
            finished: false,
        })
    }
}

impl KvStore for RecordStore {
    fn begin(&self, writable: bool) -> Result<Box<dyn KvTxn>> {
        Ok(Box::new(self.begin_txn(writable)?))
    }

    fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(log) = &self.inner.log {
            log.lock().sync()?;
        }
        info!(target: "dackbox::storage", version = self.version(), "Record store closed");
        Ok(())
    }
}

/// One open transaction on a [`RecordStore`]
pub struct StoreTxn {
    inner: Arc<StoreInner>,
    snapshot: u64,
    writable: bool,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    finished: bool,
}

impl StoreTxn {
    /// Store version this transaction reads at
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    /// Number of staged writes
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::invalid("write through a read-only store transaction"))
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.inner.unpin(self.snapshot);
        if self.writable {
            self.inner.gate.release();
        }
    }

    fn commit_writes(&mut self) -> Result<()> {
        if !self.writable || self.writes.is_empty() {
            return Ok(());
        }
        let version = self.inner.version.load(Ordering::Acquire) + 1;
        if let Some(log) = &self.inner.log {
            let record = CommitRecord {
                version,
                ops: self
                    .writes
                    .iter()
                    .map(|(key, value)| match value {
                        Some(value) => LogOp::Put {
                            key: key.clone(),
                            value: value.clone(),
                        },
                        None => LogOp::Delete { key: key.clone() },
                    })
                    .collect(),
            };
            log.lock().append(&record)?;
        }
        self.inner.apply(version, &self.writes);
        debug!(
            target: "dackbox::storage",
            version,
            writes = self.writes.len(),
            "Store transaction committed"
        );
        Ok(())
    }
}

impl KvTxn for StoreTxn {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.writes.get(key) {
            return Ok(staged.clone());
        }
        let data = self.inner.data.read();
        Ok(data
            .get(key)
            .and_then(|chain| chain.get_at_version(self.snapshot))
            .map(|v| v.to_vec()))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = {
            let data = self.inner.data.read();
            data.range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .filter_map(|(k, chain)| {
                    chain
                        .get_at_version(self.snapshot)
                        .map(|v| (k.clone(), v.to_vec()))
                })
                .collect()
        };
        for (key, staged) in self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match staged {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let result = self.commit_writes();
        let touched: Vec<Vec<u8>> = if result.is_ok() {
            self.writes.keys().cloned().collect()
        } else {
            Vec::new()
        };
        self.finish();
        if !touched.is_empty() {
            self.inner.gc_keys(touched.iter());
        }
        result
    }

    fn discard(mut self: Box<Self>) {
        self.writes.clear();
        self.finish();
    }
}

impl Drop for StoreTxn {
    fn drop(&mut self) {
        self.finish();
    }
}
