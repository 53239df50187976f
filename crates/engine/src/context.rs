//! Process-lifetime DackBox context
//!
//! Built once at startup and passed by reference to every datastore. It owns
//! the DackBox and the lazy indexer draining its queue, and has an explicit
//! `close` that stops indexing before closing the store.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use dackbox_core::{BucketRegistry, KvStore, Result};
use dackbox_index::{Acker, Indexer, LazyIndexer, SearchIndex};
use dackbox_storage::RecordStore;

use crate::bootstrap::{self, BucketReport, InitializedBucket};
use crate::config::{DackBoxConfig, CONFIG_FILE_NAME};
use crate::dackbox::DackBox;

/// DackBox plus its indexing pipeline
pub struct DackBoxContext {
    dackbox: DackBox,
    lazy: LazyIndexer,
    closed: AtomicBool,
}

impl std::fmt::Debug for DackBoxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DackBoxContext")
            .field("dackbox", &self.dackbox)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl DackBoxContext {
    /// Open a DackBox over `store` and start indexing its commits into `indexer`
    pub fn open(
        config: DackBoxConfig,
        store: Arc<dyn KvStore>,
        buckets: BucketRegistry,
        indexer: Arc<dyn Indexer>,
    ) -> Result<Self> {
        let lazy_config = config.lazy_config();
        let dackbox = DackBox::open(store, config, buckets)?;

        let ack_target = dackbox.clone();
        let acker: Acker = Arc::new(move |keys: &[Vec<u8>]| ack_target.ack_keys_indexed(keys));
        let lazy = LazyIndexer::start(Arc::clone(dackbox.queue()), indexer, acker, lazy_config)?;

        info!(target: "dackbox::index", "DackBox context opened");
        Ok(Self {
            dackbox,
            lazy,
            closed: AtomicBool::new(false),
        })
    }

    /// Open the on-disk store in `dir`, configured by `dir/dackbox.toml`
    ///
    /// A commented default config is written on first open.
    pub fn open_dir(
        dir: impl AsRef<Path>,
        buckets: BucketRegistry,
        indexer: Arc<dyn Indexer>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        DackBoxConfig::write_default_if_missing(&path)?;
        let config = DackBoxConfig::from_file(&path)?;
        let store = RecordStore::open(dir, config.durability_mode()?)?;
        Self::open(config, Arc::new(store), buckets, indexer)
    }

    /// The DackBox
    pub fn dackbox(&self) -> &DackBox {
        &self.dackbox
    }

    /// The indexing pipeline
    pub fn indexer(&self) -> &LazyIndexer {
        &self.lazy
    }

    /// Reconcile the index with the store for `buckets`
    pub fn init(
        &self,
        buckets: &[InitializedBucket],
        search: Option<&dyn SearchIndex>,
        timeout: Duration,
    ) -> Result<Vec<BucketReport>> {
        bootstrap::init(&self.dackbox, &self.lazy, search, buckets, timeout)
    }

    /// Block until every committed change is indexed and acknowledged
    pub fn wait_indexed(&self, timeout: Duration) -> bool {
        self.lazy.wait_idle(timeout)
    }

    /// Stop indexing and close the store; later calls do nothing
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.lazy.stop();
        self.dackbox.close()?;
        info!(target: "dackbox::index", metrics = ?self.dackbox.metrics(), "DackBox context closed");
        Ok(())
    }
}

impl Drop for DackBoxContext {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(target: "dackbox::index", error = %e, "Failed to close DackBox context");
        }
    }
}
