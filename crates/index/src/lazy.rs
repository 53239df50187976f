//! Lazy indexing pipeline
//!
//! Two background threads drain the index queue:
//!
//! - `dackbox-indexer` pops entries, dispatches them to the indexer and moves
//!   every handled key into the ack buffer.
//! - `dackbox-acker` flushes the ack buffer through the acker once it holds
//!   `max_batch_size` keys, or once `ack_interval` has passed since the
//!   oldest buffered key arrived, whichever comes first.
//!
//! Failures never reach the writer that produced the entry. A key whose
//! indexing failed is not acked, so it stays dirty and is replayed on the
//! next bootstrap. A failed ack is re-buffered and retried after another
//! interval. Keys with no registered indexer are logged and acked, since
//! retrying them can never succeed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use dackbox_core::{display_key, Error, Result};

use crate::indexer::Indexer;
use crate::queue::IndexQueue;

/// Acknowledges that keys have been indexed
pub type Acker = Arc<dyn Fn(&[Vec<u8>]) -> Result<()> + Send + Sync>;

/// Default interval between ack flushes
pub const DEFAULT_ACK_INTERVAL: Duration = Duration::from_millis(500);

/// Default maximum number of keys per ack call
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Pipeline tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyConfig {
    /// Longest time a handled key waits in the ack buffer
    pub ack_interval: Duration,
    /// Ack as soon as this many keys are buffered; also the largest ack call
    pub max_batch_size: usize,
}

impl Default for LazyConfig {
    fn default() -> Self {
        Self {
            ack_interval: DEFAULT_ACK_INTERVAL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Pipeline counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LazyStats {
    /// Values indexed
    pub indexed: u64,
    /// Tombstones deleted from the index
    pub deleted: u64,
    /// Entries whose indexing failed
    pub failed: u64,
    /// Keys acknowledged
    pub acked: u64,
    /// Ack calls that failed
    pub ack_failures: u64,
}

#[derive(Debug, Default)]
struct AckState {
    pending: Vec<Vec<u8>>,
    first_pending: Option<Instant>,
    acking: bool,
}

#[derive(Default)]
struct Counters {
    indexed: AtomicU64,
    deleted: AtomicU64,
    failed: AtomicU64,
    acked: AtomicU64,
    ack_failures: AtomicU64,
}

struct Shared {
    queue: Arc<IndexQueue>,
    indexer: Arc<dyn Indexer>,
    acker: Acker,
    config: LazyConfig,
    stop: AtomicBool,
    acks: Mutex<AckState>,
    ack_ready: Condvar,
    ack_drained: Condvar,
    counters: Counters,
}

impl Shared {
    /// Release `key` from the queue, buffering an ack for it if `ack`
    ///
    /// The key leaves the in-flight set under the ack lock, so a batch that
    /// contains it is never flushed while its own entry still looks pending.
    fn finish(&self, key: Vec<u8>, ack: bool) {
        let mut acks = self.acks.lock();
        self.queue.task_done(&key);
        if ack {
            if acks.first_pending.is_none() {
                acks.first_pending = Some(Instant::now());
            }
            acks.pending.push(key);
            self.ack_ready.notify_one();
        }
    }

    fn is_ack_idle(acks: &AckState) -> bool {
        acks.pending.is_empty() && !acks.acking
    }
}

/// Background indexer with batched acknowledgment
pub struct LazyIndexer {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LazyIndexer {
    /// Start both worker threads
    ///
    /// # Errors
    ///
    /// - `Config` if `max_batch_size` is zero
    /// - `Io` if a thread cannot be spawned
    pub fn start(
        queue: Arc<IndexQueue>,
        indexer: Arc<dyn Indexer>,
        acker: Acker,
        config: LazyConfig,
    ) -> Result<Self> {
        if config.max_batch_size == 0 {
            return Err(Error::Config("max_batch_size must be at least 1".to_string()));
        }
        let shared = Arc::new(Shared {
            queue,
            indexer,
            acker,
            config,
            stop: AtomicBool::new(false),
            acks: Mutex::new(AckState::default()),
            ack_ready: Condvar::new(),
            ack_drained: Condvar::new(),
            counters: Counters::default(),
        });

        let lazy = Self {
            shared: Arc::clone(&shared),
            workers: Mutex::new(Vec::with_capacity(2)),
        };

        let indexer_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("dackbox-indexer".to_string())
            .spawn(move || index_loop(&indexer_shared))?;
        lazy.workers.lock().push(handle);

        let acker_shared = Arc::clone(&shared);
        match std::thread::Builder::new()
            .name("dackbox-acker".to_string())
            .spawn(move || ack_loop(&acker_shared))
        {
            Ok(handle) => lazy.workers.lock().push(handle),
            Err(e) => {
                lazy.stop();
                return Err(e.into());
            }
        }

        info!(
            target: "dackbox::index",
            ack_interval_ms = config.ack_interval.as_millis() as u64,
            max_batch_size = config.max_batch_size,
            "Lazy indexer started"
        );
        Ok(lazy)
    }

    /// Queue a key for indexing; `None` deletes it from the index
    pub fn mark(&self, key: Vec<u8>, value: Option<Vec<u8>>) {
        self.shared.queue.push(key, value);
    }

    /// The queue this pipeline drains
    pub fn queue(&self) -> &Arc<IndexQueue> {
        &self.shared.queue
    }

    /// Block until the queue is drained and every handled key is acked
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        if !self.shared.queue.wait_idle(timeout) {
            return false;
        }
        let mut acks = self.shared.acks.lock();
        while !Shared::is_ack_idle(&acks) {
            if self.shared.stop.load(Ordering::Acquire) {
                return false;
            }
            if self
                .shared
                .ack_drained
                .wait_until(&mut acks, deadline)
                .timed_out()
            {
                return Shared::is_ack_idle(&acks);
            }
        }
        true
    }

    /// Counters snapshot
    pub fn stats(&self) -> LazyStats {
        let c = &self.shared.counters;
        LazyStats {
            indexed: c.indexed.load(Ordering::Relaxed),
            deleted: c.deleted.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            acked: c.acked.load(Ordering::Relaxed),
            ack_failures: c.ack_failures.load(Ordering::Relaxed),
        }
    }

    /// True once `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Stop both workers and join them
    ///
    /// Entries still queued stay queued. Keys already indexed get one final
    /// ack attempt. Calling `stop` again is a no-op.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.queue.wake_all();
        {
            let _acks = self.shared.acks.lock();
            self.shared.ack_ready.notify_all();
            self.shared.ack_drained.notify_all();
        }
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                error!(target: "dackbox::index", "Lazy indexer worker panicked");
            }
        }
        info!(target: "dackbox::index", stats = ?self.stats(), "Lazy indexer stopped");
    }
}

impl Drop for LazyIndexer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn index_loop(shared: &Shared) {
    while let Some((key, value)) = shared.queue.pop_wait(&shared.stop) {
        let result = match &value {
            Some(bytes) => shared.indexer.index(&key, bytes),
            None => shared.indexer.delete(&key),
        };
        let ack = match result {
            Ok(()) => {
                let counter = if value.is_some() {
                    &shared.counters.indexed
                } else {
                    &shared.counters.deleted
                };
                counter.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(Error::IndexDispatch(msg)) => {
                warn!(target: "dackbox::index", key = %display_key(&key), "{}", msg);
                true
            }
            Err(e) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "dackbox::index",
                    key = %display_key(&key),
                    error = %e,
                    "Unable to index key"
                );
                false
            }
        };
        shared.finish(key, ack);
    }
    debug!(target: "dackbox::index", "Indexer loop exiting");
}

fn ack_loop(shared: &Shared) {
    loop {
        let (batch, stopping) = {
            let mut acks = shared.acks.lock();
            loop {
                if shared.stop.load(Ordering::Acquire) {
                    let batch: Vec<Vec<u8>> = acks.pending.drain(..).collect();
                    acks.first_pending = None;
                    acks.acking = !batch.is_empty();
                    break (batch, true);
                }
                if acks.pending.len() >= shared.config.max_batch_size {
                    break (take_batch(&mut acks, shared.config.max_batch_size), false);
                }
                match acks.first_pending {
                    None => shared.ack_ready.wait(&mut acks),
                    Some(first) => {
                        let deadline = first + shared.config.ack_interval;
                        if Instant::now() >= deadline {
                            break (take_batch(&mut acks, shared.config.max_batch_size), false);
                        }
                        shared.ack_ready.wait_until(&mut acks, deadline);
                    }
                }
            }
        };

        if !batch.is_empty() {
            flush(shared, batch, stopping);
        }
        if stopping {
            break;
        }
    }
    debug!(target: "dackbox::index", "Ack loop exiting");
}

fn take_batch(acks: &mut AckState, max: usize) -> Vec<Vec<u8>> {
    let n = acks.pending.len().min(max);
    let batch: Vec<Vec<u8>> = acks.pending.drain(..n).collect();
    if acks.pending.is_empty() {
        acks.first_pending = None;
    }
    acks.acking = true;
    batch
}

fn flush(shared: &Shared, batch: Vec<Vec<u8>>, stopping: bool) {
    let result = (shared.acker)(&batch);
    let mut acks = shared.acks.lock();
    acks.acking = false;
    match result {
        Ok(()) => {
            shared
                .counters
                .acked
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            debug!(target: "dackbox::index", keys = batch.len(), "Acked indexed keys");
        }
        Err(e) => {
            shared.counters.ack_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                target: "dackbox::index",
                keys = batch.len(),
                error = %e,
                "Unable to ack keys"
            );
            if !stopping {
                let mut retained = batch;
                retained.append(&mut acks.pending);
                acks.pending = retained;
                acks.first_pending = Some(Instant::now());
            }
        }
    }
    if Shared::is_ack_idle(&acks) {
        shared.ack_drained.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::WaitableQueue;

    struct NoopIndexer;

    impl Indexer for NoopIndexer {
        fn index(&self, _key: &[u8], _value: &[u8]) -> Result<()> {
            Ok(())
        }

        fn delete(&self, _key: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let acker: Acker = Arc::new(|_keys: &[Vec<u8>]| Ok(()));
        let result = LazyIndexer::start(
            Arc::new(WaitableQueue::new()),
            Arc::new(NoopIndexer),
            acker,
            LazyConfig {
                ack_interval: Duration::from_millis(10),
                max_batch_size: 0,
            },
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let acker: Acker = Arc::new(|_keys: &[Vec<u8>]| Ok(()));
        let lazy = LazyIndexer::start(
            Arc::new(WaitableQueue::new()),
            Arc::new(NoopIndexer),
            acker,
            LazyConfig::default(),
        )
        .unwrap();
        lazy.stop();
        lazy.stop();
        assert!(lazy.is_stopped());
    }

    #[test]
    fn test_mark_indexes_and_acks() {
        let acked = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&acked);
        let acker: Acker = Arc::new(move |keys: &[Vec<u8>]| {
            sink.lock().extend_from_slice(keys);
            Ok(())
        });
        let lazy = LazyIndexer::start(
            Arc::new(WaitableQueue::new()),
            Arc::new(NoopIndexer),
            acker,
            LazyConfig {
                ack_interval: Duration::from_millis(20),
                max_batch_size: 10,
            },
        )
        .unwrap();

        lazy.mark(b"a\0x".to_vec(), Some(b"v".to_vec()));
        lazy.mark(b"a\0y".to_vec(), None);
        assert!(lazy.wait_idle(Duration::from_secs(5)));
        assert_eq!(*acked.lock(), vec![b"a\0x".to_vec(), b"a\0y".to_vec()]);

        let stats = lazy.stats();
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.acked, 2);
    }

    #[test]
    fn test_acked_keys_are_no_longer_pending() {
        let queue: Arc<IndexQueue> = Arc::new(WaitableQueue::new());
        let still_pending = Arc::new(Mutex::new(Vec::new()));
        let acker: Acker = {
            let queue = Arc::clone(&queue);
            let still_pending = Arc::clone(&still_pending);
            Arc::new(move |keys: &[Vec<u8>]| {
                for key in keys {
                    if queue.is_pending(key) {
                        still_pending.lock().push(key.clone());
                    }
                }
                Ok(())
            })
        };
        let lazy = LazyIndexer::start(
            Arc::clone(&queue),
            Arc::new(NoopIndexer),
            acker,
            LazyConfig {
                ack_interval: Duration::from_millis(1),
                max_batch_size: 1,
            },
        )
        .unwrap();

        for i in 0..50u32 {
            lazy.mark(format!("a\0{}", i).into_bytes(), Some(b"v".to_vec()));
        }
        assert!(lazy.wait_idle(Duration::from_secs(5)));
        assert!(still_pending.lock().is_empty());
        assert_eq!(lazy.stats().acked, 50);
    }
}
