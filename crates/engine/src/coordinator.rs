//! Transaction lifecycle counters
//!
//! Every `Transaction` reports its start and its terminal transition here:
//! commit, abort (the store commit failed) or discard (explicit or on drop).
//!
//! # Memory Ordering
//!
//! The counters are observational only and use Relaxed ordering. They do not
//! synchronize any other memory; `fetch_add`/`fetch_update` keep each counter
//! free of torn values. The one exception is the transition of the active
//! gauge to zero, which is announced on `idle` under `idle_lock` so that
//! `wait_for_idle` cannot miss it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Transaction counters shared by every transaction of one DackBox
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_discarded: AtomicU64,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl TransactionCoordinator {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A transaction was opened
    pub fn record_start(&self, writable: bool) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
        debug!(target: "dackbox::txn", writable, "Transaction started");
    }

    /// A transaction committed
    pub fn record_commit(&self) {
        self.finish();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// A transaction failed to commit
    pub fn record_abort(&self) {
        self.finish();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// A transaction was discarded
    pub fn record_discard(&self) {
        self.finish();
        self.total_discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        // Saturating so a stray record never wraps the gauge
        let previous = self
            .active_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |x| {
                Some(x.saturating_sub(1))
            })
            .unwrap_or(0);
        if previous <= 1 {
            let _guard = self.idle_lock.lock();
            self.idle.notify_all();
        }
    }

    /// Transactions currently open
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Counters snapshot
    pub fn metrics(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }

    /// Wait until no transaction is open
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.idle_lock.lock();
        while self.active_count() > 0 {
            if self.idle.wait_until(&mut guard, deadline).timed_out() {
                return self.active_count() == 0;
            }
        }
        true
    }
}

/// Transaction metrics snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionMetrics {
    /// Transactions currently open
    pub active_count: u64,
    /// Transactions opened
    pub total_started: u64,
    /// Transactions committed
    pub total_committed: u64,
    /// Transactions whose commit failed
    pub total_aborted: u64,
    /// Transactions discarded explicitly or dropped
    pub total_discarded: u64,
    /// committed / started
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Transactions that reached a terminal state
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted + self.total_discarded
    }

    /// aborted / started
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}
