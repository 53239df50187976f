//! Deduplicating FIFO queues
//!
//! `DedupQueue` holds at most one entry per key. Pushing a key that is
//! already queued replaces its value but keeps its position.
//!
//! `WaitableQueue` wraps it for many producers and one or more consumers:
//! consumers block in `pop_wait` until an entry arrives or a stop flag is
//! raised, and report completion with `task_done` so that `wait_idle` can
//! tell "empty" apart from "empty and nothing in flight". Keys taken with
//! `pop_wait` stay visible to `is_pending` until their `task_done`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

/// Entry of the indexing queue: a record value, or `None` for a delete
pub type IndexEntry = Option<Vec<u8>>;

/// Waitable queue of pending index entries
pub type IndexQueue = WaitableQueue<IndexEntry>;

// ============================================================================
// DedupQueue
// ============================================================================

/// FIFO keyed by bytes; at most one pending value per key
///
/// Not thread-safe on its own.
#[derive(Debug)]
pub struct DedupQueue<V> {
    values: FxHashMap<Vec<u8>, V>,
    order: VecDeque<Vec<u8>>,
}

impl<V> Default for DedupQueue<V> {
    fn default() -> Self {
        Self {
            values: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }
}

impl<V> DedupQueue<V> {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` under `key`
    ///
    /// Returns false if the key was already queued; its value is replaced in
    /// place.
    pub fn push(&mut self, key: Vec<u8>, value: V) -> bool {
        match self.values.get_mut(&key) {
            Some(existing) => {
                *existing = value;
                false
            }
            None => {
                self.order.push_back(key.clone());
                self.values.insert(key, value);
                true
            }
        }
    }

    /// Remove and return the oldest entry
    pub fn pop(&mut self) -> Option<(Vec<u8>, V)> {
        let key = self.order.pop_front()?;
        let value = self.values.remove(&key)?;
        Some((key, value))
    }

    /// True if `key` is queued
    pub fn contains(&self, key: &[u8]) -> bool {
        self.values.contains_key(key)
    }

    /// Number of queued keys
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ============================================================================
// WaitableQueue
// ============================================================================

#[derive(Debug)]
struct QueueState<V> {
    queue: DedupQueue<V>,
    in_flight: usize,
    in_flight_keys: FxHashMap<Vec<u8>, usize>,
}

impl<V> QueueState<V> {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }
}

/// Thread-safe [`DedupQueue`] with blocking pop and idle detection
#[derive(Debug)]
pub struct WaitableQueue<V> {
    state: Mutex<QueueState<V>>,
    not_empty: Condvar,
    idle: Condvar,
}

impl<V> Default for WaitableQueue<V> {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: DedupQueue::new(),
                in_flight: 0,
                in_flight_keys: FxHashMap::default(),
            }),
            not_empty: Condvar::new(),
            idle: Condvar::new(),
        }
    }
}

impl<V> WaitableQueue<V> {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` under `key` and wake one consumer
    pub fn push(&self, key: Vec<u8>, value: V) {
        let mut state = self.state.lock();
        state.queue.push(key, value);
        self.not_empty.notify_one();
    }

    /// Queue many entries at once
    pub fn push_all<I: IntoIterator<Item = (Vec<u8>, V)>>(&self, entries: I) {
        let mut state = self.state.lock();
        let mut pushed = false;
        for (key, value) in entries {
            state.queue.push(key, value);
            pushed = true;
        }
        if pushed {
            self.not_empty.notify_all();
        }
    }

    /// Remove the oldest entry without blocking
    ///
    /// Entries taken this way are not tracked as in flight.
    pub fn pop(&self) -> Option<(Vec<u8>, V)> {
        let mut state = self.state.lock();
        let entry = state.queue.pop();
        if state.is_idle() {
            self.idle.notify_all();
        }
        entry
    }

    /// Block until an entry is available or `stop` is raised
    ///
    /// A returned entry counts as in flight until [`task_done`] is called.
    ///
    /// [`task_done`]: WaitableQueue::task_done
    pub fn pop_wait(&self, stop: &AtomicBool) -> Option<(Vec<u8>, V)> {
        let mut state = self.state.lock();
        loop {
            if stop.load(Ordering::Acquire) {
                return None;
            }
            if let Some(entry) = state.queue.pop() {
                state.in_flight += 1;
                *state.in_flight_keys.entry(entry.0.clone()).or_insert(0) += 1;
                return Some(entry);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Mark the entry for `key` returned by `pop_wait` as finished
    pub fn task_done(&self, key: &[u8]) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if let Some(count) = state.in_flight_keys.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                state.in_flight_keys.remove(key);
            }
        }
        if state.is_idle() {
            self.idle.notify_all();
        }
    }

    /// Block until the queue is empty and nothing is in flight
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_idle() {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    /// Wake every blocked consumer so it can observe a stop flag
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.not_empty.notify_all();
        self.idle.notify_all();
    }

    /// True if `key` is queued (entries in flight are not counted)
    pub fn contains(&self, key: &[u8]) -> bool {
        self.state.lock().queue.contains(key)
    }

    /// True if `key` is queued or its entry is still being processed
    pub fn is_pending(&self, key: &[u8]) -> bool {
        let state = self.state.lock();
        state.queue.contains(key) || state.in_flight_keys.contains_key(key)
    }

    /// Number of queued keys
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Number of entries popped with `pop_wait` and not yet finished
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }
}
