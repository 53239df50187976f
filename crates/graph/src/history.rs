//! MVCC history over the graph
//!
//! `History` owns the live graph and enough undo information to answer reads
//! at any pinned timestamp.
//!
//! # Timestamps
//!
//! One logical clock drives both pins and merges. `hold()` ticks the clock and
//! pins the new value; `apply()` ticks the clock and stamps the merge. A view
//! at `ts` therefore sees exactly the merges stamped before `ts`.
//!
//! # Undo records
//!
//! When a merge happens while any timestamp is pinned, the prior edge sets of
//! every touched key (forward and reverse) are saved with the merge stamp. A
//! read at `ts` walks the merges stamped after `ts` oldest first and returns
//! the first saved prior it finds, falling back to the live graph. Undo
//! records older than the oldest pin can never be consulted again and are
//! pruned on `release()`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use tracing::trace;

use dackbox_core::SortedKeys;

use crate::discardable::DiscardableGraph;
use crate::graph::Graph;
use crate::modification::Modification;
use crate::remote::RemoteGraph;
use crate::traits::{RGraph, RWGraph};

#[derive(Debug)]
struct AppliedModification {
    applied_at: u64,
    prior_from: FxHashMap<Vec<u8>, SortedKeys>,
    prior_to: FxHashMap<Vec<u8>, SortedKeys>,
}

/// Live graph plus undo records for pinned timestamps
#[derive(Debug, Default)]
pub struct History {
    current: Graph,
    clock: u64,
    holds: BTreeMap<u64, usize>,
    applied: VecDeque<AppliedModification>,
}

impl History {
    /// History whose initial state is `graph`
    pub fn new(graph: Graph) -> Self {
        Self {
            current: graph,
            ..Default::default()
        }
    }

    /// Pin the current state and return its timestamp
    pub fn hold(&mut self) -> u64 {
        self.clock += 1;
        *self.holds.entry(self.clock).or_insert(0) += 1;
        trace!(target: "dackbox::history", ts = self.clock, "hold");
        self.clock
    }

    /// Unpin `ts`; unknown timestamps are ignored
    pub fn release(&mut self, ts: u64) {
        match self.holds.get_mut(&ts) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.holds.remove(&ts);
            }
            None => return,
        }
        match self.holds.keys().next().copied() {
            None => self.applied.clear(),
            Some(oldest) => {
                while self
                    .applied
                    .front()
                    .map_or(false, |m| m.applied_at < oldest)
                {
                    self.applied.pop_front();
                }
            }
        }
        trace!(
            target: "dackbox::history",
            ts,
            pinned = self.holds.len(),
            undo_records = self.applied.len(),
            "release"
        );
    }

    /// Merge a committed modification into the live graph
    pub fn apply(&mut self, modification: &Modification) {
        self.clock += 1;
        if modification.is_empty() {
            return;
        }
        if !self.holds.is_empty() {
            let mut prior_from = FxHashMap::default();
            let mut touched_to: BTreeSet<Vec<u8>> = BTreeSet::new();
            for (from, to) in modification.iter() {
                let old = self.current.get_refs_from(from);
                touched_to.extend(old.iter().cloned());
                touched_to.extend(to.iter().cloned());
                prior_from.insert(from.clone(), old);
            }
            let prior_to = touched_to
                .into_iter()
                .map(|to| {
                    let old = self.current.get_refs_to(&to);
                    (to, old)
                })
                .collect();
            self.applied.push_back(AppliedModification {
                applied_at: self.clock,
                prior_from,
                prior_to,
            });
        }
        modification.apply(&mut self.current);
        trace!(
            target: "dackbox::history",
            applied_at = self.clock,
            sources = modification.len(),
            "apply"
        );
    }

    /// Read-only view of the graph as of `ts`
    pub fn view(&self, ts: u64) -> HistoricalView<'_> {
        HistoricalView { history: self, ts }
    }

    /// The live graph
    pub fn current(&self) -> &Graph {
        &self.current
    }

    /// Number of distinct pinned timestamps
    pub fn pinned(&self) -> usize {
        self.holds.len()
    }

    /// Number of retained undo records
    pub fn undo_records(&self) -> usize {
        self.applied.len()
    }

    fn newer_than(&self, ts: u64) -> impl Iterator<Item = &AppliedModification> {
        let start = self.applied.partition_point(|m| m.applied_at <= ts);
        self.applied.range(start..)
    }
}

/// The graph as it was at a pinned timestamp
#[derive(Debug, Clone, Copy)]
pub struct HistoricalView<'a> {
    history: &'a History,
    ts: u64,
}

impl RGraph for HistoricalView<'_> {
    fn get_refs_from(&self, from: &[u8]) -> SortedKeys {
        for m in self.history.newer_than(self.ts) {
            if let Some(prior) = m.prior_from.get(from) {
                return prior.clone();
            }
        }
        self.history.current.get_refs_from(from)
    }

    fn get_refs_to(&self, to: &[u8]) -> SortedKeys {
        for m in self.history.newer_than(self.ts) {
            if let Some(prior) = m.prior_to.get(to) {
                return prior.clone();
            }
        }
        self.history.current.get_refs_to(to)
    }
}

// ============================================================================
// SharedHistory
// ============================================================================

/// Thread-safe handle to a [`History`]
///
/// The write lock is the coordinator lock: pins, releases and merges are all
/// short critical sections under it. Remote views take the read lock per call.
#[derive(Debug, Clone, Default)]
pub struct SharedHistory {
    inner: Arc<RwLock<History>>,
}

impl SharedHistory {
    /// Shared history over an initial graph
    pub fn new(graph: Graph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(History::new(graph))),
        }
    }

    /// Take the coordinator lock
    pub fn lock(&self) -> RwLockWriteGuard<'_, History> {
        self.inner.write()
    }

    /// Pin and return a timestamp
    pub fn hold(&self) -> u64 {
        self.inner.write().hold()
    }

    /// Unpin a timestamp
    pub fn release(&self, ts: u64) {
        self.inner.write().release(ts);
    }

    /// Merge a committed modification
    pub fn apply(&self, modification: &Modification) {
        self.inner.write().apply(modification);
    }

    /// Read-through view at an already pinned timestamp
    pub fn remote(&self, ts: u64) -> RemoteGraph {
        RemoteGraph::new(Arc::clone(&self.inner), ts)
    }

    /// Pin the current state and return a view that unpins on drop
    pub fn new_graph_view(&self) -> DiscardableGraph {
        let ts = self.hold();
        DiscardableGraph::new(self.remote(ts))
    }

    /// Run `f` against the live graph under the read lock
    pub fn with_current<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(self.inner.read().current())
    }

    /// Number of distinct pinned timestamps
    pub fn pinned(&self) -> usize {
        self.inner.read().pinned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> SortedKeys {
        SortedKeys::sort(items.iter().map(|s| s.as_bytes().to_vec()).collect())
    }

    fn modification(from: &str, to: &[&str]) -> Modification {
        let mut m = Modification::new();
        m.set(from.as_bytes().to_vec(), keys(to));
        m
    }

    #[test]
    fn test_view_sees_state_at_hold() {
        let mut h = History::new(Graph::new());
        h.apply(&modification("a", &["x"]));

        let ts = h.hold();
        h.apply(&modification("a", &["y"]));

        assert_eq!(h.view(ts).get_refs_from(b"a"), keys(&["x"]));
        assert_eq!(h.view(ts).get_refs_to(b"x"), keys(&["a"]));
        assert!(!h.view(ts).has_refs_to(b"y"));
        assert_eq!(h.current().get_refs_from(b"a"), keys(&["y"]));
    }

    #[test]
    fn test_later_hold_sees_merge() {
        let mut h = History::new(Graph::new());
        let before = h.hold();
        h.apply(&modification("a", &["x"]));
        let after = h.hold();

        assert!(!h.view(before).has_refs_from(b"a"));
        assert_eq!(h.view(after).get_refs_from(b"a"), keys(&["x"]));
    }

    #[test]
    fn test_no_undo_without_holds() {
        let mut h = History::new(Graph::new());
        h.apply(&modification("a", &["x"]));
        assert_eq!(h.undo_records(), 0);
    }

    #[test]
    fn test_release_prunes_undo_records() {
        let mut h = History::new(Graph::new());
        let t1 = h.hold();
        h.apply(&modification("a", &["x"]));
        let t2 = h.hold();
        h.apply(&modification("a", &["y"]));
        assert_eq!(h.undo_records(), 2);

        h.release(t1);
        assert_eq!(h.undo_records(), 1);
        assert_eq!(h.view(t2).get_refs_from(b"a"), keys(&["x"]));

        h.release(t2);
        assert_eq!(h.undo_records(), 0);
        assert_eq!(h.pinned(), 0);
    }

    #[test]
    fn test_shared_view_releases_on_drop() {
        let shared = SharedHistory::new(Graph::new());
        {
            let view = shared.new_graph_view();
            shared.apply(&modification("a", &["x"]));
            assert!(!view.has_refs_from(b"a"));
            assert_eq!(shared.pinned(), 1);
        }
        assert_eq!(shared.pinned(), 0);
        assert!(shared.with_current(|g| g.has_refs_from(b"a")));
    }
}
