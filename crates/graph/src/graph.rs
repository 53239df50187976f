//! In-memory adjacency graph
//!
//! `Graph` keeps a forward map (source -> targets) and a reverse index
//! (target -> sources). The two are always mirror images; no entry ever
//! holds an empty set.

use rustc_hash::FxHashMap;

use dackbox_core::SortedKeys;

use crate::traits::{RGraph, RWGraph};

/// Forward and backward adjacency over fully prefixed keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    forward: FxHashMap<Vec<u8>, SortedKeys>,
    backward: FxHashMap<Vec<u8>, SortedKeys>,
}

impl Graph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (source, targets) pairs
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (Vec<u8>, SortedKeys)>,
    {
        let mut graph = Self::new();
        for (from, to) in edges {
            graph.set_refs(&from, to);
        }
        graph
    }

    /// Number of sources with at least one edge
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// True if the graph has no edges
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(SortedKeys::len).sum()
    }

    /// Iterate (source, targets) pairs in unspecified order
    pub fn edges(&self) -> impl Iterator<Item = (&Vec<u8>, &SortedKeys)> {
        self.forward.iter()
    }

    /// Borrowing lookup of the targets of `from`
    pub fn refs_from(&self, from: &[u8]) -> Option<&SortedKeys> {
        self.forward.get(from)
    }

    /// Borrowing lookup of the sources of `to`
    pub fn refs_to(&self, to: &[u8]) -> Option<&SortedKeys> {
        self.backward.get(to)
    }

    fn unlink_backward(&mut self, target: &[u8], source: &[u8]) {
        if let Some(sources) = self.backward.get_mut(target) {
            sources.remove(source);
            if sources.is_empty() {
                self.backward.remove(target);
            }
        }
    }
}

impl RGraph for Graph {
    fn get_refs_from(&self, from: &[u8]) -> SortedKeys {
        self.forward.get(from).cloned().unwrap_or_default()
    }

    fn get_refs_to(&self, to: &[u8]) -> SortedKeys {
        self.backward.get(to).cloned().unwrap_or_default()
    }

    fn has_refs_from(&self, from: &[u8]) -> bool {
        self.forward.contains_key(from)
    }

    fn has_refs_to(&self, to: &[u8]) -> bool {
        self.backward.contains_key(to)
    }

    fn count_refs_from(&self, from: &[u8]) -> usize {
        self.forward.get(from).map_or(0, SortedKeys::len)
    }

    fn count_refs_to(&self, to: &[u8]) -> usize {
        self.backward.get(to).map_or(0, SortedKeys::len)
    }
}

impl RWGraph for Graph {
    fn set_refs(&mut self, from: &[u8], to: SortedKeys) {
        let old = self.forward.remove(from).unwrap_or_default();
        for removed in old.difference(&to).iter() {
            self.unlink_backward(removed, from);
        }
        for added in to.difference(&old).iter() {
            self.backward
                .entry(added.clone())
                .or_default()
                .insert(from);
        }
        if !to.is_empty() {
            self.forward.insert(from.to_vec(), to);
        }
    }

    fn delete_refs_to(&mut self, to: &[u8]) {
        let Some(sources) = self.backward.remove(to) else {
            return;
        };
        for source in sources.iter() {
            if let Some(targets) = self.forward.get_mut(source) {
                targets.remove(to);
                if targets.is_empty() {
                    self.forward.remove(source);
                }
            }
        }
    }
}
