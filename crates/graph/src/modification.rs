//! Graph diffs produced by write transactions

use std::collections::BTreeMap;

use dackbox_core::SortedKeys;

use crate::traits::RWGraph;

/// The complete forward edge sets a transaction rewrote
///
/// Reverse-index changes are implied by the forward sets, so a modification
/// only records sources. An empty set means "all edges out of this source
/// were removed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modification {
    refs_from: BTreeMap<Vec<u8>, SortedKeys>,
}

impl Modification {
    /// Empty modification
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the final edge set of `from`
    pub fn set(&mut self, from: Vec<u8>, to: SortedKeys) {
        self.refs_from.insert(from, to);
    }

    /// True if nothing changed
    pub fn is_empty(&self) -> bool {
        self.refs_from.is_empty()
    }

    /// Number of rewritten sources
    pub fn len(&self) -> usize {
        self.refs_from.len()
    }

    /// Iterate rewritten sources in key order
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &SortedKeys)> {
        self.refs_from.iter()
    }

    /// Final edge set of `from`, if this modification rewrote it
    pub fn get(&self, from: &[u8]) -> Option<&SortedKeys> {
        self.refs_from.get(from)
    }

    /// Replay onto a graph
    pub fn apply<G: RWGraph + ?Sized>(&self, graph: &mut G) {
        for (from, to) in &self.refs_from {
            graph.set_refs(from, to.clone());
        }
    }
}
