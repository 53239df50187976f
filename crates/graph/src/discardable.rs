//! Pinned read-only graph views
//!
//! A `DiscardableGraph` owns one history pin and gives it back exactly once,
//! either on `discard()` or when dropped.

use dackbox_core::SortedKeys;

use crate::remote::RemoteGraph;
use crate::traits::RGraph;

/// A read-only graph that must be released when finished
#[derive(Debug)]
pub struct DiscardableGraph {
    graph: RemoteGraph,
    released: bool,
}

impl DiscardableGraph {
    pub(crate) fn new(graph: RemoteGraph) -> Self {
        Self {
            graph,
            released: false,
        }
    }

    /// Timestamp this view reads at
    pub fn timestamp(&self) -> u64 {
        self.graph.timestamp()
    }

    /// Release the pin now
    pub fn discard(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.graph.release();
        }
    }
}

impl Drop for DiscardableGraph {
    fn drop(&mut self) {
        self.release();
    }
}

impl RGraph for DiscardableGraph {
    fn get_refs_from(&self, from: &[u8]) -> SortedKeys {
        self.graph.get_refs_from(from)
    }

    fn get_refs_to(&self, to: &[u8]) -> SortedKeys {
        self.graph.get_refs_to(to)
    }
}

/// Source of fresh graph views for the duration of one operation
pub trait GraphProvider: Send + Sync {
    /// Pin the current graph and return a view of it
    fn new_graph_view(&self) -> DiscardableGraph;
}

impl GraphProvider for crate::history::SharedHistory {
    fn new_graph_view(&self) -> DiscardableGraph {
        crate::history::SharedHistory::new_graph_view(self)
    }
}

impl<P: GraphProvider + ?Sized> GraphProvider for std::sync::Arc<P> {
    fn new_graph_view(&self) -> DiscardableGraph {
        (**self).new_graph_view()
    }
}
