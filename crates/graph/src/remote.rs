//! Read-through view of a pinned timestamp

use std::sync::Arc;

use parking_lot::RwLock;

use dackbox_core::SortedKeys;

use crate::history::History;
use crate::traits::RGraph;

/// A graph view that reads the shared history at a fixed timestamp
///
/// Each read takes the history read lock for its own duration only, so a
/// `RemoteGraph` can outlive many merges and still answer consistently, as
/// long as its timestamp stays pinned. The owner is responsible for the pin.
#[derive(Debug, Clone)]
pub struct RemoteGraph {
    history: Arc<RwLock<History>>,
    ts: u64,
}

impl RemoteGraph {
    pub(crate) fn new(history: Arc<RwLock<History>>, ts: u64) -> Self {
        Self { history, ts }
    }

    /// Timestamp this view reads at
    pub fn timestamp(&self) -> u64 {
        self.ts
    }

    /// Unpin this view's timestamp
    pub(crate) fn release(&self) {
        self.history.write().release(self.ts);
    }
}

impl RGraph for RemoteGraph {
    fn get_refs_from(&self, from: &[u8]) -> SortedKeys {
        self.history.read().view(self.ts).get_refs_from(from)
    }

    fn get_refs_to(&self, to: &[u8]) -> SortedKeys {
        self.history.read().view(self.ts).get_refs_to(to)
    }
}
