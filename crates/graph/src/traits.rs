//! Read and read-write graph traits
//!
//! Every layer of the graph stack (`Graph`, historical views, `RemoteGraph`,
//! `ModifiedGraph`, `PersistedGraph`, `DiscardableGraph`) reads through
//! `RGraph`. Results are owned so a view backed by a lock never leaks a
//! borrow past the lock guard.

use dackbox_core::SortedKeys;

/// Read-only access to an id -> ids adjacency map and its reverse index
pub trait RGraph {
    /// Targets referenced by `from`, empty if none
    fn get_refs_from(&self, from: &[u8]) -> SortedKeys;

    /// Sources referencing `to`, empty if none
    fn get_refs_to(&self, to: &[u8]) -> SortedKeys;

    /// True if `from` references anything
    fn has_refs_from(&self, from: &[u8]) -> bool {
        !self.get_refs_from(from).is_empty()
    }

    /// True if anything references `to`
    fn has_refs_to(&self, to: &[u8]) -> bool {
        !self.get_refs_to(to).is_empty()
    }

    /// Number of targets referenced by `from`
    fn count_refs_from(&self, from: &[u8]) -> usize {
        self.get_refs_from(from).len()
    }

    /// Number of sources referencing `to`
    fn count_refs_to(&self, to: &[u8]) -> usize {
        self.get_refs_to(to).len()
    }
}

/// Infallible in-memory mutation
pub trait RWGraph: RGraph {
    /// Replace the targets of `from`
    fn set_refs(&mut self, from: &[u8], to: SortedKeys);

    /// Add targets to `from`
    fn add_refs(&mut self, from: &[u8], to: &[Vec<u8>]) {
        let merged = self
            .get_refs_from(from)
            .union(&SortedKeys::sort(to.to_vec()));
        self.set_refs(from, merged);
    }

    /// Remove every edge out of `from`
    fn delete_refs_from(&mut self, from: &[u8]) {
        self.set_refs(from, SortedKeys::new());
    }

    /// Remove every edge into `to`
    fn delete_refs_to(&mut self, to: &[u8]);
}

impl<G: RGraph + ?Sized> RGraph for &G {
    fn get_refs_from(&self, from: &[u8]) -> SortedKeys {
        (**self).get_refs_from(from)
    }

    fn get_refs_to(&self, to: &[u8]) -> SortedKeys {
        (**self).get_refs_to(to)
    }

    fn has_refs_from(&self, from: &[u8]) -> bool {
        (**self).has_refs_from(from)
    }

    fn has_refs_to(&self, to: &[u8]) -> bool {
        (**self).has_refs_to(to)
    }

    fn count_refs_from(&self, from: &[u8]) -> usize {
        (**self).count_refs_from(from)
    }

    fn count_refs_to(&self, to: &[u8]) -> usize {
        (**self).count_refs_to(to)
    }
}
