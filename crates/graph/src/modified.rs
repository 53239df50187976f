//! Copy-on-write overlay over a read-only base graph
//!
//! `ModifiedGraph` records the full new edge set of every source and target
//! it touches. Reads consult the overlay first and fall back to the base, so
//! the base is never mutated. An overlay entry may be empty: that masks edges
//! the base still has.

use rustc_hash::FxHashMap;

use dackbox_core::SortedKeys;

use crate::modification::Modification;
use crate::remote::RemoteGraph;
use crate::traits::{RGraph, RWGraph};

/// Overlay of staged edge changes above `base`
#[derive(Debug)]
pub struct ModifiedGraph<G = RemoteGraph> {
    base: G,
    forward: FxHashMap<Vec<u8>, SortedKeys>,
    backward: FxHashMap<Vec<u8>, SortedKeys>,
}

impl<G: RGraph> ModifiedGraph<G> {
    /// Empty overlay above `base`
    pub fn new(base: G) -> Self {
        Self {
            base,
            forward: FxHashMap::default(),
            backward: FxHashMap::default(),
        }
    }

    /// The untouched base
    pub fn base(&self) -> &G {
        &self.base
    }

    /// True if no edge has been staged
    pub fn is_clean(&self) -> bool {
        self.forward.is_empty()
    }

    /// The staged forward sets as a mergeable diff
    pub fn modification(&self) -> Modification {
        let mut m = Modification::new();
        for (from, to) in &self.forward {
            m.set(from.clone(), to.clone());
        }
        m
    }

    /// Consume the overlay, returning its diff and the base
    pub fn into_parts(self) -> (Modification, G) {
        let m = self.modification();
        (m, self.base)
    }
}

impl<G: RGraph> RGraph for ModifiedGraph<G> {
    fn get_refs_from(&self, from: &[u8]) -> SortedKeys {
        match self.forward.get(from) {
            Some(staged) => staged.clone(),
            None => self.base.get_refs_from(from),
        }
    }

    fn get_refs_to(&self, to: &[u8]) -> SortedKeys {
        match self.backward.get(to) {
            Some(staged) => staged.clone(),
            None => self.base.get_refs_to(to),
        }
    }
}

impl<G: RGraph> RWGraph for ModifiedGraph<G> {
    fn set_refs(&mut self, from: &[u8], to: SortedKeys) {
        let old = self.get_refs_from(from);
        for removed in old.difference(&to).iter() {
            let mut sources = self.get_refs_to(removed);
            sources.remove(from);
            self.backward.insert(removed.clone(), sources);
        }
        for added in to.difference(&old).iter() {
            let mut sources = self.get_refs_to(added);
            sources.insert(from);
            self.backward.insert(added.clone(), sources);
        }
        self.forward.insert(from.to_vec(), to);
    }

    fn delete_refs_to(&mut self, to: &[u8]) {
        let sources = self.get_refs_to(to);
        for source in sources.iter() {
            let mut targets = self.get_refs_from(source);
            targets.remove(to);
            self.forward.insert(source.clone(), targets);
        }
        self.backward.insert(to.to_vec(), SortedKeys::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn keys(items: &[&str]) -> SortedKeys {
        SortedKeys::sort(items.iter().map(|s| s.as_bytes().to_vec()).collect())
    }

    fn base() -> Graph {
        Graph::from_edges(vec![
            (b"a".to_vec(), keys(&["x", "y"])),
            (b"b".to_vec(), keys(&["x"])),
        ])
    }

    #[test]
    fn test_overlay_masks_base_without_mutating_it() {
        let g = base();
        let mut m = ModifiedGraph::new(&g);
        m.set_refs(b"a", keys(&["z"]));

        assert_eq!(m.get_refs_from(b"a"), keys(&["z"]));
        assert_eq!(m.get_refs_to(b"x"), keys(&["b"]));
        assert!(!m.has_refs_to(b"y"));
        assert_eq!(m.get_refs_to(b"z"), keys(&["a"]));

        assert_eq!(g.get_refs_from(b"a"), keys(&["x", "y"]));
    }

    #[test]
    fn test_delete_refs_to_in_overlay() {
        let g = base();
        let mut m = ModifiedGraph::new(&g);
        m.delete_refs_to(b"x");

        assert_eq!(m.get_refs_from(b"a"), keys(&["y"]));
        assert!(!m.has_refs_from(b"b"));
        assert!(!m.has_refs_to(b"x"));
    }

    #[test]
    fn test_modification_replays_to_same_state() {
        let g = base();
        let mut m = ModifiedGraph::new(&g);
        m.set_refs(b"c", keys(&["x"]));
        m.delete_refs_from(b"a");
        m.add_refs(b"b", &[b"w".to_vec()]);

        let mut merged = g.clone();
        m.modification().apply(&mut merged);

        for key in ["a", "b", "c", "x", "y", "w"] {
            let k = key.as_bytes();
            assert_eq!(merged.get_refs_from(k), m.get_refs_from(k), "from {}", key);
            assert_eq!(merged.get_refs_to(k), m.get_refs_to(k), "to {}", key);
        }
    }

    #[test]
    fn test_clean_overlay_has_empty_modification() {
        let g = base();
        let m = ModifiedGraph::new(&g);
        assert!(m.is_clean());
        assert!(m.modification().is_empty());
    }
}
