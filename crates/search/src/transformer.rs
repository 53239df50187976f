//! Graph id-space transformer
//!
//! Maps ids of one bucket onto ids of another by walking the graph along a
//! bucket path, one hop per path element. Each hop keeps only neighbours in
//! the next bucket.

use std::sync::Arc;

use tracing::trace;

use dackbox_core::{get_bucket_key, has_prefix, strip_bucket, Error, Result, SortedKeys};
use dackbox_graph::{GraphProvider, RGraph};

/// Edge direction followed at every hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Source to target (`get_refs_from`)
    Forward,
    /// Target to source (`get_refs_to`)
    Backward,
}

/// One hop: neighbours of every key in `keys` that lie in bucket `prefix`
pub(crate) fn step<G: RGraph + ?Sized>(
    graph: &G,
    keys: &SortedKeys,
    prefix: &[u8],
    direction: Direction,
) -> SortedKeys {
    let mut next = SortedKeys::new();
    for key in keys {
        let neighbours = match direction {
            Direction::Forward => graph.get_refs_from(key),
            Direction::Backward => graph.get_refs_to(key),
        };
        for neighbour in neighbours
            .iter()
            .filter(|neighbour| has_prefix(prefix, neighbour))
        {
            next.insert(neighbour);
        }
    }
    next
}

/// Walk `path[1..]` from `start`, which must already lie in `path[0]`
pub(crate) fn walk<G: RGraph + ?Sized>(
    graph: &G,
    start: SortedKeys,
    path: &[Vec<u8>],
    direction: Direction,
) -> SortedKeys {
    let mut keys = start;
    for prefix in path.iter().skip(1) {
        if keys.is_empty() {
            break;
        }
        keys = step(graph, &keys, prefix, direction);
    }
    keys
}

/// Ids behind `keys`, which must all lie in `prefix`
pub(crate) fn ids_in(prefix: &[u8], keys: &SortedKeys) -> Vec<String> {
    keys.iter()
        .filter_map(|key| strip_bucket(prefix, key))
        .map(|id| String::from_utf8_lossy(id).into_owned())
        .collect()
}

pub(crate) fn owned_path(path: &[&[u8]]) -> Vec<Vec<u8>> {
    path.iter().map(|prefix| prefix.to_vec()).collect()
}

/// Maps ids of `path[0]` to the ids of `path[last]` they are connected to
pub struct GraphTransformer {
    provider: Arc<dyn GraphProvider>,
    path: Vec<Vec<u8>>,
    direction: Direction,
}

impl std::fmt::Debug for GraphTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphTransformer")
            .field("path", &self.path)
            .field("direction", &self.direction)
            .finish()
    }
}

impl GraphTransformer {
    /// Follow edges from parent to child, e.g. deployment -> image -> component
    pub fn forward(provider: Arc<dyn GraphProvider>, path: &[&[u8]]) -> Result<Self> {
        Self::new(provider, path, Direction::Forward)
    }

    /// Follow edges from child to parent, e.g. component -> image -> deployment
    pub fn backward(provider: Arc<dyn GraphProvider>, path: &[&[u8]]) -> Result<Self> {
        Self::new(provider, path, Direction::Backward)
    }

    fn new(provider: Arc<dyn GraphProvider>, path: &[&[u8]], direction: Direction) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::Config(
                "graph transformer needs at least one bucket".to_string(),
            ));
        }
        Ok(Self {
            provider,
            path: owned_path(path),
            direction,
        })
    }

    /// Direction followed at every hop
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Ids in the last bucket reachable from `ids`, sorted and deduplicated
    pub fn transform<S: AsRef<str>>(&self, ids: &[S]) -> Vec<String> {
        let first = &self.path[0];
        let start: SortedKeys = ids
            .iter()
            .map(|id| get_bucket_key(first, id.as_ref().as_bytes()))
            .collect();

        let view = self.provider.new_graph_view();
        let reached = walk(&view, start, &self.path, self.direction);
        view.discard();

        let last = &self.path[self.path.len() - 1];
        let out = ids_in(last, &reached);
        trace!(target: "dackbox::sac", input = ids.len(), output = out.len(), "Transformed ids");
        out
    }
}
