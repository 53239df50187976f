use rustc_hash::FxHashSet;
use tracing::debug;

use dackbox_core::{display_key, BucketHandler, Result};
use dackbox_graph::RGraph;

use crate::transaction::Transaction;

/// What happens to a record's children when it is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPolicy {
    /// Only the record itself is deleted
    #[default]
    None,
    /// Children no other live record references are deleted too, recursively
    CascadeAllChildren,
}

/// Deletes records of one bucket
#[derive(Debug, Clone)]
pub struct Deleter {
    bucket: BucketHandler,
    policy: GcPolicy,
}

impl Deleter {
    /// Deleter for `prefix` without cascading
    pub fn new(prefix: &[u8]) -> Self {
        Self {
            bucket: BucketHandler::new(prefix),
            policy: GcPolicy::None,
        }
    }

    /// Set the child collection policy
    pub fn with_policy(mut self, policy: GcPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The configured policy
    pub fn policy(&self) -> GcPolicy {
        self.policy
    }

    /// Delete the record with `id`; returns every deleted key
    pub fn delete(&self, txn: &mut Transaction, id: &str) -> Result<Vec<Vec<u8>>> {
        self.delete_in(txn, &self.bucket.get_key(id))
    }

    /// Delete the record at `key`; returns every deleted key
    ///
    /// Each deleted key loses its record, its outgoing edges and every edge
    /// pointing at it, and is queued for removal from the index.
    pub fn delete_in(&self, txn: &mut Transaction, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let doomed = match self.policy {
            GcPolicy::None => vec![key.to_vec()],
            GcPolicy::CascadeAllChildren => collect_cascade(txn.graph(), key),
        };
        for k in &doomed {
            txn.delete(k)?;
            txn.mark_dirty(k, None);
            let mut graph = txn.graph_mut()?;
            graph.delete_refs_from(k)?;
            graph.delete_refs_to(k)?;
        }
        debug!(
            target: "dackbox::txn",
            root = %display_key(key),
            deleted = doomed.len(),
            "Records deleted"
        );
        Ok(doomed)
    }
}

/// Keys removed by deleting `root` with [`GcPolicy::CascadeAllChildren`]
///
/// Starting from `root`, a child is collected once every record referencing
/// it is collected. Whenever a key is collected its children are checked
/// again, so a child shared by several collected parents is found no matter
/// which parent is visited first. `root` comes first in the result; a key
/// appears at most once.
pub fn collect_cascade<G: RGraph + ?Sized>(graph: &G, root: &[u8]) -> Vec<Vec<u8>> {
    let mut collected: FxHashSet<Vec<u8>> = FxHashSet::default();
    collected.insert(root.to_vec());
    let mut order = vec![root.to_vec()];
    let mut stack = vec![root.to_vec()];

    while let Some(node) = stack.pop() {
        for child in graph.get_refs_from(&node) {
            if collected.contains(&child) {
                continue;
            }
            let orphaned = graph
                .get_refs_to(&child)
                .iter()
                .all(|parent| collected.contains(parent));
            if orphaned {
                collected.insert(child.clone());
                order.push(child.clone());
                stack.push(child);
            }
        }
    }
    order
}
