//! Filter for records owned by a namespace

use std::sync::Arc;

use tracing::{trace, warn};

use dackbox_core::{get_bucket_key, strip_bucket, Result, SortedKeys};
use dackbox_graph::{GraphProvider, RGraph};

use super::{CheckErrors, SacFilter};
use crate::sac::{ScopeChecker, ScopeKey};
use crate::transformer::{ids_in, walk, Direction};

/// Admits an id if any (cluster, namespace) pair it belongs to is permitted
///
/// The walk follows the cluster path; the key reached at `namespace_index`
/// is the namespace, the key reached at the end is its cluster.
pub struct NamespaceFilter {
    checker: Arc<dyn ScopeChecker>,
    provider: Arc<dyn GraphProvider>,
    path: Vec<Vec<u8>>,
    namespace_index: usize,
}

impl NamespaceFilter {
    pub(crate) fn new(
        checker: Arc<dyn ScopeChecker>,
        provider: Arc<dyn GraphProvider>,
        path: Vec<Vec<u8>>,
        namespace_index: usize,
    ) -> Self {
        Self {
            checker,
            provider,
            path,
            namespace_index,
        }
    }

    /// `[Cluster, Namespace]` scope paths `id` belongs to
    pub(crate) fn scopes_of<G: RGraph + ?Sized>(&self, graph: &G, id: &str) -> Vec<Vec<ScopeKey>> {
        let namespace_prefix = &self.path[self.namespace_index];
        let cluster_prefix = &self.path[self.path.len() - 1];

        let start = SortedKeys::from(vec![get_bucket_key(&self.path[0], id.as_bytes())]);
        let namespaces = walk(
            graph,
            start,
            &self.path[..=self.namespace_index],
            Direction::Backward,
        );

        let mut scopes = Vec::new();
        for namespace_key in &namespaces {
            let Some(namespace) = strip_bucket(namespace_prefix, namespace_key) else {
                continue;
            };
            let namespace = String::from_utf8_lossy(namespace).into_owned();
            let clusters = walk(
                graph,
                SortedKeys::from(vec![namespace_key.clone()]),
                &self.path[self.namespace_index..],
                Direction::Backward,
            );
            for cluster in ids_in(cluster_prefix, &clusters) {
                scopes.push(vec![
                    ScopeKey::Cluster(cluster),
                    ScopeKey::Namespace(namespace.clone()),
                ]);
            }
        }
        scopes
    }
}

impl SacFilter for NamespaceFilter {
    fn apply(&self, ids: &[String]) -> Result<Vec<String>> {
        let view = self.provider.new_graph_view();
        let mut admitted = Vec::with_capacity(ids.len());
        let mut errors = CheckErrors::default();

        for id in ids {
            let scopes = self.scopes_of(&view, id);
            if scopes.is_empty() {
                continue;
            }
            match self.checker.any_allowed(&scopes) {
                Ok(true) => admitted.push(id.clone()),
                Ok(false) => {}
                Err(e) => {
                    warn!(target: "dackbox::sac", id = %id, error = %e, "Scope check failed");
                    errors.push(id, e);
                }
            }
        }
        view.discard();

        trace!(target: "dackbox::sac", candidates = ids.len(), admitted = admitted.len(), "Namespace filter applied");
        errors.into_result(admitted)
    }
}
