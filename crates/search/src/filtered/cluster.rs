//! Filter for records owned by a cluster

use std::sync::Arc;

use tracing::{trace, warn};

use dackbox_core::{get_bucket_key, Result, SortedKeys};
use dackbox_graph::{GraphProvider, RGraph};

use super::{CheckErrors, SacFilter};
use crate::sac::{ScopeChecker, ScopeKey};
use crate::transformer::{ids_in, walk, Direction};

/// Admits an id if any cluster it belongs to is permitted
pub struct ClusterFilter {
    checker: Arc<dyn ScopeChecker>,
    provider: Arc<dyn GraphProvider>,
    path: Vec<Vec<u8>>,
}

impl ClusterFilter {
    pub(crate) fn new(
        checker: Arc<dyn ScopeChecker>,
        provider: Arc<dyn GraphProvider>,
        path: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            checker,
            provider,
            path,
        }
    }

    /// Cluster ids `id` reaches by following the path backward
    pub(crate) fn clusters_of<G: RGraph + ?Sized>(&self, graph: &G, id: &str) -> Vec<String> {
        let start = SortedKeys::from(vec![get_bucket_key(&self.path[0], id.as_bytes())]);
        let reached = walk(graph, start, &self.path, Direction::Backward);
        ids_in(&self.path[self.path.len() - 1], &reached)
    }
}

impl SacFilter for ClusterFilter {
    fn apply(&self, ids: &[String]) -> Result<Vec<String>> {
        let view = self.provider.new_graph_view();
        let mut admitted = Vec::with_capacity(ids.len());
        let mut errors = CheckErrors::default();

        for id in ids {
            let clusters = self.clusters_of(&view, id);
            if clusters.is_empty() {
                continue;
            }
            let scopes: Vec<Vec<ScopeKey>> = clusters
                .into_iter()
                .map(|cluster| vec![ScopeKey::Cluster(cluster)])
                .collect();
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

        trace!(target: "dackbox::sac", candidates = ids.len(), admitted = admitted.len(), "Cluster filter applied");
        errors.into_result(admitted)
    }
}
