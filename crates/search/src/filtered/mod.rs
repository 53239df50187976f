//! Scope access control filters over the reference graph
//!
//! A filter narrows a batch of candidate ids to those the caller may see:
//! - `GlobalFilter`: one `allowed()` call, no graph walk
//! - `ClusterFilter`: walks child -> parent edges to the owning clusters
//! - `NamespaceFilter`: same walk, remembering the namespace on the way
//!
//! Filters are built with `SacFilterBuilder` and read a fresh graph view
//! per `apply`, so results always follow the live graph. A dangling or
//! mistyped edge simply ends that chain.

mod cluster;
mod global;
mod namespace;

use std::sync::Arc;

use tracing::debug;

use dackbox_core::{Error, Result};
use dackbox_graph::GraphProvider;

use crate::sac::ScopeChecker;
use crate::transformer::owned_path;

pub use cluster::ClusterFilter;
pub use global::GlobalFilter;
pub use namespace::NamespaceFilter;

/// Narrows candidate ids to the ones a caller may see
pub trait SacFilter: Send + Sync {
    /// The subset of `ids` the caller may see, in input order
    ///
    /// Checker failures do not short-circuit the batch; they are collected
    /// and reported together as [`Error::Authorization`].
    fn apply(&self, ids: &[String]) -> Result<Vec<String>>;
}

/// Accumulates per-id checker failures during one `apply`
#[derive(Debug, Default)]
pub(crate) struct CheckErrors {
    messages: Vec<String>,
}

impl CheckErrors {
    pub(crate) fn push(&mut self, id: &str, error: Error) {
        self.messages.push(format!("{}: {}", id, error));
    }

    pub(crate) fn into_result<T>(self, value: T) -> Result<T> {
        if self.messages.is_empty() {
            Ok(value)
        } else {
            Err(Error::Authorization(self.messages.join("; ")))
        }
    }
}

/// Builds the right [`SacFilter`] for a record type
///
/// `cluster_path` lists bucket prefixes from the record's own bucket up to
/// the cluster bucket. `namespace_path` must be a strict prefix of it ending
/// at the namespace bucket.
#[derive(Default)]
pub struct SacFilterBuilder {
    checker: Option<Arc<dyn ScopeChecker>>,
    provider: Option<Arc<dyn GraphProvider>>,
    cluster_path: Vec<Vec<u8>>,
    namespace_path: Vec<Vec<u8>>,
}

impl std::fmt::Debug for SacFilterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SacFilterBuilder")
            .field("has_checker", &self.checker.is_some())
            .field("has_provider", &self.provider.is_some())
            .field("cluster_path", &self.cluster_path)
            .field("namespace_path", &self.namespace_path)
            .finish()
    }
}

impl SacFilterBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorization oracle (required)
    pub fn scope_checker(mut self, checker: Arc<dyn ScopeChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Source of graph views (required with a cluster path)
    pub fn graph_provider(mut self, provider: Arc<dyn GraphProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Buckets from the record's bucket to the cluster bucket
    pub fn cluster_path(mut self, path: &[&[u8]]) -> Self {
        self.cluster_path = owned_path(path);
        self
    }

    /// Buckets from the record's bucket to the namespace bucket
    pub fn namespace_path(mut self, path: &[&[u8]]) -> Self {
        self.namespace_path = owned_path(path);
        self
    }

    /// Validate the options and pick the filter
    pub fn build(self) -> Result<Arc<dyn SacFilter>> {
        let checker = self
            .checker
            .ok_or_else(|| Error::Config("scope checker is required".to_string()))?;

        if self.cluster_path.is_empty() {
            if !self.namespace_path.is_empty() {
                return Err(Error::Config(
                    "namespace path requires a cluster path".to_string(),
                ));
            }
            debug!(target: "dackbox::sac", "Built global filter");
            return Ok(Arc::new(GlobalFilter::new(checker)));
        }

        let provider = self.provider.ok_or_else(|| {
            Error::Config("cluster path requires a graph provider".to_string())
        })?;

        if self.namespace_path.is_empty() {
            debug!(target: "dackbox::sac", hops = self.cluster_path.len(), "Built cluster filter");
            return Ok(Arc::new(ClusterFilter::new(
                checker,
                provider,
                self.cluster_path,
            )));
        }

        if !is_strict_prefix(&self.namespace_path, &self.cluster_path) {
            return Err(Error::Config(
                "namespace path must be a strict prefix of the cluster path".to_string(),
            ));
        }
        let namespace_index = self.namespace_path.len() - 1;
        debug!(
            target: "dackbox::sac",
            hops = self.cluster_path.len(),
            namespace_index,
            "Built namespace filter"
        );
        Ok(Arc::new(NamespaceFilter::new(
            checker,
            provider,
            self.cluster_path,
            namespace_index,
        )))
    }
}

fn is_strict_prefix(prefix: &[Vec<u8>], path: &[Vec<u8>]) -> bool {
    prefix.len() < path.len() && path.starts_with(prefix)
}
