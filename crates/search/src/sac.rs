//! Scope access control types
//!
//! A caller's permissions are expressed by a `ScopeChecker`. Filters resolve
//! the cluster/namespace scopes a record transitively belongs to and ask the
//! checker whether any of them is permitted.

use rustc_hash::FxHashSet;

use dackbox_core::Result;

/// One level of a scope path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// A cluster id
    Cluster(String),
    /// A namespace id, always preceded by its cluster in a scope path
    Namespace(String),
}

impl ScopeKey {
    /// Shorthand for [`ScopeKey::Cluster`]
    pub fn cluster(id: impl Into<String>) -> Self {
        ScopeKey::Cluster(id.into())
    }

    /// Shorthand for [`ScopeKey::Namespace`]
    pub fn namespace(id: impl Into<String>) -> Self {
        ScopeKey::Namespace(id.into())
    }
}

/// Authorization oracle for one caller
///
/// A scope path is ordered from the widest scope down, e.g.
/// `[Cluster(c), Namespace(ns)]`.
pub trait ScopeChecker: Send + Sync {
    /// True if the caller may see everything the checker guards
    fn allowed(&self) -> Result<bool>;

    /// True if at least one of `scopes` is permitted
    fn any_allowed(&self, scopes: &[Vec<ScopeKey>]) -> Result<bool>;
}

/// A fixed set of grants
///
/// A cluster grant covers every namespace in that cluster.
#[derive(Debug, Clone, Default)]
pub struct AllowedScopes {
    all: bool,
    clusters: FxHashSet<String>,
    namespaces: FxHashSet<(String, String)>,
}

impl AllowedScopes {
    /// No grants
    pub fn none() -> Self {
        Self::default()
    }

    /// Unrestricted access
    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    /// Grant a whole cluster
    pub fn allow_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.clusters.insert(cluster.into());
        self
    }

    /// Grant one namespace of a cluster
    pub fn allow_namespace(
        mut self,
        cluster: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        self.namespaces.insert((cluster.into(), namespace.into()));
        self
    }

    fn permits(&self, path: &[ScopeKey]) -> bool {
        if self.all {
            return true;
        }
        let mut cluster: Option<&str> = None;
        for key in path {
            match key {
                ScopeKey::Cluster(id) => {
                    if self.clusters.contains(id) {
                        return true;
                    }
                    cluster = Some(id);
                }
                ScopeKey::Namespace(ns) => {
                    let Some(cluster) = cluster else {
                        return false;
                    };
                    return self
                        .namespaces
                        .contains(&(cluster.to_string(), ns.clone()));
                }
            }
        }
        false
    }
}

impl ScopeChecker for AllowedScopes {
    fn allowed(&self) -> Result<bool> {
        Ok(self.all)
    }

    fn any_allowed(&self, scopes: &[Vec<ScopeKey>]) -> Result<bool> {
        Ok(scopes.iter().any(|path| self.permits(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_scope(c: &str) -> Vec<ScopeKey> {
        vec![ScopeKey::cluster(c)]
    }

    fn namespace_scope(c: &str, ns: &str) -> Vec<ScopeKey> {
        vec![ScopeKey::cluster(c), ScopeKey::namespace(ns)]
    }

    #[test]
    fn test_none_denies_everything() {
        let scopes = AllowedScopes::none();
        assert!(!scopes.allowed().unwrap());
        assert!(!scopes.any_allowed(&[cluster_scope("c1")]).unwrap());
        assert!(!scopes.any_allowed(&[]).unwrap());
    }

    #[test]
    fn test_all_allows_everything() {
        let scopes = AllowedScopes::all();
        assert!(scopes.allowed().unwrap());
        assert!(scopes.any_allowed(&[namespace_scope("c", "n")]).unwrap());
    }

    #[test]
    fn test_cluster_grant_covers_namespaces() {
        let scopes = AllowedScopes::none().allow_cluster("c1");
        assert!(!scopes.allowed().unwrap());
        assert!(scopes.any_allowed(&[cluster_scope("c1")]).unwrap());
        assert!(scopes
            .any_allowed(&[namespace_scope("c1", "anything")])
            .unwrap());
        assert!(!scopes.any_allowed(&[cluster_scope("c2")]).unwrap());
    }

    #[test]
    fn test_namespace_grant_is_pair_specific() {
        let scopes = AllowedScopes::none().allow_namespace("c1", "web");
        assert!(scopes.any_allowed(&[namespace_scope("c1", "web")]).unwrap());
        assert!(!scopes.any_allowed(&[namespace_scope("c2", "web")]).unwrap());
        assert!(!scopes.any_allowed(&[namespace_scope("c1", "db")]).unwrap());
        // A namespace grant does not open the whole cluster
        assert!(!scopes.any_allowed(&[cluster_scope("c1")]).unwrap());
    }

    #[test]
    fn test_any_of_several_paths() {
        let scopes = AllowedScopes::none().allow_cluster("c2");
        assert!(scopes
            .any_allowed(&[cluster_scope("c1"), cluster_scope("c2")])
            .unwrap());
    }
}
