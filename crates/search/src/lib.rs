//! Scope access control and filtered search for DackBox
//!
//! This crate answers "which of these records may the caller see":
//! - sac: scope keys, the `ScopeChecker` contract and a fixed-grant checker
//! - filtered: global / cluster / namespace filters walking the reference graph
//! - searcher: unauthorized index searcher and the filtered searcher
//! - transformer: mapping ids between buckets along a graph path

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filtered;
pub mod sac;
pub mod searcher;
pub mod transformer;

pub use filtered::{ClusterFilter, GlobalFilter, NamespaceFilter, SacFilter, SacFilterBuilder};
pub use sac::{AllowedScopes, ScopeChecker, ScopeKey};
pub use searcher::{FilteredSearcher, IndexSearcher, Searcher};
pub use transformer::{Direction, GraphTransformer};
