//! DackBox - transactional record store with a reference graph
//!
//! DackBox couples a byte-keyed record store with an in-memory, versioned
//! graph of references between records. Every commit also feeds a lazy
//! indexing pipeline, and searches are narrowed by walking the graph to the
//! cluster and namespace scopes each record belongs to.
//!
//! # Quick Start
//!
//! ```ignore
//! use dackbox::{BucketRegistry, DackBoxContext, Upserter};
//!
//! let buckets = BucketRegistry::new().with_bucket(b"image", "images")?;
//! let context = DackBoxContext::open_dir("/var/lib/dackbox", buckets, indexer)?;
//!
//! let mut txn = context.dackbox().new_transaction()?;
//! Upserter::<Image>::new(b"image").upsert(&mut txn, &image)?;
//! txn.commit()?;
//! ```
//!
//! # Architecture
//!
//! The layers live in their own crates and are re-exported here:
//! - [`core`]: errors, keys, edge sets, record codec, store contract
//! - [`storage`]: the versioned record store and its commit log
//! - [`graph`]: graph, MVCC history and layered graph views
//! - [`index`]: dedup queue, registries and the lazy indexer
//! - [`engine`]: DackBox, transactions, CRUD codecs, bootstrap, context
//! - [`search`]: scope filters, filtered search, id transformer

pub use dackbox_core as core;
pub use dackbox_engine as engine;
pub use dackbox_graph as graph;
pub use dackbox_index as index;
pub use dackbox_search as search;
pub use dackbox_storage as storage;

pub use dackbox_core::{BucketRegistry, Error, Record, Result, SortedKeys};
pub use dackbox_engine::{
    DackBox, DackBoxConfig, DackBoxContext, Deleter, GcPolicy, InitializedBucket, Reader,
    Transaction, Upserter,
};
pub use dackbox_graph::{GraphProvider, RGraph};
pub use dackbox_index::{Indexer, MemoryIndex, Query, SearchIndex, WrappedIndex, WrapperRegistry};
pub use dackbox_search::{
    AllowedScopes, FilteredSearcher, IndexSearcher, SacFilter, SacFilterBuilder, ScopeChecker,
    Searcher,
};
pub use dackbox_storage::RecordStore;
