//! Asynchronous indexing pipeline for DackBox
//!
//! This crate keeps a search index eventually consistent with committed
//! records:
//! - queue: deduplicating FIFO and its waitable, thread-safe wrapper
//! - registry: longest-prefix dispatch to per-bucket indexers and wrappers
//! - wrapper: record -> search document mapping and the `WrappedIndex` bridge
//! - search_index: search index contract and `MemoryIndex`
//! - lazy: background indexer with batched acknowledgment

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod indexer;
pub mod lazy;
pub mod queue;
pub mod registry;
pub mod search_index;
pub mod wrapper;

pub use indexer::Indexer;
pub use lazy::{Acker, LazyConfig, LazyIndexer, LazyStats};
pub use queue::{DedupQueue, IndexEntry, IndexQueue, WaitableQueue};
pub use registry::{IndexRegistry, PrefixRegistry, WrapperRegistry};
pub use search_index::{MemoryIndex, Query, SearchIndex};
pub use wrapper::{RecordWrapper, Wrapped, WrappedIndex, Wrapper};
