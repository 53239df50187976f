//! DackBox engine
//!
//! This crate ties the lower layers together:
//! - DackBox: store + graph history coordinator, transaction factory
//! - Transaction: atomic commit of records, edges and dirty markers
//! - crud: typed Reader / Upserter / Deleter with cascading delete
//! - bootstrap: startup reconciliation of the search index
//! - DackBoxContext: process-lifetime owner with explicit close
//! - config: `dackbox.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod crud;
pub mod dackbox;
pub mod transaction;

pub use bootstrap::{remove_reindex_markers, BucketReport, InitializedBucket};
pub use config::{DackBoxConfig, IndexingConfig, CONFIG_FILE_NAME};
pub use context::DackBoxContext;
pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use crud::{collect_cascade, Deleter, GcPolicy, KeyFn, Reader, Upserter};
pub use dackbox::DackBox;
pub use transaction::Transaction;
