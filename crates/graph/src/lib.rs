//! Reference graph and MVCC history for DackBox
//!
//! The graph layers, from the bottom up:
//! - Graph: live forward/backward adjacency
//! - History / SharedHistory: pinned timestamps and undo records
//! - RemoteGraph: read-through view at one pinned timestamp
//! - ModifiedGraph: copy-on-write overlay producing a `Modification`
//! - PersistedGraph: overlay mutations staged into a store transaction
//! - DiscardableGraph / GraphProvider: short-lived pinned views

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod discardable;
pub mod graph;
pub mod history;
pub mod modification;
pub mod modified;
pub mod persisted;
pub mod remote;
pub mod traits;

pub use discardable::{DiscardableGraph, GraphProvider};
pub use graph::Graph;
pub use history::{HistoricalView, History, SharedHistory};
pub use modification::Modification;
pub use modified::ModifiedGraph;
pub use persisted::{load_edge_rows, PersistedGraph};
pub use remote::RemoteGraph;
pub use traits::{RGraph, RWGraph};
