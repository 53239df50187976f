//! Storage layer for DackBox
//!
//! This crate implements the record store behind the engine:
//! - VersionChain: per-key MVCC history
//! - WriterGate: single-writer admission
//! - RecordStore / StoreTxn: ordered snapshot store implementing `KvStore`
//! - wal: append-only commit log and durability modes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod gate;
pub mod store;
pub mod wal;

pub use chain::{StoredVersion, VersionChain};
pub use gate::WriterGate;
pub use store::{RecordStore, StoreTxn, LOG_FILE_NAME};
pub use wal::{CommitLog, CommitRecord, DurabilityMode, LogOp};
