//! Key-value store contract
//!
//! This module defines the `KvStore` and `KvTxn` traits that the engine is
//! written against. The engine supplies its own MVCC for the graph; from the
//! store it only needs:
//!
//! - point reads and prefix scans in key order
//! - buffered writes committed atomically as one batch
//! - explicit discard
//! - a single writer at a time (`begin(true)` blocks while another writable
//!   transaction is open) and any number of snapshot readers

use crate::error::Result;

/// A transactional, ordered, byte-keyed store
///
/// Thread safety: `begin` may be called from any thread.
pub trait KvStore: Send + Sync {
    /// Open a transaction
    ///
    /// A writable transaction blocks until no other writable transaction is
    /// open. Read-only transactions never block.
    fn begin(&self, writable: bool) -> Result<Box<dyn KvTxn>>;

    /// Flush and release any resources held by the store
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// One open store transaction
///
/// Reads observe the snapshot taken at `begin` plus this transaction's own
/// uncommitted writes.
pub trait KvTxn: Send {
    /// True if writes are permitted
    fn is_writable(&self) -> bool;

    /// Point read
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stage a write
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Stage a delete
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// All pairs whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// All keys starting with `prefix`, in key order
    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(k, _)| k)
            .collect())
    }

    /// Atomically persist every staged write
    fn commit(self: Box<Self>) -> Result<()>;

    /// Drop every staged write
    fn discard(self: Box<Self>);
}
