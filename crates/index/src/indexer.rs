//! The indexer contract

use dackbox_core::Result;

/// Something that can index and un-index record values
///
/// Both calls must be idempotent: the pipeline delivers at least once.
pub trait Indexer: Send + Sync {
    /// Index (or re-index) `value` under `key`
    fn index(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key` from the index; removing an absent key succeeds
    fn delete(&self, key: &[u8]) -> Result<()>;
}
