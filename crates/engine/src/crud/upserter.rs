use std::sync::Arc;

use dackbox_core::{encode, BucketHandler, Record, Result, SortedKeys};

use crate::transaction::Transaction;

/// Computes the full key of a record
pub type KeyFn<T> = Arc<dyn Fn(&T) -> Vec<u8> + Send + Sync>;

/// Typed writes into one bucket
///
/// By default a record lives at `<bucket>\0<id>`; [`Upserter::with_key_fn`]
/// overrides that.
pub struct Upserter<T> {
    bucket: BucketHandler,
    key_fn: KeyFn<T>,
}

impl<T> Clone for Upserter<T> {
    fn clone(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key_fn: Arc::clone(&self.key_fn),
        }
    }
}

impl<T> std::fmt::Debug for Upserter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upserter").field("bucket", &self.bucket).finish()
    }
}

impl<T: Record> Upserter<T> {
    /// Upserter keying records by id under `prefix`
    pub fn new(prefix: &[u8]) -> Self {
        let bucket = BucketHandler::new(prefix);
        let keys = bucket.clone();
        Self {
            bucket,
            key_fn: Arc::new(move |record: &T| keys.get_key(record.id())),
        }
    }

    /// Upserter using `key_fn` to compute full keys
    pub fn with_key_fn(prefix: &[u8], key_fn: KeyFn<T>) -> Self {
        Self {
            bucket: BucketHandler::new(prefix),
            key_fn,
        }
    }

    /// The bucket this upserter writes
    pub fn bucket(&self) -> &BucketHandler {
        &self.bucket
    }

    /// Key `record` is stored at
    pub fn key_of(&self, record: &T) -> Vec<u8> {
        (self.key_fn)(record)
    }

    /// Encode and stage `record`, returning its key
    pub fn upsert(&self, txn: &mut Transaction, record: &T) -> Result<Vec<u8>> {
        let key = self.key_of(record);
        let bytes = encode(record)?;
        txn.set(&key, &bytes)?;
        txn.mark_dirty(&key, Some(bytes));
        Ok(key)
    }

    /// Upsert `record` and add the edge `parent -> record`
    pub fn upsert_in(
        &self,
        txn: &mut Transaction,
        parent: &[u8],
        record: &T,
    ) -> Result<Vec<u8>> {
        let key = self.upsert(txn, record)?;
        txn.graph_mut()?.add_refs(parent, std::slice::from_ref(&key))?;
        Ok(key)
    }

    /// Upsert `record` and replace its outgoing edges with `children`
    pub fn upsert_with_refs(
        &self,
        txn: &mut Transaction,
        record: &T,
        children: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        let key = self.upsert(txn, record)?;
        txn.graph_mut()?
            .set_refs(&key, SortedKeys::sort(children.to_vec()))?;
        Ok(key)
    }
}
