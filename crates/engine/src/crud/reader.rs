use std::marker::PhantomData;

use dackbox_core::{bucket_prefix, decode, BucketHandler, Record, Result};

use crate::transaction::Transaction;

/// Typed reads of one bucket
///
/// Absence is `None` or `false`, never an error. A stored value that does not
/// decode as `T` is a `Serialization` error.
pub struct Reader<T> {
    bucket: BucketHandler,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader").field("bucket", &self.bucket).finish()
    }
}

impl<T: Record> Reader<T> {
    /// Reader for records stored under `prefix`
    pub fn new(prefix: &[u8]) -> Self {
        Self {
            bucket: BucketHandler::new(prefix),
            _record: PhantomData,
        }
    }

    /// The bucket this reader decodes
    pub fn bucket(&self) -> &BucketHandler {
        &self.bucket
    }

    /// True if a record with `id` exists
    pub fn exists(&self, txn: &Transaction, id: &str) -> Result<bool> {
        self.exists_in(txn, &self.bucket.get_key(id))
    }

    /// The record with `id`
    pub fn get(&self, txn: &Transaction, id: &str) -> Result<Option<T>> {
        self.read_in(txn, &self.bucket.get_key(id))
    }

    /// Every record of this reader's bucket, in key order
    pub fn get_all(&self, txn: &Transaction) -> Result<Vec<T>> {
        self.read_all_in(txn, self.bucket.prefix())
    }

    /// True if `key` holds a value
    pub fn exists_in(&self, txn: &Transaction, key: &[u8]) -> Result<bool> {
        Ok(txn.get(key)?.is_some())
    }

    /// Decode the record stored at `key`
    pub fn read_in(&self, txn: &Transaction, key: &[u8]) -> Result<Option<T>> {
        txn.get(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    /// Every key of `bucket`, in key order
    pub fn read_keys_in(&self, txn: &Transaction, bucket: &[u8]) -> Result<Vec<Vec<u8>>> {
        txn.keys_with_prefix(&bucket_prefix(bucket))
    }

    /// Decode every record of `bucket`, in key order
    pub fn read_all_in(&self, txn: &Transaction, bucket: &[u8]) -> Result<Vec<T>> {
        txn.scan_prefix(&bucket_prefix(bucket))?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }

    /// Number of keys in `bucket`
    pub fn count_in(&self, txn: &Transaction, bucket: &[u8]) -> Result<usize> {
        Ok(self.read_keys_in(txn, bucket)?.len())
    }
}
