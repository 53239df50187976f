//! Bucket registry
//!
//! Buckets are registered once at startup. The registry is consulted when the
//! persisted graph is loaded (edges into unknown buckets are skipped) and for
//! diagnostics.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::keys::{candidate_prefixes, SEPARATOR};

/// Registered buckets and their human-readable labels
#[derive(Debug, Clone, Default)]
pub struct BucketRegistry {
    labels: FxHashMap<Vec<u8>, String>,
}

impl BucketRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bucket prefix
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if the prefix is empty or contains the separator byte
    /// - `BucketConflict` if the prefix is already registered
    pub fn register_bucket(&mut self, prefix: &[u8], label: &str) -> Result<()> {
        if prefix.is_empty() {
            return Err(Error::invalid("bucket prefix must not be empty"));
        }
        if prefix.contains(&SEPARATOR) {
            return Err(Error::invalid(format!(
                "bucket prefix {:?} contains the reserved separator",
                String::from_utf8_lossy(prefix)
            )));
        }
        if let Some(existing) = self.labels.get(prefix) {
            return Err(Error::BucketConflict(format!(
                "prefix {:?} already registered as {:?}",
                String::from_utf8_lossy(prefix),
                existing
            )));
        }
        self.labels.insert(prefix.to_vec(), label.to_string());
        Ok(())
    }

    /// Builder-style registration
    pub fn with_bucket(mut self, prefix: &[u8], label: &str) -> Result<Self> {
        self.register_bucket(prefix, label)?;
        Ok(self)
    }

    /// Label of a registered prefix
    pub fn label(&self, prefix: &[u8]) -> Option<&str> {
        self.labels.get(prefix).map(String::as_str)
    }

    /// True if `prefix` is registered
    pub fn contains(&self, prefix: &[u8]) -> bool {
        self.labels.contains_key(prefix)
    }

    /// Registered prefix owning `key`, longest match first
    pub fn bucket_of<'a>(&self, key: &'a [u8]) -> Option<&'a [u8]> {
        candidate_prefixes(key).find(|p| self.labels.contains_key(*p))
    }

    /// All registered prefixes in sorted order
    pub fn prefixes(&self) -> Vec<Vec<u8>> {
        let mut out: Vec<Vec<u8>> = self.labels.keys().cloned().collect();
        out.sort();
        out
    }

    /// Number of registered buckets
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
