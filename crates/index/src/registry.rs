//! Longest-prefix dispatch registries
//!
//! Keys look like `<prefix>\0<id>`, where a prefix can itself contain
//! separators for nested buckets. A lookup tries every split point from the
//! longest prefix down and returns the first registered handler; the handler
//! receives the key with its matched prefix stripped.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use dackbox_core::keys::candidate_prefixes;
use dackbox_core::{display_key, Error, Result};

use crate::indexer::Indexer;
use crate::wrapper::{Wrapped, Wrapper};

/// Handlers keyed by bucket prefix
pub struct PrefixRegistry<T: ?Sized> {
    handlers: DashMap<Vec<u8>, Arc<T>>,
}

impl<T: ?Sized> Default for PrefixRegistry<T> {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for PrefixRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixRegistry")
            .field("prefixes", &self.prefixes().iter().map(|p| display_key(p)).collect::<Vec<_>>())
            .finish()
    }
}

impl<T: ?Sized> PrefixRegistry<T> {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `prefix`, replacing any previous one
    pub fn register(&self, prefix: &[u8], handler: Arc<T>) {
        debug!(target: "dackbox::index", prefix = %display_key(prefix), "Handler registered");
        self.handlers.insert(prefix.to_vec(), handler);
    }

    /// Longest registered prefix of `key` with its handler
    pub fn find<'k>(&self, key: &'k [u8]) -> Option<(&'k [u8], Arc<T>)> {
        candidate_prefixes(key).find_map(|prefix| {
            self.handlers
                .get(prefix)
                .map(|entry| (prefix, Arc::clone(entry.value())))
        })
    }

    /// True if some registered prefix matches `key`
    pub fn matches(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Registered prefixes in sorted order
    pub fn prefixes(&self) -> Vec<Vec<u8>> {
        let mut out: Vec<Vec<u8>> = self.handlers.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }
}

fn strip<'k>(prefix: &[u8], key: &'k [u8]) -> &'k [u8] {
    &key[prefix.len() + 1..]
}

// ============================================================================
// IndexRegistry
// ============================================================================

/// Dispatches index calls to per-bucket indexers
#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexers: PrefixRegistry<dyn Indexer>,
}

impl IndexRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the indexer for bucket `prefix`
    pub fn register_index(&self, prefix: &[u8], indexer: Arc<dyn Indexer>) {
        self.indexers.register(prefix, indexer);
    }

    /// True if an indexer is registered for `key`'s bucket
    pub fn matches(&self, key: &[u8]) -> bool {
        self.indexers.matches(key)
    }

    fn dispatch(&self, key: &[u8], op: &str) -> Result<(Vec<u8>, Arc<dyn Indexer>)> {
        match self.indexers.find(key) {
            Some((prefix, indexer)) => Ok((strip(prefix, key).to_vec(), indexer)),
            None => Err(Error::IndexDispatch(format!(
                "cannot {}: no indexer registered matched input key {}",
                op,
                display_key(key)
            ))),
        }
    }
}

impl Indexer for IndexRegistry {
    fn index(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let (id, indexer) = self.dispatch(key, "index")?;
        indexer.index(&id, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let (id, indexer) = self.dispatch(key, "delete")?;
        indexer.delete(&id)
    }
}

// ============================================================================
// WrapperRegistry
// ============================================================================

/// Dispatches wrap calls to per-bucket wrappers
#[derive(Debug, Default)]
pub struct WrapperRegistry {
    wrappers: PrefixRegistry<dyn Wrapper>,
}

impl WrapperRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the wrapper for bucket `prefix`
    pub fn register_wrapper(&self, prefix: &[u8], wrapper: Arc<dyn Wrapper>) {
        self.wrappers.register(prefix, wrapper);
    }

    /// True if a wrapper is registered for `key`'s bucket
    pub fn matches(&self, key: &[u8]) -> bool {
        self.wrappers.matches(key)
    }
}

impl Wrapper for WrapperRegistry {
    fn wrap(&self, key: &[u8], value: Option<&[u8]>) -> Result<Wrapped> {
        match self.wrappers.find(key) {
            Some((prefix, wrapper)) => wrapper.wrap(strip(prefix, key), value),
            None => Err(Error::IndexDispatch(format!(
                "no wrapper registered for key {}",
                display_key(key)
            ))),
        }
    }
}
