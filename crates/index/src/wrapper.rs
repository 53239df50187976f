//! Wrappers turn stored records into search documents
//!
//! A wrapper maps a record id and its stored bytes to the category, document
//! id and JSON document the search index stores. `WrappedIndex` plugs a
//! wrapper registry into a [`SearchIndex`] so the pair can serve as the
//! pipeline's [`Indexer`].

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use dackbox_core::{decode, Error, Record, Result};

use crate::indexer::Indexer;
use crate::registry::WrapperRegistry;
use crate::search_index::SearchIndex;

/// A record ready for the search index
#[derive(Debug, Clone, PartialEq)]
pub struct Wrapped {
    /// Search category (one per record type)
    pub category: String,
    /// Document id
    pub id: String,
    /// Document, or `None` when the record was deleted
    pub document: Option<Value>,
}

/// Maps a stored record to its search document
pub trait Wrapper: Send + Sync {
    /// Wrap the record stored under `id`; `value` is `None` for deletes
    fn wrap(&self, id: &[u8], value: Option<&[u8]>) -> Result<Wrapped>;
}

/// Wrapper for a [`Record`] type, serializing the whole record as the document
pub struct RecordWrapper<T> {
    category: String,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RecordWrapper<T> {
    /// Wrapper producing documents in `category`
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Wrapper for RecordWrapper<T> {
    fn wrap(&self, id: &[u8], value: Option<&[u8]>) -> Result<Wrapped> {
        let document = match value {
            Some(bytes) => {
                let record: T = decode(bytes)?;
                Some(
                    serde_json::to_value(&record)
                        .map_err(|e| Error::Serialization(e.to_string()))?,
                )
            }
            None => None,
        };
        Ok(Wrapped {
            category: self.category.clone(),
            id: String::from_utf8_lossy(id).into_owned(),
            document,
        })
    }
}

/// [`Indexer`] that wraps records and writes them to a [`SearchIndex`]
#[derive(Clone)]
pub struct WrappedIndex {
    wrappers: Arc<WrapperRegistry>,
    index: Arc<dyn SearchIndex>,
}

impl WrappedIndex {
    /// Bridge `wrappers` to `index`
    pub fn new(wrappers: Arc<WrapperRegistry>, index: Arc<dyn SearchIndex>) -> Self {
        Self { wrappers, index }
    }

    /// The backing search index
    pub fn search_index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    fn write(&self, wrapped: Wrapped) -> Result<()> {
        match wrapped.document {
            Some(document) => self.index.index(&wrapped.category, &wrapped.id, document),
            None => self.index.delete(&wrapped.category, &wrapped.id),
        }
    }
}

impl Indexer for WrappedIndex {
    fn index(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(self.wrappers.wrap(key, Some(value))?)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(self.wrappers.wrap(key, None)?)
    }
}
