//! Search index contract and an in-memory document index
//!
//! Documents are JSON values grouped by category (one category per record
//! type). `MemoryIndex` keeps them in a `DashMap` of ordered maps so results
//! come back sorted by id.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde_json::Value;

use dackbox_core::Result;

/// A query against one category
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Every document
    All,
    /// Documents whose top-level `field` equals `value`, or is an array containing it
    Match {
        /// Top-level field name
        field: String,
        /// Expected value
        value: Value,
    },
    /// Documents whose id is in the list
    Ids(Vec<String>),
}

impl Query {
    /// Shorthand for [`Query::Match`]
    pub fn matching(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Match {
            field: field.into(),
            value: value.into(),
        }
    }

    fn accepts(&self, id: &str, document: &Value) -> bool {
        match self {
            Query::All => true,
            Query::Match { field, value } => match document.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                Some(found) => found == value,
                None => false,
            },
            Query::Ids(ids) => ids.iter().any(|candidate| candidate == id),
        }
    }
}

/// A document search index
pub trait SearchIndex: Send + Sync {
    /// Insert or replace a document
    fn index(&self, category: &str, id: &str, document: Value) -> Result<()>;

    /// Remove a document; removing an absent document succeeds
    fn delete(&self, category: &str, id: &str) -> Result<()>;

    /// Drop every document of a category
    fn reset(&self, category: &str) -> Result<()>;

    /// Fetch one document
    fn get(&self, category: &str, id: &str) -> Result<Option<Value>>;

    /// Number of documents in a category
    fn count(&self, category: &str) -> Result<usize>;

    /// Ids of matching documents, sorted
    fn search(&self, category: &str, query: &Query) -> Result<Vec<String>>;
}

/// In-process [`SearchIndex`]
#[derive(Debug, Default)]
pub struct MemoryIndex {
    categories: DashMap<String, BTreeMap<String, Value>>,
}

impl MemoryIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchIndex for MemoryIndex {
    fn index(&self, category: &str, id: &str, document: Value) -> Result<()> {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    fn delete(&self, category: &str, id: &str) -> Result<()> {
        if let Some(mut docs) = self.categories.get_mut(category) {
            docs.remove(id);
        }
        Ok(())
    }

    fn reset(&self, category: &str) -> Result<()> {
        self.categories.remove(category);
        Ok(())
    }

    fn get(&self, category: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .categories
            .get(category)
            .and_then(|docs| docs.get(id).cloned()))
    }

    fn count(&self, category: &str) -> Result<usize> {
        Ok(self.categories.get(category).map_or(0, |docs| docs.len()))
    }

    fn search(&self, category: &str, query: &Query) -> Result<Vec<String>> {
        Ok(self
            .categories
            .get(category)
            .map(|docs| {
                docs.iter()
                    .filter(|(id, doc)| query.accepts(id, doc))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
