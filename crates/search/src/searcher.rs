//! Searchers and scope-filtered search
//!
//! `IndexSearcher` answers queries over one category of a search index with
//! no authorization at all. `FilteredSearcher` wraps any searcher and drops
//! the results a `SacFilter` rejects, keeping the inner order.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::trace;

use dackbox_core::Result;
use dackbox_index::{Query, SearchIndex};

use crate::filtered::SacFilter;

/// Answers queries with record ids
pub trait Searcher: Send + Sync {
    /// Ids matching `query`
    fn search(&self, query: &Query) -> Result<Vec<String>>;

    /// Number of ids matching `query`
    fn count(&self, query: &Query) -> Result<usize> {
        Ok(self.search(query)?.len())
    }
}

/// Unauthorized searcher over one index category
pub struct IndexSearcher {
    index: Arc<dyn SearchIndex>,
    category: String,
}

impl IndexSearcher {
    /// Search `category` of `index`
    pub fn new(index: Arc<dyn SearchIndex>, category: impl Into<String>) -> Self {
        Self {
            index,
            category: category.into(),
        }
    }

    /// Category searched
    pub fn category(&self) -> &str {
        &self.category
    }
}

impl Searcher for IndexSearcher {
    fn search(&self, query: &Query) -> Result<Vec<String>> {
        self.index.search(&self.category, query)
    }
}

/// A searcher whose results pass through a scope filter
pub struct FilteredSearcher {
    searcher: Arc<dyn Searcher>,
    filter: Arc<dyn SacFilter>,
}

impl FilteredSearcher {
    /// Filter the results of `searcher` with `filter`
    pub fn new(searcher: Arc<dyn Searcher>, filter: Arc<dyn SacFilter>) -> Self {
        Self { searcher, filter }
    }
}

impl Searcher for FilteredSearcher {
    fn search(&self, query: &Query) -> Result<Vec<String>> {
        let mut results = self.searcher.search(query)?;
        let candidates = results.len();
        let allowed: FxHashSet<String> = self.filter.apply(&results)?.into_iter().collect();
        results.retain(|id| allowed.contains(id));
        trace!(target: "dackbox::sac", candidates, visible = results.len(), "Filtered search");
        Ok(results)
    }
}
