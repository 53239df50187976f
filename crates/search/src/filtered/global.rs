//! Filter for record types with no cluster or namespace ownership

use std::sync::Arc;

use tracing::trace;

use dackbox_core::Result;

use super::SacFilter;
use crate::sac::ScopeChecker;

/// All-or-nothing filter backed by `ScopeChecker::allowed`
pub struct GlobalFilter {
    checker: Arc<dyn ScopeChecker>,
}

impl GlobalFilter {
    pub(crate) fn new(checker: Arc<dyn ScopeChecker>) -> Self {
        Self { checker }
    }
}

impl SacFilter for GlobalFilter {
    fn apply(&self, ids: &[String]) -> Result<Vec<String>> {
        if self.checker.allowed()? {
            return Ok(ids.to_vec());
        }
        trace!(target: "dackbox::sac", denied = ids.len(), "Global scope denied");
        Ok(Vec::new())
    }
}
