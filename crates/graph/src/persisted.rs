//! Overlay mutations staged into a key-value transaction
//!
//! Every edge change made through a `PersistedGraph` is written to the graph
//! bucket of the open store transaction before the overlay is updated. Edge
//! rows live at `<graph_bucket>\0<source key>` and hold the marshalled target
//! set; a source with no targets has no row.

use dackbox_core::{bucket_prefix, display_key, get_bucket_key, Error, KvTxn, Result, SortedKeys};

use crate::modified::ModifiedGraph;
use crate::remote::RemoteGraph;
use crate::traits::{RGraph, RWGraph};

/// Write handle pairing a store transaction with its graph overlay
pub struct PersistedGraph<'a, G = RemoteGraph> {
    txn: &'a mut dyn KvTxn,
    graph: &'a mut ModifiedGraph<G>,
    graph_bucket: &'a [u8],
}

impl<'a, G: RGraph> PersistedGraph<'a, G> {
    /// Pair `txn` and `graph`, persisting rows under `graph_bucket`
    pub fn new(
        txn: &'a mut dyn KvTxn,
        graph: &'a mut ModifiedGraph<G>,
        graph_bucket: &'a [u8],
    ) -> Self {
        Self {
            txn,
            graph,
            graph_bucket,
        }
    }

    fn persist(&mut self, from: &[u8], to: &SortedKeys) -> Result<()> {
        let row = get_bucket_key(self.graph_bucket, from);
        if to.is_empty() {
            self.txn.delete(&row)
        } else {
            self.txn.set(&row, &to.marshal()?)
        }
    }

    /// Replace the targets of `from`
    pub fn set_refs(&mut self, from: &[u8], to: SortedKeys) -> Result<()> {
        self.persist(from, &to)?;
        self.graph.set_refs(from, to);
        Ok(())
    }

    /// Add targets to `from`
    pub fn add_refs(&mut self, from: &[u8], to: &[Vec<u8>]) -> Result<()> {
        let merged = self
            .graph
            .get_refs_from(from)
            .union(&SortedKeys::sort(to.to_vec()));
        self.set_refs(from, merged)
    }

    /// Remove every edge out of `from`
    pub fn delete_refs_from(&mut self, from: &[u8]) -> Result<()> {
        self.set_refs(from, SortedKeys::new())
    }

    /// Remove every edge into `to`
    ///
    /// Rewrites the rows of every source that referenced `to`.
    pub fn delete_refs_to(&mut self, to: &[u8]) -> Result<()> {
        for source in self.graph.get_refs_to(to) {
            let mut targets = self.graph.get_refs_from(&source);
            targets.remove(to);
            self.persist(&source, &targets)?;
        }
        self.graph.delete_refs_to(to);
        Ok(())
    }
}

impl<G: RGraph> RGraph for PersistedGraph<'_, G> {
    fn get_refs_from(&self, from: &[u8]) -> SortedKeys {
        self.graph.get_refs_from(from)
    }

    fn get_refs_to(&self, to: &[u8]) -> SortedKeys {
        self.graph.get_refs_to(to)
    }
}

/// Load every edge row of `graph_bucket` as (source, targets) pairs
///
/// Fails on the first row that does not decode.
pub fn load_edge_rows(
    txn: &dyn KvTxn,
    graph_bucket: &[u8],
) -> Result<Vec<(Vec<u8>, SortedKeys)>> {
    let prefix = bucket_prefix(graph_bucket);
    txn.scan_prefix(&prefix)?
        .into_iter()
        .map(|(key, value)| {
            let from = key[prefix.len()..].to_vec();
            let to = SortedKeys::unmarshal(&value).map_err(|e| {
                Error::Serialization(format!("edge row {}: {}", display_key(&key), e))
            })?;
            Ok((from, to))
        })
        .collect()
}
