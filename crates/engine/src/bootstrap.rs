//! Startup reconciliation between the record store and the search index
//!
//! For every initialized bucket the `<valid>\0<bucket>` sentinel decides how
//! much to replay:
//!
//! - sentinel absent: the index for that bucket cannot be trusted. Its search
//!   category is reset and every record of the bucket is marked dirty and
//!   queued. Markers of records that are gone are dropped.
//! - sentinel present: only keys still marked dirty are queued, with their
//!   current value or a tombstone if the record is gone.
//!
//! Bootstrap then waits for the pipeline to drain. The sentinel is written
//! only if no entry failed to index; failed keys keep their dirty marker.

use std::time::Duration;

use tracing::{debug, info, warn};

use dackbox_core::{display_key, get_bucket_key, Error, Result};
use dackbox_index::{IndexEntry, LazyIndexer, SearchIndex};

use crate::dackbox::DackBox;

/// A bucket reconciled at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedBucket {
    /// Bucket prefix
    pub prefix: Vec<u8>,
    /// Search category reset on a full rebuild, if the bucket has one
    pub category: Option<String>,
}

impl InitializedBucket {
    /// Bucket indexed into `category`
    pub fn new(prefix: &[u8], category: impl Into<String>) -> Self {
        Self {
            prefix: prefix.to_vec(),
            category: Some(category.into()),
        }
    }

    /// Bucket with no category of its own
    pub fn without_category(prefix: &[u8]) -> Self {
        Self {
            prefix: prefix.to_vec(),
            category: None,
        }
    }
}

/// Outcome for one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReport {
    /// Bucket prefix
    pub prefix: Vec<u8>,
    /// True if the bucket was fully rebuilt
    pub full_rebuild: bool,
    /// Entries queued for indexing
    pub queued: usize,
    /// Entries that failed to index; the sentinel is only written when zero
    pub failed: u64,
}

/// Reconcile `buckets` in order
///
/// # Errors
///
/// - `StoreIo` or `Serialization` from the store
/// - `IndexDispatch` if the pipeline does not drain within `timeout`
pub fn init(
    dackbox: &DackBox,
    lazy: &LazyIndexer,
    search: Option<&dyn SearchIndex>,
    buckets: &[InitializedBucket],
    timeout: Duration,
) -> Result<Vec<BucketReport>> {
    let mut reports = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let full_rebuild = needs_reindex(dackbox, &bucket.prefix)?;
        let failed_before = lazy.stats().failed;
        let queued = if full_rebuild {
            if let (Some(search), Some(category)) = (search, bucket.category.as_deref()) {
                search.reset(category)?;
            }
            dackbox.requeue_bucket(&bucket.prefix)?
        } else {
            let entries = dirty_records(dackbox, &bucket.prefix)?;
            let queued = entries.len();
            dackbox.queue().push_all(entries);
            queued
        };
        debug!(
            target: "dackbox::bootstrap",
            bucket = %display_key(&bucket.prefix),
            full_rebuild,
            queued,
            "Queued bucket for indexing"
        );

        if !lazy.wait_idle(timeout) {
            return Err(Error::IndexDispatch(format!(
                "bucket {} not indexed within {:?}",
                display_key(&bucket.prefix),
                timeout
            )));
        }
        let failed = lazy.stats().failed.saturating_sub(failed_before);
        if failed == 0 {
            mark_valid(dackbox, &bucket.prefix)?;
        } else {
            warn!(
                target: "dackbox::bootstrap",
                bucket = %display_key(&bucket.prefix),
                failed,
                "Entries failed to index, bucket left invalid"
            );
        }

        reports.push(BucketReport {
            prefix: bucket.prefix.clone(),
            full_rebuild,
            queued,
            failed,
        });
    }
    info!(
        target: "dackbox::bootstrap",
        buckets = reports.len(),
        rebuilt = reports.iter().filter(|r| r.full_rebuild).count(),
        queued = reports.iter().map(|r| r.queued).sum::<usize>(),
        failed = reports.iter().map(|r| r.failed).sum::<u64>(),
        "Index bootstrap complete"
    );
    Ok(reports)
}

/// Delete the sentinels of `buckets` so the next start rebuilds them fully
pub fn remove_reindex_markers(dackbox: &DackBox, buckets: &[InitializedBucket]) -> Result<()> {
    let valid = dackbox.config().valid_bucket.as_bytes();
    let mut kv = dackbox.store().begin(true)?;
    for bucket in buckets {
        kv.delete(&get_bucket_key(valid, &bucket.prefix))?;
    }
    kv.commit()
}

fn needs_reindex(dackbox: &DackBox, bucket: &[u8]) -> Result<bool> {
    let txn = dackbox.new_read_only_transaction()?;
    let sentinel = get_bucket_key(dackbox.config().valid_bucket.as_bytes(), bucket);
    Ok(txn.get(&sentinel)?.is_none())
}

fn mark_valid(dackbox: &DackBox, bucket: &[u8]) -> Result<()> {
    let key = get_bucket_key(dackbox.config().valid_bucket.as_bytes(), bucket);
    let value = dackbox.config().reindex_value.clone().into_bytes();
    dackbox.atomic_kv_update(move || (key, value))
}

fn dirty_records(dackbox: &DackBox, bucket: &[u8]) -> Result<Vec<(Vec<u8>, IndexEntry)>> {
    let keys = dackbox.dirty_keys_in(bucket)?;
    let txn = dackbox.new_read_only_transaction()?;
    keys.into_iter()
        .map(|key| {
            let value = txn.get(&key)?;
            Ok((key, value))
        })
        .collect()
}
