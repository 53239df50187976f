//! Per-key version chains
//!
//! Each key keeps its committed versions newest-first. A `None` value is a
//! tombstone: the key was deleted at that version.

use std::collections::VecDeque;

/// One committed version of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    /// Commit version that wrote this value
    pub version: u64,
    /// Value, or `None` for a delete
    pub value: Option<Vec<u8>>,
}

/// Version chain for MVCC - stores multiple versions of a value
///
/// Versions are stored in descending order (newest first) for efficient
/// snapshot reads - we typically want the most recent version <= snapshot.
#[derive(Debug, Clone)]
pub struct VersionChain {
    versions: VecDeque<StoredVersion>,
}

impl VersionChain {
    /// Create a chain holding a single version
    pub fn new(version: u64, value: Option<Vec<u8>>) -> Self {
        let mut versions = VecDeque::with_capacity(2);
        versions.push_front(StoredVersion { version, value });
        Self { versions }
    }

    /// Add a new version (must be newer than existing versions)
    #[inline]
    pub fn push(&mut self, version: u64, value: Option<Vec<u8>>) {
        debug_assert!(self.versions.front().map_or(true, |v| v.version < version));
        self.versions.push_front(StoredVersion { version, value });
    }

    /// Value visible at `snapshot`
    ///
    /// `None` means the key did not exist (or was deleted) at that version.
    pub fn get_at_version(&self, snapshot: u64) -> Option<&[u8]> {
        self.versions
            .iter()
            .find(|v| v.version <= snapshot)
            .and_then(|v| v.value.as_deref())
    }

    /// Latest committed version
    #[inline]
    pub fn latest(&self) -> Option<&StoredVersion> {
        self.versions.front()
    }

    /// Drop versions no snapshot at or after `min_snapshot` can observe
    ///
    /// The newest version `<= min_snapshot` is kept since it is still what
    /// that snapshot reads.
    pub fn gc(&mut self, min_snapshot: u64) {
        let keep = self
            .versions
            .iter()
            .position(|v| v.version <= min_snapshot)
            .map_or(self.versions.len(), |idx| idx + 1);
        self.versions.truncate(keep);
    }

    /// True if the only remaining version is a tombstone at or before `min_snapshot`
    pub fn is_dead(&self, min_snapshot: u64) -> bool {
        self.versions.len() == 1
            && self
                .versions
                .front()
                .map_or(true, |v| v.value.is_none() && v.version <= min_snapshot)
    }

    /// Number of retained versions
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True if no versions are retained
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
