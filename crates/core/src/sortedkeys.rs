//! Sorted, deduplicated key sets
//!
//! `SortedKeys` is the edge-set representation: every adjacency list in the
//! graph and every persisted edge row is one of these. Set operations work
//! by merging, so they are linear in the combined length.
//!
//! ## Wire format
//!
//! ```text
//! [count: u32 BE] ([len: u16 BE][bytes])*
//! ```

use std::cmp::Ordering;
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// A sorted set of byte keys without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortedKeys(Vec<Vec<u8>>);

impl SortedKeys {
    /// Empty set
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sort and dedupe arbitrary keys
    pub fn sort(mut keys: Vec<Vec<u8>>) -> Self {
        keys.sort();
        keys.dedup();
        Self(keys)
    }

    /// Wrap keys the caller already guarantees to be sorted and unique
    pub fn from_sorted_unchecked(keys: Vec<Vec<u8>>) -> Self {
        debug_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        Self(keys)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the set has no keys
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate keys in order
    pub fn iter(&self) -> std::slice::Iter<'_, Vec<u8>> {
        self.0.iter()
    }

    /// Borrow the underlying slice
    pub fn as_slice(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// Consume into the underlying vector
    pub fn into_vec(self) -> Vec<Vec<u8>> {
        self.0
    }

    /// Position of `key`, if present
    pub fn find(&self, key: &[u8]) -> Option<usize> {
        self.0.binary_search_by(|k| k.as_slice().cmp(key)).ok()
    }

    /// True if `key` is present
    pub fn contains(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Insert `key`; returns false if it was already present
    pub fn insert(&mut self, key: &[u8]) -> bool {
        match self.0.binary_search_by(|k| k.as_slice().cmp(key)) {
            Ok(_) => false,
            Err(idx) => {
                self.0.insert(idx, key.to_vec());
                true
            }
        }
    }

    /// Remove `key`; returns false if it was absent
    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.find(key) {
            Some(idx) => {
                self.0.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Keys in either set
    pub fn union(&self, other: &SortedKeys) -> SortedKeys {
        let mut out = Vec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                Ordering::Less => {
                    out.push(self.0[i].clone());
                    i += 1;
                }
                Ordering::Greater => {
                    out.push(other.0[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    out.push(self.0[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.0[i..]);
        out.extend_from_slice(&other.0[j..]);
        SortedKeys(out)
    }

    /// Keys in both sets
    pub fn intersect(&self, other: &SortedKeys) -> SortedKeys {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    out.push(self.0[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        SortedKeys(out)
    }

    /// Keys in `self` but not in `other`
    pub fn difference(&self, other: &SortedKeys) -> SortedKeys {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() {
            if j >= other.0.len() {
                out.extend_from_slice(&self.0[i..]);
                break;
            }
            match self.0[i].cmp(&other.0[j]) {
                Ordering::Less => {
                    out.push(self.0[i].clone());
                    i += 1;
                }
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        SortedKeys(out)
    }

    /// Encode to the length-prefixed wire format
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let size = 4 + self.0.iter().map(|k| 2 + k.len()).sum::<usize>();
        let mut buf = Vec::with_capacity(size);
        let count = u32::try_from(self.0.len())
            .map_err(|_| Error::Serialization("too many keys in edge set".to_string()))?;
        buf.write_u32::<BigEndian>(count)?;
        for key in &self.0 {
            let len = u16::try_from(key.len()).map_err(|_| {
                Error::Serialization(format!("key of {} bytes exceeds u16 length", key.len()))
            })?;
            buf.write_u16::<BigEndian>(len)?;
            buf.extend_from_slice(key);
        }
        Ok(buf)
    }

    /// Decode from the wire format
    ///
    /// Input that is truncated, carries trailing bytes or is not in sorted
    /// order is rejected.
    pub fn unmarshal(data: &[u8]) -> Result<SortedKeys> {
        let mut cursor = Cursor::new(data);
        let count = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| Error::Serialization(format!("edge set header: {}", e)))?;
        let mut keys = Vec::with_capacity((count as usize).min(data.len() / 2));
        for _ in 0..count {
            let len = cursor
                .read_u16::<BigEndian>()
                .map_err(|e| Error::Serialization(format!("edge set key length: {}", e)))?;
            let mut key = vec![0u8; len as usize];
            cursor
                .read_exact(&mut key)
                .map_err(|e| Error::Serialization(format!("edge set key body: {}", e)))?;
            keys.push(key);
        }
        if cursor.position() as usize != data.len() {
            return Err(Error::Serialization(
                "trailing bytes after edge set".to_string(),
            ));
        }
        if !keys.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::Serialization(
                "edge set is not sorted and unique".to_string(),
            ));
        }
        Ok(SortedKeys(keys))
    }
}

impl From<Vec<Vec<u8>>> for SortedKeys {
    fn from(keys: Vec<Vec<u8>>) -> Self {
        SortedKeys::sort(keys)
    }
}

impl FromIterator<Vec<u8>> for SortedKeys {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        SortedKeys::sort(iter.into_iter().collect())
    }
}

impl IntoIterator for SortedKeys {
    type Item = Vec<u8>;
    type IntoIter = std::vec::IntoIter<Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a SortedKeys {
    type Item = &'a Vec<u8>;
    type IntoIter = std::slice::Iter<'a, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
