//! Bucket-prefixed key helpers
//!
//! Every record lives under `<prefix>\0<id>`. The separator byte is reserved:
//! a bucket prefix may never contain it, which keeps prefixes from colliding
//! (`image` and `image_cve` produce `image\0` and `image_cve\0`).

/// Byte separating a bucket prefix from the record id
pub const SEPARATOR: u8 = b'\0';

/// Build `<prefix>\0<id>`
pub fn get_bucket_key(prefix: &[u8], id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + id.len());
    key.extend_from_slice(prefix);
    key.push(SEPARATOR);
    key.extend_from_slice(id);
    key
}

/// The full byte prefix shared by every key of a bucket (`<prefix>\0`)
pub fn bucket_prefix(prefix: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + 1);
    out.extend_from_slice(prefix);
    out.push(SEPARATOR);
    out
}

/// True if `key` belongs to bucket `prefix`
pub fn has_prefix(prefix: &[u8], key: &[u8]) -> bool {
    key.len() > prefix.len() && key.starts_with(prefix) && key[prefix.len()] == SEPARATOR
}

/// Strip `<prefix>\0` from `key`, returning the id
///
/// Returns `None` when the key is not in the bucket.
pub fn strip_bucket<'a>(prefix: &[u8], key: &'a [u8]) -> Option<&'a [u8]> {
    if has_prefix(prefix, key) {
        Some(&key[prefix.len() + 1..])
    } else {
        None
    }
}

/// Bucket prefix of a key: everything before the first separator
pub fn get_prefix(key: &[u8]) -> Option<&[u8]> {
    key.iter()
        .position(|b| *b == SEPARATOR)
        .map(|idx| &key[..idx])
}

/// Candidate prefixes of a key, longest first
///
/// Bucket ids may themselves contain the separator (nested buckets such as
/// the dirty-key bucket store full record keys as ids), so every separator
/// position is a potential split point.
pub fn candidate_prefixes(key: &[u8]) -> impl Iterator<Item = &[u8]> {
    let positions: Vec<usize> = key
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == SEPARATOR)
        .map(|(idx, _)| idx)
        .collect();
    positions.into_iter().rev().map(move |idx| &key[..idx])
}

/// Lossy rendering of a key for log output
pub fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).replace('\0', ":")
}

// ============================================================================
// BucketHandler
// ============================================================================

/// Convenience wrapper around one bucket prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketHandler {
    prefix: Vec<u8>,
}

impl BucketHandler {
    /// Create a handler for `prefix`
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The bare bucket prefix (without separator)
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Key for a single id
    pub fn get_key(&self, id: &str) -> Vec<u8> {
        get_bucket_key(&self.prefix, id.as_bytes())
    }

    /// Keys for many ids
    pub fn get_keys<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Vec<u8>> {
        ids.iter().map(|id| self.get_key(id.as_ref())).collect()
    }

    /// Id of a key, if the key is in this bucket
    pub fn get_id(&self, key: &[u8]) -> Option<String> {
        strip_bucket(&self.prefix, key).map(|id| String::from_utf8_lossy(id).into_owned())
    }

    /// Ids of all keys in this bucket, skipping foreign keys
    pub fn get_ids<K: AsRef<[u8]>>(&self, keys: &[K]) -> Vec<String> {
        keys.iter().filter_map(|k| self.get_id(k.as_ref())).collect()
    }

    /// Keys belonging to this bucket
    pub fn filter_keys<K: AsRef<[u8]>>(&self, keys: &[K]) -> Vec<Vec<u8>> {
        keys.iter()
            .map(|k| k.as_ref())
            .filter(|k| self.owns(k))
            .map(|k| k.to_vec())
            .collect()
    }

    /// True if `key` belongs to this bucket
    pub fn owns(&self, key: &[u8]) -> bool {
        has_prefix(&self.prefix, key)
    }
}
