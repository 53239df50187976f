//! Core types and traits for DackBox
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: Error taxonomy shared by every layer
//! - Keys: `<bucket>\0<id>` helpers and `BucketHandler`
//! - SortedKeys: the edge-set type and its wire format
//! - Codec: MessagePack record encoding and the `Record` trait
//! - BucketRegistry: startup registration of buckets
//! - Traits: the key-value store contract (`KvStore`, `KvTxn`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buckets;
pub mod codec;
pub mod error;
pub mod keys;
pub mod sortedkeys;
pub mod traits;

pub use buckets::BucketRegistry;
pub use codec::{decode, encode, Record};
pub use error::{Error, Result};
pub use keys::{
    bucket_prefix, display_key, get_bucket_key, get_prefix, has_prefix, strip_bucket,
    BucketHandler, SEPARATOR,
};
pub use sortedkeys::SortedKeys;
pub use traits::{KvStore, KvTxn};
