//! Record codec
//!
//! Records are stored as MessagePack with named fields so that adding a field
//! to a record type does not break existing rows.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A typed record persisted in a bucket
///
/// The id accessor replaces any runtime inspection of the value: the key of a
/// record is always `<bucket>\0<id()>`.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable identifier of this record within its bucket
    fn id(&self) -> &str;
}

/// Serialize a value to MessagePack
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Deserialize a value from MessagePack
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}
