//! Error types for DackBox
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Absence of a record is never an error: lookups return `Ok(None)`.

use std::io;
use thiserror::Error;

/// Result type alias for DackBox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for DackBox
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations on the commit log, config files, ...)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure reported by the underlying key-value store
    ///
    /// Aborts the transaction that observed it.
    #[error("Store error: {0}")]
    StoreIo(String),

    /// Encode/decode failure of a record, edge set or log frame
    ///
    /// Aborts the transaction that observed it.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An edge references an unregistered bucket or a malformed key
    ///
    /// Logged and skipped by readers; only reported by validation helpers.
    #[error("Graph inconsistency: {0}")]
    GraphInconsistency(String),

    /// No indexer or wrapper is registered for the key's bucket
    #[error("Index dispatch error: {0}")]
    IndexDispatch(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Bucket prefix registered twice or colliding with another bucket
    #[error("Bucket conflict: {0}")]
    BucketConflict(String),

    /// The scope checker failed while authorizing one or more ids
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a [`Error::StoreIo`] error
    pub fn store(msg: impl Into<String>) -> Self {
        Error::StoreIo(msg.into())
    }

    /// Shorthand for a [`Error::InvalidOperation`] error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }

    /// Returns true if this error must abort the surrounding transaction
    pub fn is_fatal_to_transaction(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::StoreIo(_) | Error::Serialization(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
    }

    #[test]
    fn test_error_display_store() {
        let err = Error::store("commit failed");
        let msg = err.to_string();
        assert!(msg.contains("Store error"));
        assert!(msg.contains("commit failed"));
    }

    #[test]
    fn test_error_display_graph_inconsistency() {
        let err = Error::GraphInconsistency("edge into unknown bucket".to_string());
        assert!(err.to_string().contains("Graph inconsistency"));
    }

    #[test]
    fn test_error_from_bincode() {
        let invalid_data = vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<String> = bincode::deserialize(&invalid_data).map_err(|e| e.into());
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_error_from_rmp_decode() {
        let result: Result<String> = rmp_serde::from_slice(&[0xc1]).map_err(Error::from);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_transaction_fatality() {
        assert!(Error::store("x").is_fatal_to_transaction());
        assert!(Error::Serialization("x".into()).is_fatal_to_transaction());
        assert!(!Error::IndexDispatch("x".into()).is_fatal_to_transaction());
        assert!(!Error::GraphInconsistency("x".into()).is_fatal_to_transaction());
    }
}
