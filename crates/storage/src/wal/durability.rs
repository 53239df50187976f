//! Durability mode for the commit log.
//!
//! Defines the durability guarantees for committed batches.

use std::str::FromStr;

use dackbox_core::{Error, Result};

/// Durability mode for commit log writes.
///
/// # Mode Comparison
///
/// | Mode | Log file | fsync | Data Loss Window |
/// |------|----------|-------|------------------|
/// | Cache | none | never | everything |
/// | Buffered | yes | never (OS page cache) | OS crash only |
/// | Always | yes | every commit | zero |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// No persistence - all data lost when the process exits.
    ///
    /// Use case: tests, caches, ephemeral stores.
    Cache,

    /// Frames are written and flushed on commit but not fsynced.
    ///
    /// Survives a process crash, not a power loss.
    Buffered,

    /// fsync after every commit (slowest, maximum durability).
    #[default]
    Always,
}

impl DurabilityMode {
    /// Check if this mode writes a commit log.
    ///
    /// Returns false for Cache mode, true for all others.
    pub fn requires_log(&self) -> bool {
        !matches!(self, DurabilityMode::Cache)
    }

    /// Check if this mode requires fsync on every commit.
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Human-readable description of the mode.
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Cache => "Cache (fastest, all data lost on exit)",
            DurabilityMode::Buffered => "Buffered (survives process crash)",
            DurabilityMode::Always => "Always sync (safest, slowest)",
        }
    }

    /// Config spelling of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            DurabilityMode::Cache => "cache",
            DurabilityMode::Buffered => "buffered",
            DurabilityMode::Always => "always",
        }
    }
}

impl FromStr for DurabilityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cache" => Ok(DurabilityMode::Cache),
            "buffered" => Ok(DurabilityMode::Buffered),
            "always" => Ok(DurabilityMode::Always),
            other => Err(Error::Config(format!(
                "invalid durability mode {:?}, expected \"cache\", \"buffered\" or \"always\"",
                other
            ))),
        }
    }
}
