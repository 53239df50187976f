//! Commit log and durability modes

mod durability;
mod log;

pub use durability::DurabilityMode;
pub use log::{decode_frame, encode_frame, CommitLog, CommitRecord, LogOp};
