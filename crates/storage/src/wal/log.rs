//! Append-only commit log
//!
//! Every committed batch is appended as one frame:
//!
//! ```text
//! [length: u32 LE][payload: bincode CommitRecord][crc32: u32 LE]
//! ```
//!
//! - **length**: size of the payload only
//! - **crc32**: CRC32 checksum over the payload
//!
//! Replay stops at the first frame that is truncated or fails its checksum.
//! That tail is the remnant of a write interrupted by a crash; it is cut off
//! so the next append starts on a frame boundary.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dackbox_core::{Error, Result};

use super::durability::DurabilityMode;

const LENGTH_SIZE: usize = 4;
const CRC_SIZE: usize = 4;

/// One staged operation inside a committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    /// Key written with value
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Key deleted
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

/// One committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Store version assigned at commit
    pub version: u64,
    /// Operations in key order
    pub ops: Vec<LogOp>,
}

/// Encode a record into a checksummed frame
pub fn encode_frame(record: &CommitRecord) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Serialization("commit record too large".to_string()))?;

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut buf = Vec::with_capacity(LENGTH_SIZE + payload.len() + CRC_SIZE);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Decode one frame at the start of `buf`
///
/// Returns `None` if the frame is incomplete or its checksum does not match,
/// otherwise the record and the number of bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Option<(CommitRecord, usize)> {
    if buf.len() < LENGTH_SIZE {
        return None;
    }
    let mut len_bytes = [0u8; LENGTH_SIZE];
    len_bytes.copy_from_slice(&buf[..LENGTH_SIZE]);
    let len = u32::from_le_bytes(len_bytes) as usize;

    let total = LENGTH_SIZE.checked_add(len)?.checked_add(CRC_SIZE)?;
    if buf.len() < total {
        return None;
    }
    let payload = &buf[LENGTH_SIZE..LENGTH_SIZE + len];
    let mut crc_bytes = [0u8; CRC_SIZE];
    crc_bytes.copy_from_slice(&buf[LENGTH_SIZE + len..total]);
    let expected = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != expected {
        return None;
    }
    let record = bincode::deserialize(payload).ok()?;
    Some((record, total))
}

/// Writer half of the commit log
#[derive(Debug)]
pub struct CommitLog {
    path: PathBuf,
    writer: BufWriter<File>,
    mode: DurabilityMode,
}

impl CommitLog {
    /// Open (or create) the log at `path` and return it with every intact record
    pub fn open(path: &Path, mode: DurabilityMode) -> Result<(Self, Vec<CommitRecord>)> {
        let mut bytes = Vec::new();
        if path.exists() {
            File::open(path)?.read_to_end(&mut bytes)?;
        }

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match decode_frame(&bytes[offset..]) {
                Some((record, used)) => {
                    records.push(record);
                    offset += used;
                }
                None => break,
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if offset < bytes.len() {
            warn!(
                target: "dackbox::storage",
                path = %path.display(),
                valid_bytes = offset,
                dropped_bytes = bytes.len() - offset,
                "Truncating torn commit log tail"
            );
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }

        let mut writer = BufWriter::new(file);
        writer.seek(SeekFrom::Start(offset as u64))?;

        debug!(
            target: "dackbox::storage",
            path = %path.display(),
            records = records.len(),
            "Commit log opened"
        );

        Ok((
            Self {
                path: path.to_path_buf(),
                writer,
                mode,
            },
            records,
        ))
    }

    /// Append one committed batch
    pub fn append(&mut self, record: &CommitRecord) -> Result<()> {
        let frame = encode_frame(record)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        if self.mode.requires_immediate_fsync() {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Flush buffered frames and fsync
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
