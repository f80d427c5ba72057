//! Persistent storage for Raft state.
//!
//! The three durable fields (current term, vote, and the full log) are
//! written as one bincode blob, replaced atomically (write to a temp file
//! in the same directory, fsync, rename). A reload yields exactly the
//! triple that was last flushed. The blob is small; the flush is
//! synchronous and must complete before any RPC reply that depends on the
//! new durable state.

use super::{LogEntry, PersistentState};
use crate::error::{KvError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The durable triple as laid out on disk.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct DurableState {
    state: PersistentState,
    logs: Vec<LogEntry>,
}

/// Blob-file storage for a node's Raft state.
pub struct RaftStorage {
    path: PathBuf,
}

impl RaftStorage {
    /// Prepare storage at `path`, creating parent directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    /// Load the durable triple, or `None` if nothing was ever flushed.
    ///
    /// A present-but-unreadable blob is an error: booting with partial
    /// durable state would let this node vote or ack twice.
    pub fn load(&self) -> Result<Option<(PersistentState, Vec<LogEntry>)>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let durable: DurableState = bincode::deserialize(&bytes)
            .map_err(|e| KvError::Storage(format!("corrupt state blob {:?}: {}", self.path, e)))?;
        Ok(Some((durable.state, durable.logs)))
    }

    /// Flush the durable triple by atomic replace.
    pub fn save(&self, state: &PersistentState, logs: &[LogEntry]) -> Result<()> {
        let blob = bincode::serialize(&DurableState {
            state: state.clone(),
            logs: logs.to_vec(),
        })?;

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&blob)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Path of the blob file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
