use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{RaftError, Result};
use crate::raft::state::PersistentState;

/// Stable storage for the node's term and vote.
///
/// Implementations store an opaque blob. A node calls `read_state` once at
/// construction and `save_state` whenever its term or vote changes.
pub trait Persister: Send + Sync + 'static {
    fn save_state(&self, blob: &[u8]) -> Result<()>;

    /// `Ok(None)` on a first-ever start.
    fn read_state(&self) -> Result<Option<Vec<u8>>>;
}

pub fn encode_state(state: &PersistentState) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(state)?)
}

/// Decode a saved blob. Empty blobs decode to `None`.
pub fn decode_state(blob: &[u8]) -> Result<Option<PersistentState>> {
    if blob.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(blob)?))
}

/// Keeps the blob in memory. Clone the `Arc` to hand the same storage to a
/// restarted node.
#[derive(Debug, Default)]
pub struct MemoryPersister {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persister for MemoryPersister {
    fn save_state(&self, blob: &[u8]) -> Result<()> {
        let mut slot = self
            .blob
            .lock()
            .map_err(|_| RaftError::Persistence("memory persister lock poisoned".to_string()))?;
        *slot = Some(blob.to_vec());
        Ok(())
    }

    fn read_state(&self) -> Result<Option<Vec<u8>>> {
        let slot = self
            .blob
            .lock()
            .map_err(|_| RaftError::Persistence("memory persister lock poisoned".to_string()))?;
        Ok(slot.clone())
    }
}

/// Stores the blob in `<dir>/raft-state.json`.
#[derive(Debug, Clone)]
pub struct FilePersister {
    path: PathBuf,
}

impl FilePersister {
    const FILE_NAME: &'static str = "raft-state.json";

    /// Create the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            path: dir.as_ref().join(Self::FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persister for FilePersister {
    fn save_state(&self, blob: &[u8]) -> Result<()> {
        // The data must be on disk before the rename, and the rename before
        // we return, or a power loss can leave an empty file in place.
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(blob)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        sync_dir(&self.path)?;
        Ok(())
    }

    fn read_state(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Flush the directory entry of `path` so a completed rename survives a crash.
#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}
