//! On-disk relevance snapshot.
//!
//! The whole store is one MessagePack blob. The format is an implementation
//! detail with no version header: anything that fails to decode is treated
//! as if the file were absent. Writes go to a temp file in the same
//! directory, are fsynced, then renamed over the target so a crash mid-write
//! leaves the previous snapshot intact.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::search::relevance::RelevanceSnapshot;

pub const RELEVANCE_FILE_NAME: &str = "relevance.bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceFile {
    path: PathBuf,
}

impl RelevanceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/relevance.bin`
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(RELEVANCE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, falling back to an empty store on any failure.
    pub fn load(&self) -> RelevanceSnapshot {
        match self.try_load() {
            Ok(snapshot) => {
                debug!(
                    path = %self.path.display(),
                    records = snapshot.records.len(),
                    "loaded relevance snapshot"
                );
                snapshot
            }
            Err(PersistenceError::Missing { .. }) => {
                debug!(path = %self.path.display(), "no relevance snapshot yet");
                RelevanceSnapshot::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable relevance snapshot");
                RelevanceSnapshot::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<RelevanceSnapshot, PersistenceError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PersistenceError::Missing {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };
        Ok(rmp_serde::from_slice(&bytes)?)
    }

    /// Atomically replace the on-disk snapshot.
    pub fn save(&self, snapshot: &RelevanceSnapshot) -> Result<(), PersistenceError> {
        let bytes = rmp_serde::to_vec_named(snapshot)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;

        let mut temp = NamedTempFile::new_in(parent).map_err(|e| PersistenceError::io(parent, e))?;
        temp.write_all(&bytes)
            .map_err(|e| PersistenceError::io(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| PersistenceError::io(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| PersistenceError::io(&self.path, e.error))?;
        sync_dir(parent);

        debug!(
            path = %self.path.display(),
            records = snapshot.records.len(),
            bytes = bytes.len(),
            "saved relevance snapshot"
        );
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(path: &Path) {
    if let Err(e) = File::open(path).and_then(|dir| dir.sync_all()) {
        debug!(path = %path.display(), error = %e, "directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) {}
