//! Last-checked state, one record per monitored environment.
//!
//! The whole set is written as a single JSON snapshot that replaces the
//! previous file atomically. Callers assemble the complete set before saving.

use std::path::{Path, PathBuf};

use crate::error::{MonitorError, MonitorResult};
use crate::models::LastCheckedRecord;
use crate::reference::write_atomic;

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the persisted snapshot with `records`.
    pub fn save(&self, records: &[LastCheckedRecord]) -> MonitorResult<()> {
        let json = serde_json::to_vec(records)?;
        write_atomic(&self.path, &json)
    }

    /// Load the persisted snapshot. A missing file is an empty snapshot.
    pub fn load(&self) -> MonitorResult<Vec<LastCheckedRecord>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(MonitorError::io(&self.path, e)),
        }
    }
}
