//! Revision-keyed artifact cache.
//!
//! One JSON file per revision under the cache directory, named
//! `<revision>.json`. The presence of that file is the only cache-hit signal;
//! its content is never consulted before deciding to extract.
//!
//! Artifacts are written through a temp file and persisted without clobbering,
//! so a file is either absent or complete and is never replaced once written.
//! The only way to remove artifacts is [`ArtifactCache::invalidate_all`].

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{MonitorError, MonitorResult};
use crate::models::{CachedArtifact, Revision};

const ARTIFACT_EXT: &str = "json";

/// A cached artifact file as seen on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub revision: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Result of a full cache sweep.
#[derive(Debug, Default)]
pub struct Sweep {
    /// File names that were deleted.
    pub removed: Vec<String>,
    /// Files that could not be deleted.
    pub failed: Vec<(PathBuf, std::io::Error)>,
}

impl Sweep {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, revision: &Revision) -> PathBuf {
        self.dir.join(format!("{}.{}", revision.as_str(), ARTIFACT_EXT))
    }

    pub fn exists(&self, revision: &Revision) -> bool {
        self.path_for(revision).is_file()
    }

    /// Persist `artifact` for `revision`.
    ///
    /// Fails with [`MonitorError::Io`] if the directory cannot be created or
    /// written, or if an artifact for this revision already exists.
    pub fn write(&self, revision: &Revision, artifact: &CachedArtifact) -> MonitorResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| MonitorError::io(&self.dir, e))?;

        let json = serde_json::to_vec(artifact)?;
        let target = self.path_for(revision);

        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|e| MonitorError::io(&self.dir, e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| MonitorError::io(tmp.path(), e))?;
        tmp.persist_noclobber(&target)
            .map_err(|e| MonitorError::io(&target, e.error))?;

        debug!(
            revision = %revision,
            path = %target.display(),
            bytes = json.len(),
            "artifact cached"
        );
        Ok(target)
    }

    /// Load the artifact for `revision`, if cached.
    pub fn read(&self, revision: &Revision) -> MonitorResult<Option<CachedArtifact>> {
        let path = self.path_for(revision);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MonitorError::io(path, e)),
        }
    }

    /// All `<revision>.json` entries, sorted by revision. A missing directory
    /// is empty.
    ///
    /// Entries are listed whatever their file type, so something that is not a
    /// regular file under an artifact name shows up here and in sweeps.
    pub fn list(&self) -> MonitorResult<Vec<CachedFile>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MonitorError::io(&self.dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MonitorError::io(&self.dir, e))?;
            let path = entry.path();
            if !is_artifact(&path) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let revision = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            files.push(CachedFile {
                revision,
                path,
                size,
            });
        }

        files.sort_by(|a, b| a.revision.cmp(&b.revision));
        Ok(files)
    }

    /// Delete every artifact file.
    ///
    /// Deletions are independent: a failure is logged and collected, and the
    /// sweep carries on with the remaining files.
    pub fn invalidate_all(&self) -> MonitorResult<Sweep> {
        let mut sweep = Sweep::default();
        for file in self.list()? {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match std::fs::remove_file(&file.path) {
                Ok(()) => sweep.removed.push(name),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => sweep.removed.push(name),
                Err(e) => {
                    warn!(
                        path = %file.path.display(),
                        error = %e,
                        "failed to discard cached artifact"
                    );
                    sweep.failed.push((file.path, e));
                }
            }
        }
        Ok(sweep)
    }
}

fn is_artifact(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXT)
        && !path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
}
