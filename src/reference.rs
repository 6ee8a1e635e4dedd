//! Reference hash definitions and change detection.
//!
//! The canonical definitions file is maintained outside this process. Each run
//! copies it over a working copy and compares its SHA-256 fingerprint with the
//! last committed baseline. A change means every cached catalog may have been
//! extracted with stale names, so the caller sweeps the cache.
//!
//! # File format
//!
//! ```toml
//! [incoming]
//! Handshake = "0f5c4d2e..."
//!
//! [outgoing]
//! ClientHello = "8a91be03..."
//! ```
//!
//! # Baseline
//!
//! The committed fingerprint lives in a sidecar next to the working copy
//! (`Hashes.toml.sha256`). Without a sidecar the fingerprint of the previous
//! working copy is written to it before the copy is replaced; with neither,
//! there is no baseline and the refresh is never reported as a change.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{MonitorError, MonitorResult};
use crate::models::Direction;

/// Message name → content hash, per direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReferenceData {
    #[serde(default)]
    pub incoming: BTreeMap<String, String>,
    #[serde(default)]
    pub outgoing: BTreeMap<String, String>,
}

impl ReferenceData {
    pub fn parse(content: &str) -> MonitorResult<Self> {
        toml::from_str(content)
            .map_err(|e| MonitorError::Reference(format!("invalid hash definitions: {}", e)))
    }

    pub fn entries(&self, direction: Direction) -> &BTreeMap<String, String> {
        match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        }
    }
}

/// Outcome of [`ReferenceDataStore::refresh`].
#[derive(Debug, Clone)]
pub struct Refresh {
    /// The canonical content differs from the committed baseline.
    pub changed: bool,
    /// Fingerprint of the working copy after the refresh.
    pub fingerprint: String,
    /// Baseline the refresh was compared against.
    pub baseline: Option<String>,
    pub data: ReferenceData,
}

/// Owns the working copy of the hash definitions.
#[derive(Debug, Clone)]
pub struct ReferenceDataStore {
    source: PathBuf,
    working: PathBuf,
}

impl ReferenceDataStore {
    pub fn new(source: impl Into<PathBuf>, working: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            working: working.into(),
        }
    }

    pub fn working_path(&self) -> &Path {
        &self.working
    }

    fn baseline_path(&self) -> PathBuf {
        let mut name = self.working.as_os_str().to_owned();
        name.push(".sha256");
        PathBuf::from(name)
    }

    /// Copy the canonical file over the working copy and report whether it changed.
    ///
    /// Any failure here is a [`MonitorError::Reference`]: nothing can be
    /// extracted correctly without the definitions.
    pub fn refresh(&self) -> MonitorResult<Refresh> {
        let bytes = std::fs::read(&self.source).map_err(|e| {
            MonitorError::Reference(format!(
                "cannot read canonical definitions {}: {}",
                self.source.display(),
                e
            ))
        })?;
        let content = std::str::from_utf8(&bytes).map_err(|e| {
            MonitorError::Reference(format!(
                "canonical definitions {} are not UTF-8: {}",
                self.source.display(),
                e
            ))
        })?;
        let data = ReferenceData::parse(content)?;

        let baseline = match self.committed()? {
            Some(committed) => Some(committed),
            None => {
                // The sidecar holds the old baseline before the copy is replaced.
                let previous = fingerprint_file(&self.working)?;
                if let Some(previous) = &previous {
                    self.commit(previous).map_err(|e| {
                        MonitorError::Reference(format!("cannot seed baseline: {}", e))
                    })?;
                }
                previous
            }
        };

        write_atomic(&self.working, &bytes)
            .map_err(|e| MonitorError::Reference(format!("cannot refresh working copy: {}", e)))?;
        let fingerprint = fingerprint_file(&self.working)?.ok_or_else(|| {
            MonitorError::Reference(format!(
                "working copy {} vanished after refresh",
                self.working.display()
            ))
        })?;

        let changed = baseline.as_ref().is_some_and(|b| *b != fingerprint);
        debug!(
            working = %self.working.display(),
            fingerprint = %fingerprint,
            baseline = baseline.as_deref().unwrap_or("-"),
            changed,
            "reference data refreshed"
        );

        Ok(Refresh {
            changed,
            fingerprint,
            baseline,
            data,
        })
    }

    /// Fingerprint recorded by the last [`commit`](Self::commit), if any.
    pub fn committed(&self) -> MonitorResult<Option<String>> {
        let path = self.baseline_path();
        match std::fs::read_to_string(&path) {
            Ok(s) => {
                let s = s.trim();
                Ok((!s.is_empty()).then(|| s.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MonitorError::io(path, e)),
        }
    }

    /// Record `fingerprint` as the baseline for the next refresh.
    pub fn commit(&self, fingerprint: &str) -> MonitorResult<()> {
        let path = self.baseline_path();
        write_atomic(&path, format!("{}\n", fingerprint).as_bytes())
    }
}

/// Hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn fingerprint_file(path: &Path) -> MonitorResult<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(fingerprint(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MonitorError::io(path, e)),
    }
}

/// Replace `path` with `bytes` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> MonitorResult<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(|e| MonitorError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| MonitorError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| MonitorError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| MonitorError::io(path, e.error))?;
    Ok(())
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
