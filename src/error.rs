//! Error types for the revision monitor core.
//!
//! Each variant maps onto one failure class of a run. Fetch and extraction
//! failures are isolated to the environment that raised them, I/O failures
//! abort only the write that hit them, and a reference-data failure aborts the
//! whole run before any environment is processed.

use std::path::{Path, PathBuf};

/// Top-level error enum for the monitor core.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The remote could not supply a revision or build.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A build could not be turned into a message catalog.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A cache or state file could not be written, read, or deleted.
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The canonical reference data is unreadable or malformed.
    #[error("reference data error: {0}")]
    Reference(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        MonitorError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Short label used in run reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Fetch(_) => "fetch",
            MonitorError::Extraction(_) => "extraction",
            MonitorError::Io { .. } | MonitorError::Serialize(_) => "io",
            MonitorError::Reference(_) => "reference",
        }
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
