//! Persisted sentry (session continuity) blob.
//!
//! - K_i: The blob is opaque; it is stored and replayed byte for byte
//! - K_i: Writes replace the file atomically (write-then-rename)
//! - B_i: File may not exist → `None`, forcing a full two-factor logon

use crate::models::{FreebieError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed store for the sentry blob.
#[derive(Debug, Clone)]
pub struct SentryStore {
    path: PathBuf,
}

impl SentryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored blob, if any.
    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "Loaded sentry");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FreebieError::io("reading sentry file", e)),
        }
    }

    /// Replace the stored blob.
    pub fn save(&self, blob: &[u8]) -> Result<()> {
        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        fs::write(&temp_path, blob).map_err(|e| FreebieError::io("writing sentry file", e))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| FreebieError::io("renaming sentry file", e))?;

        info!(bytes = blob.len(), "Sentry file saved");
        Ok(())
    }

    /// Delete the stored blob. Returns whether a file was removed.
    pub fn invalidate(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed stale sentry file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FreebieError::io("removing sentry file", e)),
        }
    }
}
