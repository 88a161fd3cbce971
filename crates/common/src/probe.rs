//! Reading kernel text reports (`/proc/meminfo`, `/proc/filesystems`, ...).
//!
//! Every report read goes through [`read_report`] so that a permission failure
//! is always classified the same way: the remediation for "you may not read
//! this" (re-run elevated) differs from "the read broke" (investigate).

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("permission denied reading {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    /// Classify an I/O error raised while reading `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            ProbeError::PermissionDenied { path: path.to_path_buf() }
        } else {
            ProbeError::ReadFailed { path: path.to_path_buf(), source: err }
        }
    }

    /// A short remediation hint suitable for showing under the error.
    pub fn hint(&self) -> &'static str {
        match self {
            ProbeError::PermissionDenied { .. } => "re-run with elevated privileges (sudo)",
            ProbeError::ReadFailed { .. } => "check that /proc is mounted and readable",
        }
    }
}

/// Read a whole report into memory.
pub fn read_report(path: &Path) -> Result<String, ProbeError> {
    let text = std::fs::read_to_string(path).map_err(|e| ProbeError::from_io(path, e))?;
    tracing::debug!("read {} ({} bytes)", path.display(), text.len());
    Ok(text)
}
