//! Host capability inspection.
//!
//! Run once at startup. The resulting [`HostCapabilities`] value is handed to
//! every planning call by reference and never re-derived mid-session.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::fs_type::FsType;
use crate::probe::{read_report, ProbeError};

pub const DEFAULT_FILESYSTEMS_PATH: &str = "/proc/filesystems";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostCapabilities {
    pub is_linux: bool,
    pub is_privileged: bool,
    pub supports_tmpfs: bool,
    pub supports_ramfs: bool,
}

impl HostCapabilities {
    pub fn supports(&self, fs_type: FsType) -> bool {
        match fs_type {
            FsType::Tmpfs => self.supports_tmpfs,
            FsType::Ramfs => self.supports_ramfs,
        }
    }

    pub fn supported_types(&self) -> Vec<FsType> {
        FsType::ALL.into_iter().filter(|t| self.supports(*t)).collect()
    }
}

/// Conditions that stop the tool before the session starts.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("this operating system ({os}) is not supported; Linux is required")]
    UnsupportedPlatform { os: String },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("this system supports neither tmpfs nor ramfs")]
    NoSupportedFilesystem,
}

#[derive(Debug, Clone)]
pub struct CapabilityInspector {
    os: String,
    filesystems: PathBuf,
    euid: Option<u32>,
}

impl CapabilityInspector {
    /// Inspect the running host, reading filesystem support from `filesystems`.
    pub fn new(filesystems: impl Into<PathBuf>) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            filesystems: filesystems.into(),
            euid: None,
        }
    }

    /// Pretend to run on `os` instead of the compile target.
    pub fn with_os(mut self, os: &str) -> Self {
        self.os = os.to_string();
        self
    }

    /// Use a fixed effective UID instead of asking the kernel.
    pub fn with_euid(mut self, euid: u32) -> Self {
        self.euid = Some(euid);
        self
    }

    pub fn inspect(&self) -> Result<HostCapabilities, InitError> {
        // Everything after this reads /proc, which only means something on Linux.
        if self.os != "linux" {
            return Err(InitError::UnsupportedPlatform { os: self.os.clone() });
        }

        let euid = self.euid.unwrap_or_else(effective_uid);
        let is_privileged = euid == 0;
        if !is_privileged {
            tracing::warn!("running as uid {euid}; mount operations may fail with permission errors");
        }

        let report = read_report(&self.filesystems)?;
        let supports_tmpfs = report.contains(FsType::Tmpfs.as_str());
        let supports_ramfs = report.contains(FsType::Ramfs.as_str());
        tracing::debug!(supports_tmpfs, supports_ramfs, "filesystem support");

        if !supports_tmpfs && !supports_ramfs {
            return Err(InitError::NoSupportedFilesystem);
        }

        Ok(HostCapabilities {
            is_linux: true,
            is_privileged,
            supports_tmpfs,
            supports_ramfs,
        })
    }
}

impl Default for CapabilityInspector {
    fn default() -> Self {
        Self::new(DEFAULT_FILESYSTEMS_PATH)
    }
}

#[cfg(unix)]
fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
fn effective_uid() -> u32 {
    u32::MAX
}
