//! Validation of a ramdisk request against host capabilities and free memory.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::caps::HostCapabilities;
use crate::fs_type::{FsType, UnknownFsType};
use crate::mem::{MemoryProbeError, MemorySnapshot};

/// One user-initiated creation attempt.
///
/// `size` is kept as the raw text the user typed; parsing it is part of
/// planning so that bad input is reported as its own rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub fs_type: FsType,
    pub mount_point: PathBuf,
    pub size: String,
}

impl MountRequest {
    pub fn new(fs_type: FsType, mount_point: impl Into<PathBuf>, size: impl Into<String>) -> Self {
        Self {
            fs_type,
            mount_point: mount_point.into(),
            size: size.into(),
        }
    }
}

/// A request that passed every check and may be handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedPlan {
    pub fs_type: FsType,
    pub mount_point: PathBuf,
    pub size_mb: u64,
}

impl AcceptedPlan {
    /// Arguments for `mount`: `-t <type> -o size=<N>M <type> <mount_point>`.
    pub fn mount_args(&self) -> Vec<String> {
        vec![
            "-t".to_string(),
            self.fs_type.as_str().to_string(),
            "-o".to_string(),
            format!("size={}M", self.size_mb),
            self.fs_type.as_str().to_string(),
            self.mount_point.to_string_lossy().into_owned(),
        ]
    }

    /// Warning to show before mounting, if any.
    ///
    /// ramfs ignores `size=`; it keeps growing as it is filled.
    pub fn advisory(&self) -> Option<&'static str> {
        match self.fs_type {
            FsType::Ramfs => Some(
                "ramfs will dynamically allocate more memory to itself if you fill it. \
                 This can hang the system if it eventually runs out of memory.",
            ),
            FsType::Tmpfs => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RejectReason {
    #[error("size {input:?} is not a positive whole number of megabytes")]
    InvalidSize { input: String },

    #[error(
        "creating this ramdisk would use more memory than is free \
         (free: {free}, requested: {requested_mb}M)"
    )]
    InsufficientMemory { free: MemorySnapshot, requested_mb: u64 },

    #[error("{fs_type} is not supported by this system")]
    UnsupportedFilesystemType { fs_type: FsType },

    #[error(transparent)]
    UnknownFilesystemType(#[from] UnknownFsType),

    #[error("mount point must not be empty")]
    InvalidMountPoint,

    #[error("could not read free memory: {0}")]
    MemoryUnavailable(#[from] MemoryProbeError),
}

/// Parse the raw size text. Zero, negative and non-numeric input are invalid.
pub fn parse_size(input: &str) -> Result<u64, RejectReason> {
    let invalid = || RejectReason::InvalidSize { input: input.trim().to_string() };
    let size: i64 = input.trim().parse().map_err(|_| invalid())?;
    if size <= 0 {
        return Err(invalid());
    }
    Ok(size as u64)
}

/// Decide whether `request` may be mounted right now.
///
/// Checks run in a fixed order and the first failure is reported: size
/// syntax, memory headroom, filesystem support, mount point.
pub fn plan(
    request: &MountRequest,
    caps: &HostCapabilities,
    mem: &MemorySnapshot,
) -> Result<AcceptedPlan, RejectReason> {
    let size_mb = parse_size(&request.size)?;

    // Compare in kilobytes; the rounded MB figure is for display only.
    let fits = size_mb
        .checked_mul(1000)
        .map_or(false, |needed_kb| needed_kb <= mem.free_kilobytes);
    if !fits {
        return Err(RejectReason::InsufficientMemory { free: *mem, requested_mb: size_mb });
    }

    if !caps.supports(request.fs_type) {
        return Err(RejectReason::UnsupportedFilesystemType { fs_type: request.fs_type });
    }

    if is_blank(&request.mount_point) {
        return Err(RejectReason::InvalidMountPoint);
    }

    Ok(AcceptedPlan {
        fs_type: request.fs_type,
        mount_point: request.mount_point.clone(),
        size_mb,
    })
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}
