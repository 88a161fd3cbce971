use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Memory-backed filesystem types this tool can mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    Tmpfs,
    Ramfs,
}

impl FsType {
    pub const ALL: [FsType; 2] = [FsType::Tmpfs, FsType::Ramfs];

    /// Name as understood by `mount -t` and listed in `/proc/filesystems`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FsType::Tmpfs => "tmpfs",
            FsType::Ramfs => "ramfs",
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filesystem type {0:?} (expected tmpfs or ramfs)")]
pub struct UnknownFsType(pub String);

impl FromStr for FsType {
    type Err = UnknownFsType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tmpfs" => Ok(FsType::Tmpfs),
            "ramfs" => Ok(FsType::Ramfs),
            _ => Err(UnknownFsType(s.trim().to_string())),
        }
    }
}
