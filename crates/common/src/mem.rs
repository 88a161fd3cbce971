use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::probe::{read_report, ProbeError};

pub const DEFAULT_MEMINFO_PATH: &str = "/proc/meminfo";

const MEM_FREE_TOKEN: &str = "MemFree:";

#[derive(Debug, Error)]
pub enum MemoryProbeError {
    #[error(transparent)]
    Read(#[from] ProbeError),

    #[error("no MemFree entry in memory report")]
    MissingMemFree,

    #[error("MemFree value {value:?} is not a number of kilobytes")]
    InvalidValue { value: String },
}

/// Free physical memory at one instant.
///
/// Take a new one before every decision; free memory moves constantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub free_kilobytes: u64,
}

impl MemorySnapshot {
    pub fn new(free_kilobytes: u64) -> Self {
        Self { free_kilobytes }
    }

    /// Megabytes (1 MB = 1000 KB), ties rounded to even. For display only.
    pub fn free_megabytes(&self) -> u64 {
        let (mb, rem) = (self.free_kilobytes / 1000, self.free_kilobytes % 1000);
        if rem > 500 || (rem == 500 && mb % 2 == 1) {
            mb + 1
        } else {
            mb
        }
    }
}

impl fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}MB", self.free_megabytes())
    }
}

/// Source of free-memory readings.
pub trait MemoryProbe {
    /// Current `MemFree` in kilobytes.
    fn read_free_memory(&self) -> Result<u64, MemoryProbeError>;

    fn snapshot(&self) -> Result<MemorySnapshot, MemoryProbeError> {
        self.read_free_memory().map(MemorySnapshot::new)
    }
}

/// Reads `MemFree` from a `/proc/meminfo`-format report on every call.
#[derive(Debug, Clone)]
pub struct MemInfoProbe {
    path: PathBuf,
}

impl MemInfoProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MemInfoProbe {
    fn default() -> Self {
        Self::new(DEFAULT_MEMINFO_PATH)
    }
}

impl MemoryProbe for MemInfoProbe {
    fn read_free_memory(&self) -> Result<u64, MemoryProbeError> {
        let text = read_report(&self.path)?;
        parse_mem_free(&text)
    }
}

/// Find the token exactly equal to `MemFree:` and parse the token after it.
pub fn parse_mem_free(text: &str) -> Result<u64, MemoryProbeError> {
    let mut tokens = text.split_whitespace();
    while let Some(tok) = tokens.next() {
        if tok == MEM_FREE_TOKEN {
            let value = tokens.next().ok_or(MemoryProbeError::MissingMemFree)?;
            return value
                .parse()
                .map_err(|_| MemoryProbeError::InvalidValue { value: value.to_string() });
        }
    }
    Err(MemoryProbeError::MissingMemFree)
}
