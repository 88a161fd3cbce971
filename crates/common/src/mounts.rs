//! Currently mounted ramdisks, read from the kernel mount table.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::exec::{display_code, CommandRunner};
use crate::fs_type::FsType;
use crate::probe::{read_report, ProbeError};

pub const DEFAULT_MOUNTS_PATH: &str = "/proc/self/mounts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedRamdisk {
    pub source: String,
    pub mount_point: PathBuf,
    pub fs_type: FsType,
    /// Size limit in kilobytes from the `size=` option; ramfs has none.
    pub size_kb: Option<u64>,
    pub options: String,
}

#[derive(Debug, Error)]
pub enum UnmountError {
    #[error(transparent)]
    MountTable(#[from] ProbeError),

    #[error("{} is not a mounted tmpfs or ramfs", .path.display())]
    NotARamdisk { path: PathBuf },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("umount exited with status {}", display_code(.code))]
    CommandFailed { code: Option<i32>, output: String },
}

/// Parse `/proc/self/mounts` text, keeping tmpfs and ramfs entries.
pub fn parse_mount_table(text: &str) -> Vec<MountedRamdisk> {
    let mut found = Vec::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }
        let Ok(fs_type) = parts[2].parse::<FsType>() else {
            continue;
        };
        found.push(MountedRamdisk {
            source: unescape(parts[0]),
            mount_point: PathBuf::from(unescape(parts[1])),
            fs_type,
            size_kb: size_option_kb(parts[3]),
            options: parts[3].to_string(),
        });
    }
    found
}

pub fn list_ramdisks(mounts: &Path) -> Result<Vec<MountedRamdisk>, ProbeError> {
    Ok(parse_mount_table(&read_report(mounts)?))
}

/// Force-unmount the ramdisk at `mount_point` with `<program> -f <mount_point>`.
///
/// Refuses anything that is not currently listed as a tmpfs or ramfs mount.
pub fn unmount(
    runner: &impl CommandRunner,
    program: &str,
    mounts: &Path,
    mount_point: &Path,
) -> Result<MountedRamdisk, UnmountError> {
    let wanted = normalize(mount_point);
    let target = list_ramdisks(mounts)?
        .into_iter()
        .rev() // the last entry for a path is the one on top
        .find(|m| m.mount_point == wanted)
        .ok_or_else(|| UnmountError::NotARamdisk { path: mount_point.to_path_buf() })?;

    let args = vec!["-f".to_string(), target.mount_point.to_string_lossy().into_owned()];
    info!("executing: {program} {}", args.join(" "));
    let out = runner
        .run(program, &args)
        .map_err(|source| UnmountError::Spawn { program: program.to_string(), source })?;
    if !out.success {
        error!("{program} exited {} for {}", display_code(&out.code), target.mount_point.display());
        return Err(UnmountError::CommandFailed { code: out.code, output: out.output });
    }
    info!("unmounted {}", target.mount_point.display());
    Ok(target)
}

/// Human-readable size column: "512M", "1.5G", "unbounded".
pub fn format_size_kb(size_kb: Option<u64>) -> String {
    match size_kb {
        None => "unbounded".to_string(),
        Some(kb) if kb >= 1024 * 1024 => format!("{:.1}G", kb as f64 / (1024.0 * 1024.0)),
        Some(kb) if kb >= 1024 => format!("{}M", kb / 1024),
        Some(kb) => format!("{kb}K"),
    }
}

/// Mount table paths are absolute and canonical; bring user input in line.
fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        let s = path.to_string_lossy();
        let trimmed = s.trim_end_matches('/');
        PathBuf::from(if trimmed.is_empty() { "/" } else { trimmed })
    })
}

/// Decode the kernel's octal escapes (`\040` for space, `\011` tab, `\012`
/// newline, `\134` backslash).
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(b) = u8::try_from(value) {
                    out.push(b);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn size_option_kb(options: &str) -> Option<u64> {
    let value = options.split(',').find_map(|o| o.strip_prefix("size="))?;
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, ""),
    };
    let n: u64 = digits.parse().ok()?;
    match unit.to_ascii_lowercase().as_str() {
        // Bare numbers in the mount table are bytes.
        "" => Some(n / 1024),
        "k" => Some(n),
        "m" => n.checked_mul(1024),
        "g" => n.checked_mul(1024 * 1024),
        _ => None,
    }
}
