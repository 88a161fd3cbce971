//! User-facing wording and colours.

use colored::{ColoredString, Colorize};

use ramdisk_common::caps::InitError;
use ramdisk_common::exec::ExecutionFailure;
use ramdisk_common::mounts::{format_size_kb, MountedRamdisk, UnmountError};
use ramdisk_common::plan::RejectReason;

pub fn info(s: &str) -> ColoredString {
    s.yellow()
}

pub fn good(s: &str) -> ColoredString {
    s.green()
}

pub fn bad(s: &str) -> ColoredString {
    s.red()
}

/// Message and remediation for an error that stops the tool.
pub fn fatal_lines(err: &InitError) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    match err {
        InitError::Probe(probe) => lines.push(format!("Hint: {}.", probe.hint())),
        InitError::NoSupportedFilesystem => {
            lines.push("Enable tmpfs or ramfs in the kernel before using this tool.".into())
        }
        InitError::UnsupportedPlatform { .. } => {}
    }
    lines
}

pub fn rejection_lines(reason: &RejectReason) -> Vec<String> {
    match reason {
        RejectReason::InsufficientMemory { free, requested_mb } => vec![
            "Creating this ramdisk would use up more system memory than you have free.".into(),
            format!("Your free memory: {free}"),
            format!("Size of the ramdisk: {requested_mb}M"),
        ],
        RejectReason::InvalidSize { .. } => {
            vec![reason.to_string(), "You must enter a whole number of megabytes as the size.".into()]
        }
        RejectReason::UnsupportedFilesystemType { fs_type } => {
            vec![format!("You specified {fs_type}, which your system does not support. Stopping.")]
        }
        other => vec![other.to_string()],
    }
}

pub fn failure_lines(failure: &ExecutionFailure) -> Vec<String> {
    if let ExecutionFailure::MountpointAccessDenied { path } = failure {
        return vec![
            format!("Access denied: {}", path.display()),
            "Check permissions or run as root and retry.".into(),
        ];
    }
    match failure.command_output() {
        Some(output) => vec![
            "An error occurred while creating the ramdisk.".into(),
            format!("{failure}. Here is the output of the mount command:"),
            output.trim_end().to_string(),
        ],
        None => vec![failure.to_string()],
    }
}

pub fn unmount_failure_lines(err: &UnmountError) -> Vec<String> {
    match err {
        UnmountError::CommandFailed { output, .. } => vec![
            format!("{err}. Here is the output of the umount command:"),
            output.trim_end().to_string(),
        ],
        UnmountError::MountTable(probe) => vec![err.to_string(), format!("Hint: {}.", probe.hint())],
        other => vec![other.to_string()],
    }
}

pub fn ramdisk_rows(found: &[MountedRamdisk]) -> Vec<String> {
    found
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "  {}. {:30}  {:5}  {:>9}  ({})",
                i + 1,
                m.mount_point.display().to_string(),
                m.fs_type.as_str(),
                format_size_kb(m.size_kb),
                m.source,
            )
        })
        .collect()
}
