//! Core of the `ramdisk` tool: host capability checks, memory-safety
//! planning and mount execution for tmpfs/ramfs.

pub mod caps;
pub mod config;
pub mod exec;
pub mod fs_type;
pub mod mem;
pub mod mounts;
pub mod plan;
pub mod probe;
pub mod provision;
