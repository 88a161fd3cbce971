use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caps::DEFAULT_FILESYSTEMS_PATH;
use crate::exec::{DEFAULT_MOUNT_PROGRAM, DEFAULT_UMOUNT_PROGRAM};
use crate::fs_type::FsType;
use crate::mem::DEFAULT_MEMINFO_PATH;
use crate::mounts::DEFAULT_MOUNTS_PATH;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where the kernel reports are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_meminfo")]
    pub meminfo: PathBuf,
    #[serde(default = "default_filesystems")]
    pub filesystems: PathBuf,
    #[serde(default = "default_mounts")]
    pub mounts: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            meminfo: default_meminfo(),
            filesystems: default_filesystems(),
            mounts: default_mounts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_mount")]
    pub mount: String,
    #[serde(default = "default_umount")]
    pub umount: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self { mount: default_mount(), umount: default_umount() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Used when the filesystem-type prompt is answered with an empty line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_fs_type: Option<FsType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also append log events to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level(), file: None }
    }
}

fn default_meminfo() -> PathBuf { DEFAULT_MEMINFO_PATH.into() }
fn default_filesystems() -> PathBuf { DEFAULT_FILESYSTEMS_PATH.into() }
fn default_mounts() -> PathBuf { DEFAULT_MOUNTS_PATH.into() }
fn default_mount() -> String { DEFAULT_MOUNT_PROGRAM.into() }
fn default_umount() -> String { DEFAULT_UMOUNT_PROGRAM.into() }
fn default_log_level() -> String { "warn".into() }

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Parse config text, returning the dotted paths of any unknown keys
/// alongside it. Unknown keys are not an error.
pub fn parse_config(text: &str) -> Result<(Config, Vec<String>), ConfigError> {
    let mut unknown = Vec::new();
    let de = toml::Deserializer::new(text);
    let config: Config = serde_ignored::deserialize(de, |path| unknown.push(path.to_string()))?;
    Ok((config, unknown))
}

/// `/etc/ramdisk/config.toml` as root, otherwise the per-user config dir.
pub fn default_config_path() -> String {
    if is_root() {
        return "/etc/ramdisk/config.toml".into();
    }
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("ramdisk").join("config.toml").to_string_lossy().into_owned()
}

/// A config file as loaded from disk.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: String,
    /// Keys present in the file that nothing reads. Logged by the caller
    /// once logging is up, since the log settings come from this file.
    pub unknown_keys: Vec<String>,
}

/// Load the config file.
///
/// An explicitly named file must exist. A missing file at the default
/// location just means "all defaults".
pub fn load_config(explicit: Option<&str>) -> Result<LoadedConfig, ConfigError> {
    let path = explicit.map(str::to_string).unwrap_or_else(default_config_path);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let (config, unknown_keys) = parse_config(&text)?;
            Ok(LoadedConfig { config, path, unknown_keys })
        }
        Err(e) if explicit.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(LoadedConfig { config: Config::default(), path, unknown_keys: Vec::new() })
        }
        Err(source) => Err(ConfigError::Read { path: PathBuf::from(&path), source }),
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}
