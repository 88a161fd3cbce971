mod logging;
mod session;
mod ui;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use ramdisk_common::caps::{CapabilityInspector, HostCapabilities};
use ramdisk_common::config::{load_config, Config, LoadedConfig};
use ramdisk_common::exec::{MountExecutor, SystemRunner};
use ramdisk_common::fs_type::FsType;
use ramdisk_common::mem::{MemInfoProbe, MemoryProbe};
use ramdisk_common::mounts;
use ramdisk_common::plan::MountRequest;
use ramdisk_common::provision::Provisioner;

use session::{Session, Startup};

#[derive(Parser)]
#[command(name = "ramdisk", about = "Create and remove memory-backed filesystems (tmpfs/ramfs)")]
struct Args {
    /// Path to config file (default: /etc/ramdisk/config.toml as root, else ~/.config/ramdisk/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,
    /// Continue without root privileges instead of asking
    #[arg(long, short = 'y', global = true)]
    yes: bool,
    /// Suppress color output
    #[arg(long, global = true)]
    no_color: bool,
    /// Output raw JSON instead of human-readable text (check, list, config)
    #[arg(long, global = true)]
    json: bool,
    /// Interactive menu when omitted
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check that this host can create ramdisks
    Check,
    /// Create and mount a ramdisk
    Create {
        /// tmpfs or ramfs
        #[arg(long = "type", value_name = "TYPE")]
        fs_type: FsType,
        /// Directory to mount on; created if missing
        #[arg(long)]
        mount_point: PathBuf,
        /// Size in megabytes
        #[arg(long)]
        size: String,
    },
    /// List mounted tmpfs/ramfs filesystems
    List,
    /// Force-unmount a ramdisk
    Unmount {
        mount_point: PathBuf,
    },
    /// Print effective configuration with defaults filled in
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    let loaded = load_config(args.config.as_deref())?;
    let guard = logging::init(&loaded.config.log)?;
    for key in &loaded.unknown_keys {
        tracing::warn!("unknown config key ignored: {key}");
    }

    let code = match args.command {
        None => interactive(loaded.config, args.yes).await?,
        Some(Command::Check) => check(&loaded.config, args.json)?,
        Some(Command::Create { fs_type, mount_point, size }) => {
            let request = MountRequest::new(fs_type, mount_point, size);
            one_shot(&loaded.config, |s| s.provision(&request))?
        }
        Some(Command::List) if args.json => {
            let found = mounts::list_ramdisks(&loaded.config.probe.mounts)
                .context("reading mount table")?;
            println!("{}", serde_json::to_string_pretty(&found)?);
            0
        }
        Some(Command::List) => one_shot(&loaded.config, |s| s.list())?,
        Some(Command::Unmount { mount_point }) => {
            one_shot(&loaded.config, |s| s.unmount_path(&mount_point))?
        }
        Some(Command::Config) => show_config(&loaded, args.json)?,
    };

    drop(guard);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Run the menu on a blocking thread so Ctrl-C can end the process from here.
async fn interactive(config: Config, assume_yes: bool) -> Result<i32> {
    let session = tokio::task::spawn_blocking(move || run_session(&config, assume_yes));
    tokio::select! {
        joined = session => joined.context("session thread panicked")?,
        _ = tokio::signal::ctrl_c() => {
            // The session thread is likely blocked on stdin; don't wait for it.
            println!();
            std::process::exit(0);
        }
    }
}

fn run_session(config: &Config, assume_yes: bool) -> Result<i32> {
    let mut input = io::stdin().lock();
    let mut out = io::stdout().lock();

    let inspector = CapabilityInspector::new(&config.probe.filesystems);
    let probe = MemInfoProbe::new(&config.probe.meminfo);
    let caps = match session::start(&mut input, &mut out, &inspector, &probe, assume_yes)? {
        Startup::Ready(caps) => caps,
        Startup::Declined => return Ok(0),
        Startup::Fatal(_) => return Ok(1),
    };

    let executor = MountExecutor::with_program(SystemRunner, &config.commands.mount);
    let provisioner = Provisioner::new(&caps, probe, executor);
    Session::new(&mut input, &mut out, provisioner, config)
        .run()
        .context("writing to terminal")?;
    Ok(0)
}

type StdoutSession<'a> =
    Session<'a, io::Empty, io::StdoutLock<'static>, MemInfoProbe, SystemRunner>;

/// Inspect the host, then run a single session action without prompting.
fn one_shot(
    config: &Config,
    action: impl FnOnce(&mut StdoutSession<'_>) -> io::Result<bool>,
) -> Result<i32> {
    let caps = match CapabilityInspector::new(&config.probe.filesystems).inspect() {
        Ok(caps) => caps,
        Err(err) => {
            for line in ui::fatal_lines(&err) {
                eprintln!("{}", ui::bad(&line));
            }
            return Ok(1);
        }
    };
    if !caps.is_privileged {
        eprintln!("{}", ui::info("Not running as root; this may fail with permission errors."));
    }

    let provisioner = Provisioner::new(
        &caps,
        MemInfoProbe::new(&config.probe.meminfo),
        MountExecutor::with_program(SystemRunner, &config.commands.mount),
    );
    let mut session = Session::new(io::empty(), io::stdout().lock(), provisioner, config);
    let ok = action(&mut session).context("writing to terminal")?;
    Ok(if ok { 0 } else { 1 })
}

fn check(config: &Config, json: bool) -> Result<i32> {
    let caps = CapabilityInspector::new(&config.probe.filesystems).inspect();
    let mem = MemInfoProbe::new(&config.probe.meminfo).snapshot();
    let all_ok = caps.is_ok() && mem.is_ok();

    if json {
        let value = serde_json::json!({
            "capabilities": caps.as_ref().ok(),
            "supported_types": caps.as_ref().map(HostCapabilities::supported_types).unwrap_or_default(),
            "error": caps.as_ref().err().map(|e| e.to_string()),
            "free_kilobytes": mem.as_ref().ok().map(|m| m.free_kilobytes),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(if all_ok { 0 } else { 1 });
    }

    match &caps {
        Ok(caps) => print_capabilities(caps),
        Err(err) => {
            for line in ui::fatal_lines(err) {
                println!("{}", format!("✗  {line}").red());
            }
        }
    }
    match &mem {
        Ok(mem) => println!("{}", format!("✓  {mem} free memory").green()),
        Err(err) => println!("{}", format!("✗  Free memory unknown: {err}").red()),
    }

    Ok(if all_ok { 0 } else { 1 })
}

fn print_capabilities(caps: &HostCapabilities) {
    println!("{}", "✓  Linux host".green());
    if caps.is_privileged {
        println!("{}", "✓  Running as root".green());
    } else {
        println!("{}", "✗  Not running as root (mounting will likely fail)".yellow());
    }
    for fs_type in FsType::ALL {
        if caps.supports(fs_type) {
            println!("{}", format!("✓  {fs_type} supported").green());
        } else {
            println!("{}", format!("✗  {fs_type} not supported").red());
        }
    }
}

fn show_config(loaded: &LoadedConfig, json: bool) -> Result<i32> {
    if json {
        let json = serde_json::to_string_pretty(&loaded.config)
            .context("serializing config to JSON")?;
        println!("{json}");
    } else {
        let toml = toml::to_string_pretty(&loaded.config)
            .context("serializing config to TOML")?;
        println!("# Effective configuration (file: {})", loaded.path);
        println!("# Values shown include defaults for any fields not set in your file.");
        println!();
        print!("{toml}");
    }
    Ok(0)
}
