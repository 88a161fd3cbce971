//! The interactive menu.
//!
//! Startup inspects the host once; after that every menu action is one
//! user-initiated operation whose failure is reported and then forgotten.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use ramdisk_common::caps::{CapabilityInspector, HostCapabilities, InitError};
use ramdisk_common::config::Config;
use ramdisk_common::exec::{unmount_command, CommandRunner, MountOutcome};
use ramdisk_common::fs_type::FsType;
use ramdisk_common::mem::MemoryProbe;
use ramdisk_common::mounts;
use ramdisk_common::plan::{MountRequest, RejectReason};
use ramdisk_common::provision::Provisioner;

use crate::ui;

const PROMPT: &str = ">>> ";

pub enum Startup {
    Ready(HostCapabilities),
    /// Not root and the user chose not to continue.
    Declined,
    Fatal(InitError),
}

/// Check the host and, when not root, ask whether to carry on anyway.
pub fn start<I: BufRead, O: Write>(
    input: &mut I,
    out: &mut O,
    inspector: &CapabilityInspector,
    probe: &impl MemoryProbe,
    assume_yes: bool,
) -> io::Result<Startup> {
    writeln!(out, "{}", ui::info("Initialising ramdisk tool."))?;

    let caps = match inspector.inspect() {
        Ok(caps) => caps,
        Err(err) => {
            for line in ui::fatal_lines(&err) {
                writeln!(out, "{}", ui::bad(&line))?;
            }
            return Ok(Startup::Fatal(err));
        }
    };

    writeln!(out, "{}", ui::info("Host system is Linux."))?;
    for (ok, yes, no) in [
        (caps.is_privileged, "Running as root.", "Not running as root."),
        (caps.supports_tmpfs, "tmpfs is supported.", "tmpfs is not supported."),
        (caps.supports_ramfs, "ramfs is supported.", "ramfs is not supported."),
    ] {
        if ok {
            writeln!(out, "{}", ui::info(yes))?;
        } else {
            writeln!(out, "{}", ui::bad(no))?;
        }
    }

    if !caps.is_privileged && !assume_yes {
        write!(
            out,
            "{}",
            ui::info("Running as a non-root user may result in permission errors.\nContinue? [y/N]: ")
        )?;
        out.flush()?;
        let answer = read_line(input)?.unwrap_or_default();
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            writeln!(out, "{}", ui::bad("Okay, quitting. Try running with sudo."))?;
            return Ok(Startup::Declined);
        }
        writeln!(out, "{}", ui::info("Okay, suit yourself."))?;
    }

    match probe.snapshot() {
        Ok(mem) => writeln!(out, "{}", ui::info(&format!("You have {mem} free memory.")))?,
        Err(err) => writeln!(out, "{}", ui::bad(&format!("Could not read free memory: {err}")))?,
    }
    writeln!(out)?;

    Ok(Startup::Ready(caps))
}

pub struct Session<'a, I, O, P, R> {
    input: I,
    out: O,
    provisioner: Provisioner<'a, P, R>,
    config: &'a Config,
}

impl<'a, I, O, P, R> Session<'a, I, O, P, R>
where
    I: BufRead,
    O: Write,
    P: MemoryProbe,
    R: CommandRunner,
{
    pub fn new(input: I, out: O, provisioner: Provisioner<'a, P, R>, config: &'a Config) -> Self {
        Self { input, out, provisioner, config }
    }

    /// Menu loop. Returns on the exit option or end of input.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            writeln!(self.out, "{}", ui::good("ramdisk"))?;
            writeln!(self.out, "1) create a ramdisk")?;
            writeln!(self.out, "2) list ramdisks")?;
            writeln!(self.out, "3) unmount a ramdisk")?;
            writeln!(self.out)?;
            writeln!(self.out, "x) exit")?;
            let Some(choice) = self.prompt("")? else {
                return Ok(());
            };
            match choice.trim().to_ascii_lowercase().as_str() {
                "1" => {
                    self.create()?;
                }
                "2" => {
                    self.list()?;
                }
                "3" => {
                    self.unmount()?;
                }
                "x" | "q" | "exit" | "quit" => return Ok(()),
                other => writeln!(self.out, "{}", ui::bad(&format!("Unknown option {other:?}.")))?,
            }
            writeln!(self.out)?;
        }
    }

    /// Ask for type, mount point and size, then try to create the ramdisk.
    fn create(&mut self) -> io::Result<bool> {
        let default = self.config.session.default_fs_type;
        let type_prompt = match default {
            Some(t) => format!("tmpfs or ramfs? [{t}]\n"),
            None => "tmpfs or ramfs?\n".to_string(),
        };
        let Some(fs_type) = self.prompt(&type_prompt)? else {
            return Ok(false);
        };
        let Some(mount_point) = self.prompt("Where should the ramdisk be mounted?\n")? else {
            return Ok(false);
        };
        let Some(size) = self.prompt("How large should the ramdisk be (in MB)?\n")? else {
            return Ok(false);
        };

        let fs_type = match (fs_type.trim(), default) {
            ("", Some(t)) => t,
            (raw, _) => match raw.parse::<FsType>() {
                Ok(t) => t,
                Err(e) => {
                    self.reject(&RejectReason::from(e))?;
                    return Ok(false);
                }
            },
        };
        let request = MountRequest::new(fs_type, mount_point.trim(), size);
        self.provision(&request)
    }

    /// Run one creation attempt and report the outcome.
    pub fn provision(&mut self, request: &MountRequest) -> io::Result<bool> {
        writeln!(self.out, "*** Creating ramdisk ***")?;
        let plan = match self.provisioner.plan(request) {
            Ok(plan) => plan,
            Err(reason) => {
                self.reject(&reason)?;
                return Ok(false);
            }
        };

        if !plan.mount_point.exists() {
            writeln!(
                self.out,
                "Your mountpoint {} does not exist. Creating.",
                plan.mount_point.display()
            )?;
        }
        if let Some(advisory) = plan.advisory() {
            writeln!(self.out, "{}", ui::bad(&format!("NOTE: {advisory}")))?;
        }
        let command = self.provisioner.executor().command_line(&plan);
        writeln!(self.out, "{}", ui::info(&format!("Executing command:\n{command}")))?;

        match self.provisioner.execute(&plan) {
            MountOutcome::Success(path) => {
                let text = format!(
                    "The ramdisk was created successfully and is mounted at this path:\n{}\n\
                     You can unmount it by running this command:\nsudo {}",
                    path.display(),
                    unmount_command(&self.config.commands.umount, &path)
                );
                writeln!(self.out, "{}", ui::good(&text))?;
                Ok(true)
            }
            MountOutcome::ExecutionFailed(failure) => {
                for line in ui::failure_lines(&failure) {
                    writeln!(self.out, "{}", ui::bad(&line))?;
                }
                Ok(false)
            }
            MountOutcome::Rejected(reason) => {
                self.reject(&reason)?;
                Ok(false)
            }
        }
    }

    pub fn list(&mut self) -> io::Result<bool> {
        match mounts::list_ramdisks(&self.config.probe.mounts) {
            Ok(found) if found.is_empty() => {
                writeln!(self.out, "No ramdisks mounted.")?;
                Ok(true)
            }
            Ok(found) => {
                writeln!(self.out, "Mounted ramdisks ({}):", found.len())?;
                for row in ui::ramdisk_rows(&found) {
                    writeln!(self.out, "{row}")?;
                }
                Ok(true)
            }
            Err(err) => {
                writeln!(self.out, "{}", ui::bad(&err.to_string()))?;
                writeln!(self.out, "{}", ui::bad(&format!("Hint: {}.", err.hint())))?;
                Ok(false)
            }
        }
    }

    /// Show the list and unmount the entry picked by number or path.
    fn unmount(&mut self) -> io::Result<bool> {
        let found = match mounts::list_ramdisks(&self.config.probe.mounts) {
            Ok(found) => found,
            Err(err) => {
                writeln!(self.out, "{}", ui::bad(&err.to_string()))?;
                return Ok(false);
            }
        };
        if found.is_empty() {
            writeln!(self.out, "No ramdisks mounted.")?;
            return Ok(false);
        }
        for row in ui::ramdisk_rows(&found) {
            writeln!(self.out, "{row}")?;
        }
        let Some(choice) = self.prompt("Which ramdisk should be unmounted? (number or path)\n")? else {
            return Ok(false);
        };
        let choice = choice.trim();
        let target = match choice.parse::<usize>() {
            Ok(n) if (1..=found.len()).contains(&n) => found[n - 1].mount_point.clone(),
            Ok(_) => {
                writeln!(self.out, "{}", ui::bad(&format!("There is no ramdisk number {choice}.")))?;
                return Ok(false);
            }
            Err(_) => PathBuf::from(choice),
        };
        self.unmount_path(&target)
    }

    pub fn unmount_path(&mut self, mount_point: &Path) -> io::Result<bool> {
        let result = mounts::unmount(
            self.provisioner.executor().runner(),
            &self.config.commands.umount,
            &self.config.probe.mounts,
            mount_point,
        );
        match result {
            Ok(gone) => {
                let text = format!("Unmounted {} ({}).", gone.mount_point.display(), gone.fs_type);
                writeln!(self.out, "{}", ui::good(&text))?;
                Ok(true)
            }
            Err(err) => {
                for line in ui::unmount_failure_lines(&err) {
                    writeln!(self.out, "{}", ui::bad(&line))?;
                }
                Ok(false)
            }
        }
    }

    fn reject(&mut self, reason: &RejectReason) -> io::Result<()> {
        for line in ui::rejection_lines(reason) {
            writeln!(self.out, "{}", ui::bad(&line))?;
        }
        Ok(())
    }

    fn prompt(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.out, "{question}{PROMPT}")?;
        self.out.flush()?;
        read_line(&mut self.input)
    }
}

/// One line without its terminator; `None` at end of input.
fn read_line(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;

    use ramdisk_common::exec::{CommandOutput, MountExecutor};
    use ramdisk_common::mem::MemInfoProbe;

    use super::*;

    struct RecordingRunner {
        calls: RefCell<Vec<(String, Vec<String>)>>,
        code: i32,
        output: String,
    }

    impl RecordingRunner {
        fn exits(code: i32, output: &str) -> Self {
            Self { calls: RefCell::new(Vec::new()), code, output: output.to_string() }
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
            self.calls.borrow_mut().push((program.to_string(), args.to_vec()));
            Ok(CommandOutput { success: self.code == 0, code: Some(self.code), output: self.output.clone() })
        }
    }

    const ALL: HostCapabilities = HostCapabilities {
        is_linux: true,
        is_privileged: true,
        supports_tmpfs: true,
        supports_ramfs: true,
    };

    struct Fixture {
        dir: tempfile::TempDir,
        config: Config,
    }

    impl Fixture {
        fn new(free_kb: u64, mounts: &str) -> Self {
            colored::control::set_override(false);
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.probe.meminfo = dir.path().join("meminfo");
            config.probe.filesystems = dir.path().join("filesystems");
            config.probe.mounts = dir.path().join("mounts");
            std::fs::write(&config.probe.meminfo, format!("MemTotal: 1 kB\nMemFree: {free_kb} kB\n")).unwrap();
            std::fs::write(&config.probe.filesystems, "nodev\ttmpfs\nnodev\tramfs\n").unwrap();
            std::fs::write(&config.probe.mounts, mounts).unwrap();
            Self { dir, config }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        /// Drive a session over `script`; returns output and runner calls.
        fn run(
            &self,
            caps: &HostCapabilities,
            runner: RecordingRunner,
            script: &str,
        ) -> (String, Vec<(String, Vec<String>)>) {
            let mut input = Cursor::new(script.as_bytes().to_vec());
            let mut out = Vec::new();
            let provisioner = Provisioner::new(
                caps,
                MemInfoProbe::new(&self.config.probe.meminfo),
                MountExecutor::with_program(runner, &self.config.commands.mount),
            );
            let mut session = Session::new(&mut input, &mut out, provisioner, &self.config);
            session.run().unwrap();
            let calls = session.provisioner.executor().runner().calls.borrow().clone();
            drop(session);
            (String::from_utf8(out).unwrap(), calls)
        }
    }

    #[test]
    fn unmount_hint_uses_configured_program() {
        let mut fx = Fixture::new(500_000, "");
        fx.config.commands.umount = "/usr/bin/umount".into();
        let target = fx.path("rd");
        let script = format!("1\ntmpfs\n{}\n10\nx\n", target.display());

        let (out, _) = fx.run(&ALL, RecordingRunner::exits(0, ""), &script);

        assert!(out.contains(&format!("sudo /usr/bin/umount -f {}", target.display())), "{out}");
    }

    #[test]
    fn creates_ramdisk_and_prints_unmount_command() {
        let fx = Fixture::new(500_000, "");
        let target = fx.path("rd");
        let script = format!("1\ntmpfs\n{}\n400\nx\n", target.display());

        let (out, calls) = fx.run(&ALL, RecordingRunner::exits(0, ""), &script);

        assert!(out.contains("does not exist. Creating."), "{out}");
        assert!(out.contains("created successfully"), "{out}");
        assert!(out.contains(&format!("sudo umount -f {}", target.display())), "{out}");
        assert!(target.is_dir());
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].1,
            vec!["-t", "tmpfs", "-o", "size=400M", "tmpfs", target.to_str().unwrap()]
        );
    }

    #[test]
    fn too_large_request_shows_memory_figures_and_continues() {
        let fx = Fixture::new(500_000, "");
        let script = format!("1\ntmpfs\n{}\n600\nx\n", fx.path("rd").display());

        let (out, calls) = fx.run(&ALL, RecordingRunner::exits(0, ""), &script);

        assert!(out.contains("Your free memory: 500MB"), "{out}");
        assert!(out.contains("Size of the ramdisk: 600M"), "{out}");
        assert!(calls.is_empty());
        // Menu shown again after the rejection.
        assert_eq!(out.matches("1) create a ramdisk").count(), 2);
    }

    #[test]
    fn non_numeric_size_is_rejected() {
        let fx = Fixture::new(500_000, "");
        let (out, calls) = fx.run(&ALL, RecordingRunner::exits(0, ""), "1\ntmpfs\n/mnt/rd\nbig\nx\n");
        assert!(out.contains("whole number"), "{out}");
        assert!(calls.is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let fx = Fixture::new(500_000, "");
        let (out, calls) = fx.run(&ALL, RecordingRunner::exits(0, ""), "1\next4\n/mnt/rd\n10\nx\n");
        assert!(out.contains("unknown filesystem type \"ext4\""), "{out}");
        assert!(calls.is_empty());
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let fx = Fixture::new(500_000, "");
        let caps = HostCapabilities { supports_tmpfs: false, ..ALL };
        let (out, calls) = fx.run(&caps, RecordingRunner::exits(0, ""), "1\ntmpfs\n/mnt/rd\n10\nx\n");
        assert!(out.contains("which your system does not support"), "{out}");
        assert!(calls.is_empty());
    }

    #[test]
    fn empty_type_uses_configured_default_and_warns_for_ramfs() {
        let mut fx = Fixture::new(500_000, "");
        fx.config.session.default_fs_type = Some(FsType::Ramfs);
        let script = format!("1\n\n{}\n10\nx\n", fx.path("rd").display());

        let (out, calls) = fx.run(&ALL, RecordingRunner::exits(0, ""), &script);

        assert!(out.contains("tmpfs or ramfs? [ramfs]"), "{out}");
        assert!(out.contains("NOTE: ramfs will dynamically allocate"), "{out}");
        assert_eq!(calls[0].1[1], "ramfs");
    }

    #[test]
    fn mount_failure_prints_command_output() {
        let fx = Fixture::new(500_000, "");
        let script = format!("1\ntmpfs\n{}\n10\nx\n", fx.path("rd").display());
        let (out, _) = fx.run(&ALL, RecordingRunner::exits(32, "mount: permission denied\n"), &script);
        assert!(out.contains("An error occurred while creating the ramdisk."), "{out}");
        assert!(out.contains("mount: permission denied"), "{out}");
    }

    #[test]
    fn lists_and_unmounts_by_number() {
        let table = "tmpfs /mnt/a tmpfs rw,size=1024k 0 0\nramfs /mnt/b ramfs rw 0 0\n";
        let fx = Fixture::new(500_000, table);

        let (out, calls) = fx.run(&ALL, RecordingRunner::exits(0, ""), "2\n3\n2\nx\n");

        assert!(out.contains("Mounted ramdisks (2):"), "{out}");
        assert!(out.contains("/mnt/a"), "{out}");
        assert!(out.contains("Unmounted /mnt/b (ramfs)."), "{out}");
        assert_eq!(calls, vec![("umount".to_string(), vec!["-f".to_string(), "/mnt/b".to_string()])]);
    }

    #[test]
    fn unmount_rejects_out_of_range_choice() {
        let fx = Fixture::new(500_000, "tmpfs /mnt/a tmpfs rw 0 0\n");
        let (out, calls) = fx.run(&ALL, RecordingRunner::exits(0, ""), "3\n7\nx\n");
        assert!(out.contains("There is no ramdisk number 7."), "{out}");
        assert!(calls.is_empty());
    }

    #[test]
    fn end_of_input_ends_session() {
        let fx = Fixture::new(500_000, "");
        let (out, _) = fx.run(&ALL, RecordingRunner::exits(0, ""), "");
        assert!(out.contains("x) exit"));
    }

    #[test]
    fn unknown_menu_option_keeps_going() {
        let fx = Fixture::new(500_000, "");
        let (out, _) = fx.run(&ALL, RecordingRunner::exits(0, ""), "9\nx\n");
        assert!(out.contains("Unknown option \"9\"."), "{out}");
    }

    fn startup(fx: &Fixture, euid: u32, script: &str, assume_yes: bool) -> (Startup, String) {
        let inspector = CapabilityInspector::new(&fx.config.probe.filesystems)
            .with_os("linux")
            .with_euid(euid);
        let probe = MemInfoProbe::new(&fx.config.probe.meminfo);
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        let result = start(&mut input, &mut out, &inspector, &probe, assume_yes).unwrap();
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn startup_as_root_reports_free_memory() {
        let fx = Fixture::new(500_000, "");
        let (result, out) = startup(&fx, 0, "", false);
        assert!(matches!(result, Startup::Ready(caps) if caps == ALL));
        assert!(out.contains("You have 500MB free memory."), "{out}");
    }

    #[test]
    fn startup_unprivileged_asks_before_continuing() {
        let fx = Fixture::new(500_000, "");

        let (result, out) = startup(&fx, 1000, "n\n", false);
        assert!(matches!(result, Startup::Declined));
        assert!(out.contains("Try running with sudo"), "{out}");

        let (result, _) = startup(&fx, 1000, "y\n", false);
        assert!(matches!(result, Startup::Ready(caps) if !caps.is_privileged));

        let (result, out) = startup(&fx, 1000, "", true);
        assert!(matches!(result, Startup::Ready(_)));
        assert!(!out.contains("Continue?"), "{out}");
    }

    #[test]
    fn startup_without_supported_filesystems_is_fatal() {
        let fx = Fixture::new(500_000, "");
        std::fs::write(&fx.config.probe.filesystems, "nodev\tproc\n").unwrap();
        let (result, out) = startup(&fx, 0, "", false);
        assert!(matches!(result, Startup::Fatal(InitError::NoSupportedFilesystem)));
        assert!(out.contains("neither tmpfs nor ramfs"), "{out}");
    }
}
