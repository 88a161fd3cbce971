//! Running `mount`/`umount` and classifying what happened.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{error, info};

use crate::plan::{AcceptedPlan, RejectReason};

pub const DEFAULT_MOUNT_PROGRAM: &str = "mount";
pub const DEFAULT_UMOUNT_PROGRAM: &str = "umount";

/// Exit status plus everything the child wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

/// Runs an external program to completion.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runs programs with [`std::process::Command`], never through a shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let out = Command::new(program).args(args).output()?;
        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(CommandOutput {
            success: out.status.success(),
            code: out.status.code(),
            output,
        })
    }
}

/// Render a program and its arguments for display.
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The command that tears a ramdisk down again. Needs root.
pub fn unmount_command(program: &str, mount_point: &Path) -> String {
    format!("{program} -f {}", mount_point.display())
}

#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("access denied creating mount point {}", .path.display())]
    MountpointAccessDenied { path: PathBuf },

    #[error("could not create mount point {}: {source}", .path.display())]
    MountpointCreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("mount point {} exists but is not a directory", .path.display())]
    MountpointNotDirectory { path: PathBuf },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("mount exited with status {}", display_code(.code))]
    CommandFailed { code: Option<i32>, output: String },
}

impl ExecutionFailure {
    /// Raw output of the failed command, if the command ran at all.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            ExecutionFailure::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

pub(crate) fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown (killed by signal)".to_string(), |c| c.to_string())
}

#[derive(Debug)]
pub enum MountOutcome {
    Success(PathBuf),
    Rejected(RejectReason),
    ExecutionFailed(ExecutionFailure),
}

/// Turns accepted plans into mounts.
pub struct MountExecutor<R> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> MountExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self::with_program(runner, DEFAULT_MOUNT_PROGRAM)
    }

    pub fn with_program(runner: R, program: impl Into<String>) -> Self {
        Self { runner, program: program.into() }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// The exact command `execute` will run for `plan`.
    pub fn command_line(&self, plan: &AcceptedPlan) -> String {
        display_command(&self.program, &plan.mount_args())
    }

    pub fn execute(&self, plan: &AcceptedPlan) -> MountOutcome {
        match self.try_execute(plan) {
            Ok(()) => MountOutcome::Success(plan.mount_point.clone()),
            Err(failure) => MountOutcome::ExecutionFailed(failure),
        }
    }

    fn try_execute(&self, plan: &AcceptedPlan) -> Result<(), ExecutionFailure> {
        ensure_mount_point(&plan.mount_point)?;

        let args = plan.mount_args();
        info!("executing: {}", display_command(&self.program, &args));
        let out = self
            .runner
            .run(&self.program, &args)
            .map_err(|source| ExecutionFailure::Spawn { program: self.program.clone(), source })?;

        if !out.success {
            error!(
                "{} exited {} for {}",
                self.program,
                display_code(&out.code),
                plan.mount_point.display()
            );
            return Err(ExecutionFailure::CommandFailed { code: out.code, output: out.output });
        }
        info!("mounted {} at {}", plan.fs_type, plan.mount_point.display());
        Ok(())
    }
}

/// Create `path` (and parents) unless it is already a directory.
pub fn ensure_mount_point(path: &Path) -> Result<(), ExecutionFailure> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(ExecutionFailure::MountpointNotDirectory { path: path.to_path_buf() });
    }
    info!("mount point {} does not exist, creating", path.display());
    std::fs::create_dir_all(path).map_err(|e| classify_create_error(path, e))
}

fn classify_create_error(path: &Path, err: io::Error) -> ExecutionFailure {
    if err.kind() == io::ErrorKind::PermissionDenied {
        ExecutionFailure::MountpointAccessDenied { path: path.to_path_buf() }
    } else {
        ExecutionFailure::MountpointCreateFailed { path: path.to_path_buf(), source: err }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::fs_type::FsType;

    /// Records invocations and replies with a canned result.
    pub(crate) struct FakeRunner {
        pub calls: RefCell<Vec<(String, Vec<String>)>>,
        pub reply: Result<CommandOutput, io::ErrorKind>,
    }

    impl FakeRunner {
        pub fn ok() -> Self {
            Self::exits(0, "")
        }

        pub fn exits(code: i32, output: &str) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                reply: Ok(CommandOutput { success: code == 0, code: Some(code), output: output.to_string() }),
            }
        }

        pub fn missing() -> Self {
            Self { calls: RefCell::new(Vec::new()), reply: Err(io::ErrorKind::NotFound) }
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
            self.calls.borrow_mut().push((program.to_string(), args.to_vec()));
            self.reply.clone().map_err(io::Error::from)
        }
    }

    fn plan_at(path: &Path) -> AcceptedPlan {
        AcceptedPlan { fs_type: FsType::Tmpfs, mount_point: path.to_path_buf(), size_mb: 64 }
    }

    #[test]
    fn creates_missing_mount_point_and_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/rd");
        let exec = MountExecutor::new(FakeRunner::ok());

        let outcome = exec.execute(&plan_at(&target));

        assert!(matches!(outcome, MountOutcome::Success(ref p) if p == &target));
        assert!(target.is_dir());
        let calls = exec.runner().calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "mount");
        assert_eq!(
            calls[0].1,
            vec!["-t", "tmpfs", "-o", "size=64M", "tmpfs", target.to_str().unwrap()]
        );
    }

    #[test]
    fn existing_directory_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let exec = MountExecutor::new(FakeRunner::ok());
        assert!(matches!(exec.execute(&plan_at(dir.path())), MountOutcome::Success(_)));
    }

    #[test]
    fn non_zero_exit_keeps_output_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let exec = MountExecutor::new(FakeRunner::exits(32, "mount: permission denied"));

        match exec.execute(&plan_at(dir.path())) {
            MountOutcome::ExecutionFailed(failure) => {
                assert_eq!(failure.command_output(), Some("mount: permission denied"));
                assert!(matches!(failure, ExecutionFailure::CommandFailed { code: Some(32), .. }));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn missing_mount_binary_is_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = MountExecutor::with_program(FakeRunner::missing(), "/no/such/mount");
        match exec.execute(&plan_at(dir.path())) {
            MountOutcome::ExecutionFailed(ExecutionFailure::Spawn { program, .. }) => {
                assert_eq!(program, "/no/such/mount");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn file_in_the_way_is_not_mounted_over() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        let exec = MountExecutor::new(FakeRunner::ok());

        let outcome = exec.execute(&plan_at(&file));
        assert!(matches!(
            outcome,
            MountOutcome::ExecutionFailed(ExecutionFailure::MountpointNotDirectory { .. })
        ));
        assert!(exec.runner().calls.borrow().is_empty());
    }

    #[test]
    fn creation_failure_under_a_file_is_generic() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        let err = ensure_mount_point(&file.join("sub")).unwrap_err();
        assert!(matches!(err, ExecutionFailure::MountpointCreateFailed { .. }));
    }

    #[test]
    fn permission_error_is_access_denied() {
        let err = classify_create_error(
            Path::new("/root/rd"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, ExecutionFailure::MountpointAccessDenied { .. }));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn command_line_and_unmount_hint() {
        let exec = MountExecutor::new(SystemRunner);
        let plan = plan_at(Path::new("/mnt/rd"));
        assert_eq!(exec.command_line(&plan), "mount -t tmpfs -o size=64M tmpfs /mnt/rd");
        assert_eq!(unmount_command("umount", Path::new("/mnt/rd")), "umount -f /mnt/rd");
        assert_eq!(
            unmount_command("/usr/bin/umount", Path::new("/mnt/rd")),
            "/usr/bin/umount -f /mnt/rd"
        );
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_output_and_status() {
        let out = SystemRunner
            .run("sh", &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()])
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.output, "out\nerr\n");
    }
}
