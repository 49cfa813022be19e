//! A process to run inside a container, and how it ended

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::fmt;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tandem_core::{ContainerId, ProcessId};
use tokio::sync::watch;

use crate::events::EventSink;

/// How a container process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitResult {
    /// Exited normally with a status code
    Exited(i32),
    /// Terminated by a signal
    Signaled(Signal),
}

impl ExitResult {
    /// Decode a wait status; `None` for stop/continue notifications
    #[must_use]
    pub const fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Self::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Self::Signaled(signal)),
            _ => None,
        }
    }

    /// Exit code, or the negated signal number when signaled
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => -(signal as i32),
        }
    }

    /// Terminating signal, if any
    #[must_use]
    pub const fn signal(self) -> Option<Signal> {
        match self {
            Self::Exited(_) => None,
            Self::Signaled(signal) => Some(signal),
        }
    }

    /// Whether the process exited with status 0
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for ExitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "killed by {signal}"),
        }
    }
}

/// Links a launched process back to its container
#[derive(Debug)]
pub(crate) struct Launched {
    pub(crate) container_id: ContainerId,
    /// Setup process that mirrors init's exit status
    pub(crate) intermediate: Pid,
    pub(crate) init: ProcessId,
    /// Set once someone has taken over reaping the intermediate
    pub(crate) claimed: Arc<AtomicBool>,
    pub(crate) exit_tx: watch::Sender<Option<ExitResult>>,
    pub(crate) events: EventSink,
}

/// A program with its working directory, environment and standard streams
///
/// Streams left unset are inherited from the caller. Stream handles are
/// consumed by [`Container::run`](crate::Container::run).
#[derive(Debug)]
pub struct Process {
    cwd: PathBuf,
    args: Vec<String>,
    env: Vec<String>,
    stdin: Option<OwnedFd>,
    stdout: Option<OwnedFd>,
    stderr: Option<OwnedFd>,
    launched: Option<Launched>,
}

impl Process {
    /// Create a process running `args` in `/` with an empty environment
    #[must_use]
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cwd: PathBuf::from("/"),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            stdin: None,
            stdout: None,
            stderr: None,
            launched: None,
        }
    }

    /// The environment given to every container process by the demo workflow
    #[must_use]
    pub fn standard_environment() -> Vec<String> {
        vec![
            "HOME=/root".to_string(),
            "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
            "HOSTNAME=integration".to_string(),
            "TERM=xterm".to_string(),
        ]
    }

    /// Set the working directory (inside the container's root)
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Replace the environment (`KEY=VALUE` entries)
    #[must_use]
    pub fn with_env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env = env.into_iter().map(Into::into).collect();
        self
    }

    /// Connect standard input
    #[must_use]
    pub fn with_stdin(mut self, fd: impl Into<OwnedFd>) -> Self {
        self.stdin = Some(fd.into());
        self
    }

    /// Connect standard output
    #[must_use]
    pub fn with_stdout(mut self, fd: impl Into<OwnedFd>) -> Self {
        self.stdout = Some(fd.into());
        self
    }

    /// Connect standard error
    #[must_use]
    pub fn with_stderr(mut self, fd: impl Into<OwnedFd>) -> Self {
        self.stderr = Some(fd.into());
        self
    }

    /// Working directory
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Program and arguments
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment entries
    #[must_use]
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Host PID of the init process, once launched
    #[must_use]
    pub fn pid(&self) -> Option<ProcessId> {
        self.launched.as_ref().map(|launched| launched.init)
    }

    /// Container the process was launched in
    #[must_use]
    pub fn container_id(&self) -> Option<&ContainerId> {
        self.launched.as_ref().map(|launched| &launched.container_id)
    }

    pub(crate) fn take_stdio(&mut self) -> [Option<OwnedFd>; 3] {
        [self.stdin.take(), self.stdout.take(), self.stderr.take()]
    }

    pub(crate) const fn launched(&self) -> Option<&Launched> {
        self.launched.as_ref()
    }

    pub(crate) fn attach(&mut self, launched: Launched) {
        self.launched = Some(launched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_result_codes() {
        let exited = ExitResult::Exited(3);
        assert_eq!(exited.exit_code(), 3);
        assert_eq!(exited.signal(), None);
        assert!(!exited.success());
        assert!(ExitResult::Exited(0).success());

        let killed = ExitResult::Signaled(Signal::SIGKILL);
        assert_eq!(killed.exit_code(), -9);
        assert_eq!(killed.signal(), Some(Signal::SIGKILL));
        assert!(!killed.success());
        assert_eq!(killed.to_string(), "killed by SIGKILL");
    }

    #[test]
    fn test_from_wait_status() {
        let pid = Pid::from_raw(10);
        assert_eq!(
            ExitResult::from_wait_status(WaitStatus::Exited(pid, 1)),
            Some(ExitResult::Exited(1))
        );
        assert_eq!(
            ExitResult::from_wait_status(WaitStatus::Signaled(pid, Signal::SIGTERM, false)),
            Some(ExitResult::Signaled(Signal::SIGTERM))
        );
        assert_eq!(ExitResult::from_wait_status(WaitStatus::StillAlive), None);
    }

    #[test]
    fn test_process_builder() {
        let process = Process::new(["sleep", "5"])
            .with_cwd("/tmp")
            .with_env(Process::standard_environment());

        assert_eq!(process.args(), ["sleep", "5"]);
        assert_eq!(process.cwd(), Path::new("/tmp"));
        assert!(process.env().iter().any(|e| e == "HOSTNAME=integration"));
        assert_eq!(process.pid(), None);
    }
}
