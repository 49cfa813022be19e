//! Launch protocol for a container's init process
//!
//! Three processes take part:
//! - the caller prepares everything that can fail normally (opening shared
//!   namespaces, converting arguments) and forks the intermediate process;
//! - the intermediate joins shared namespaces (user first), creates the
//!   private ones, has the caller write its id mappings, forks init and then
//!   waits for it, exiting with init's status so the caller can wait on it;
//! - init waits until the caller has placed it in its cgroup, finishes its
//!   environment and execs.
//!
//! Children report failures over a close-on-exec pipe. The caller reading
//! end-of-file after releasing init means the exec succeeded.

use nix::errno::Errno;
use nix::sys::signal::{kill, signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, chroot, execvpe, fork, sethostname, ForkResult, Pid};
use std::ffi::{CString, OsString};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tandem_core::{Error, ProcessId, Result};
use tandem_namespace::{idmap, IdMapping, NamespaceJoin, NamespacePlan};

use crate::channel::{channel, Receiver, Sender};
use crate::config::ContainerConfig;
use crate::message::{Message, SetupStep};
use crate::process::Process;

const CLOSE_RANGE_CLOEXEC: libc::c_uint = 1 << 2;

/// Everything the child processes need, converted before forking
#[derive(Debug)]
pub(crate) struct LaunchSpec {
    plan: NamespacePlan,
    uid_mappings: Vec<IdMapping>,
    gid_mappings: Vec<IdMapping>,
    hostname: Option<OsString>,
    rootfs: Option<CString>,
    cwd: CString,
    program: CString,
    args: Vec<CString>,
    env: Vec<CString>,
    stdio: [Option<OwnedFd>; 3],
}

impl LaunchSpec {
    /// Open shared namespaces and convert the process description
    ///
    /// The process's stream handles are moved in; dropping the launch
    /// description closes the caller's copies.
    pub(crate) fn new(config: &ContainerConfig, process: &mut Process) -> Result<Self> {
        let args = process
            .args()
            .iter()
            .map(|arg| to_cstring(arg.as_bytes(), "argument"))
            .collect::<Result<Vec<_>>>()?;
        let program = args
            .first()
            .cloned()
            .ok_or_else(|| Error::config("Process has no program to run"))?;
        let env = process
            .env()
            .iter()
            .map(|entry| to_cstring(entry.as_bytes(), "environment entry"))
            .collect::<Result<Vec<_>>>()?;
        let cwd = to_cstring(process.cwd().as_os_str().as_bytes(), "working directory")?;

        let rootfs = if config.rootfs() == Path::new("/") {
            None
        } else {
            Some(to_cstring(
                config.rootfs().as_os_str().as_bytes(),
                "root filesystem",
            )?)
        };

        let plan = NamespacePlan::prepare(config.namespaces())?;

        Ok(Self {
            plan,
            uid_mappings: config.uid_mappings().to_vec(),
            gid_mappings: config.gid_mappings().to_vec(),
            hostname: config.hostname().map(OsString::from),
            rootfs,
            cwd,
            program,
            args,
            env,
            stdio: process.take_stdio(),
        })
    }
}

fn to_cstring(bytes: &[u8], what: &str) -> Result<CString> {
    CString::new(bytes).map_err(|_| Error::config(format!("Process {what} contains a NUL byte")))
}

/// Run `cb` in a forked child and exit with its return value
fn container_fork<F: FnOnce() -> i32>(cb: F) -> nix::Result<Pid> {
    // SAFETY: the child only runs `cb`, which avoids locks held by other
    // threads of the caller, and then exits.
    match unsafe { fork()? } {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => std::process::exit(cb()),
    }
}

/// Init has been forked and is waiting to be released
#[derive(Debug)]
pub(crate) struct Pending {
    intermediate: Pid,
    init: Pid,
    main_rx: Receiver,
    init_tx: Sender,
}

/// Fork the intermediate process and wait until init exists
///
/// On failure every child is killed and reaped before returning.
pub(crate) fn spawn(spec: &LaunchSpec) -> Result<Pending> {
    let (mut main_tx, mut main_rx) = channel()?;
    let (mut inter_tx, mut inter_rx) = channel()?;
    let (mut init_tx, mut init_rx) = channel()?;

    let intermediate = container_fork(|| {
        // The caller's ends were duplicated by fork.
        main_rx.close();
        inter_tx.close();
        init_tx.close();
        intermediate_main(spec, &mut main_tx, &mut inter_rx, &mut init_rx)
    })?;

    main_tx.close();
    inter_rx.close();
    init_rx.close();

    tracing::debug!(intermediate = intermediate.as_raw(), "Forked setup process");

    match await_init(spec, intermediate, &mut main_rx, &mut inter_tx) {
        Ok(init) => Ok(Pending {
            intermediate,
            init,
            main_rx,
            init_tx,
        }),
        Err(e) => {
            let _ = kill(intermediate, Signal::SIGKILL);
            reap(intermediate);
            Err(e)
        }
    }
}

fn await_init(
    spec: &LaunchSpec,
    intermediate: Pid,
    main_rx: &mut Receiver,
    inter_tx: &mut Sender,
) -> Result<Pid> {
    loop {
        match main_rx.recv()? {
            Some(Message::MappingRequest) => {
                idmap::write_mappings(
                    ProcessId::from(intermediate),
                    &spec.uid_mappings,
                    &spec.gid_mappings,
                )?;
                inter_tx.send(Message::MappingWritten)?;
            }
            Some(Message::InitPid(pid)) => return Ok(Pid::from_raw(pid)),
            Some(Message::Failed(step, errno)) => {
                return Err(setup_error(step, errno, spec.plan.joins()));
            }
            Some(msg) => {
                return Err(Error::namespace(format!(
                    "Unexpected message {msg} from setup process"
                )));
            }
            None => {
                return Err(Error::namespace(
                    "Setup process exited before forking init",
                ));
            }
        }
    }
}

impl Pending {
    pub(crate) fn init_pid(&self) -> ProcessId {
        ProcessId::from(self.init)
    }

    /// Release init to exec and wait for the outcome
    ///
    /// Returns the intermediate pid, which exits with init's status.
    pub(crate) fn start(mut self) -> Result<Pid> {
        if let Err(e) = self.init_tx.send(Message::Start) {
            self.abort();
            return Err(e);
        }
        self.init_tx.close();

        match self.main_rx.recv() {
            Ok(None) => Ok(self.intermediate),
            Ok(Some(Message::Failed(step, errno))) => {
                reap(self.intermediate);
                Err(setup_error(step, errno, &[]))
            }
            Ok(Some(msg)) => {
                self.abort();
                Err(Error::namespace(format!(
                    "Unexpected message {msg} from init process"
                )))
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Kill both children and reap the intermediate
    pub(crate) fn abort(&self) {
        let _ = kill(self.init, Signal::SIGKILL);
        let _ = kill(self.intermediate, Signal::SIGKILL);
        reap(self.intermediate);
    }
}

fn reap(pid: Pid) {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => {}
            _ => return,
        }
    }
}

fn setup_error(step: SetupStep, errno: i32, joins: &[NamespaceJoin]) -> Error {
    let errno = Errno::from_raw(errno);

    match step {
        SetupStep::Join(kind) => Error::NamespaceJoinFailed {
            namespace: kind.to_string(),
            path: joins
                .iter()
                .find(|join| join.kind() == kind)
                .map(|join| join.path().display().to_string())
                .unwrap_or_default(),
            message: errno.desc().to_string(),
        },
        step => Error::namespace(format!("Failed to {step}: {errno}")),
    }
}

fn fail(main_tx: &mut Sender, step: SetupStep, errno: Errno) -> i32 {
    let _ = main_tx.send(Message::Failed(step, errno as i32));
    1
}

fn intermediate_main(
    spec: &LaunchSpec,
    main_tx: &mut Sender,
    inter_rx: &mut Receiver,
    init_rx: &mut Receiver,
) -> i32 {
    if let Err((kind, errno)) = spec.plan.enter_shared() {
        return fail(main_tx, SetupStep::Join(kind), errno);
    }

    if let Err(errno) = spec.plan.unshare_user() {
        return fail(main_tx, SetupStep::Unshare, errno);
    }

    // Maps of a new user namespace can only be written from outside it.
    if spec.plan.requires_id_mapping() {
        if main_tx.send(Message::MappingRequest).is_err() {
            return 1;
        }
        match inter_rx.recv() {
            Ok(Some(Message::MappingWritten)) => {}
            _ => return fail(main_tx, SetupStep::Mapping, Errno::EPROTO),
        }
    }
    inter_rx.close();

    if let Err(errno) = spec.plan.unshare_rest() {
        return fail(main_tx, SetupStep::Unshare, errno);
    }

    // First child after unsharing PID: init is PID 1 of the new namespace.
    let init = match container_fork(|| init_main(spec, main_tx, init_rx)) {
        Ok(pid) => pid,
        Err(errno) => return fail(main_tx, SetupStep::Fork, errno),
    };
    init_rx.close();

    if main_tx.send(Message::InitPid(init.as_raw())).is_err() {
        let _ = kill(init, Signal::SIGKILL);
    }
    main_tx.close();

    close_from_stderr(false);
    mirror_exit(init)
}

/// Wait for init and reproduce how it ended
fn mirror_exit(init: Pid) -> i32 {
    loop {
        match waitpid(init, None) {
            Ok(WaitStatus::Exited(_, code)) => return code,
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                // SAFETY: no handler is installed in this process.
                let _ = unsafe { signal(sig, SigHandler::SigDfl) };
                let _ = kill(Pid::this(), sig);
                return 128 + sig as i32;
            }
            Ok(_) | Err(Errno::EINTR) => {}
            Err(_) => return 1,
        }
    }
}

fn init_main(spec: &LaunchSpec, main_tx: &mut Sender, init_rx: &mut Receiver) -> i32 {
    // EOF: the caller gave up on this launch.
    match init_rx.recv() {
        Ok(Some(Message::Start)) => init_rx.close(),
        _ => return 1,
    }

    if let Err(errno) = spec.plan.unshare_cgroup() {
        return fail(main_tx, SetupStep::Unshare, errno);
    }

    if let Some(hostname) = &spec.hostname {
        if let Err(errno) = sethostname(hostname) {
            return fail(main_tx, SetupStep::Hostname, errno);
        }
    }

    if let Some(rootfs) = &spec.rootfs {
        if let Err(errno) = chroot(rootfs.as_c_str()).and_then(|()| chdir("/")) {
            return fail(main_tx, SetupStep::Rootfs, errno);
        }
    }

    if let Err(errno) = chdir(spec.cwd.as_c_str()) {
        return fail(main_tx, SetupStep::Chdir, errno);
    }

    if let Err(errno) = wire_stdio(&spec.stdio) {
        return fail(main_tx, SetupStep::Stdio, errno);
    }

    close_from_stderr(true);

    match execvpe(&spec.program, &spec.args, &spec.env) {
        Ok(never) => match never {},
        Err(errno) => {
            fail(main_tx, SetupStep::Exec, errno);
            127
        }
    }
}

fn wire_stdio(stdio: &[Option<OwnedFd>; 3]) -> nix::Result<()> {
    for (target, fd) in (0..).zip(stdio) {
        if let Some(fd) = fd {
            // SAFETY: both descriptors are open; dup2 clears close-on-exec on
            // the target.
            if unsafe { libc::dup2(fd.as_raw_fd(), target) } < 0 {
                return Err(Errno::last());
            }
        }
    }
    Ok(())
}

/// Close every descriptor above stderr, or only mark them close-on-exec
fn close_from_stderr(cloexec: bool) {
    let flags = if cloexec { CLOSE_RANGE_CLOEXEC } else { 0 };

    // SAFETY: plain syscall on integer arguments; the descriptors affected are
    // not used by this process afterwards.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_close_range,
            3 as libc::c_uint,
            libc::c_uint::MAX,
            flags,
        )
    };
    if ret == 0 {
        return;
    }

    // Kernels without close_range
    // SAFETY: sysconf has no preconditions.
    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max = libc::c_int::try_from(max.clamp(1024, 65536)).unwrap_or(1024);
    for fd in 3..max {
        // SAFETY: as above; unknown descriptors fail with EBADF.
        unsafe {
            if cloexec {
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            } else {
                libc::close(fd);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_failure_names_path() {
        let step = SetupStep::Join(tandem_namespace::NamespaceKind::User);
        let err = setup_error(step, libc::EPERM, &[]);
        match err {
            Error::NamespaceJoinFailed { namespace, message, .. } => {
                assert_eq!(namespace, "user");
                assert_eq!(message, Errno::EPERM.desc());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exec_failure_is_namespace_error() {
        let err = setup_error(SetupStep::Exec, libc::ENOENT, &[]);
        assert!(matches!(err, Error::Namespace { .. }));
        assert!(err.to_string().contains("exec"));
    }

    #[test]
    fn test_empty_args_rejected() {
        let config = ContainerConfig::builder("/").build().unwrap();
        let mut process = Process::new(Vec::<String>::new());

        let err = LaunchSpec::new(&config, &mut process).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn test_nul_in_env_rejected() {
        let config = ContainerConfig::builder("/").build().unwrap();
        let mut process = Process::new(["true"]).with_env(["BAD=a\0b"]);

        assert!(LaunchSpec::new(&config, &mut process).is_err());
    }

    #[test]
    fn test_host_namespaces_run_to_exec() {
        let config = ContainerConfig::builder("/").build().unwrap();
        let mut process = Process::new(["true"]).with_env(Process::standard_environment());
        let spec = LaunchSpec::new(&config, &mut process).unwrap();

        let pending = spawn(&spec).unwrap();
        let init = pending.init_pid();
        let intermediate = pending.start().unwrap();

        assert_ne!(init.as_raw(), intermediate.as_raw());
        assert_eq!(
            waitpid(intermediate, None).unwrap(),
            WaitStatus::Exited(intermediate, 0)
        );
    }

    #[test]
    fn test_exec_failure_reported() {
        let config = ContainerConfig::builder("/").build().unwrap();
        let mut process = Process::new(["/nonexistent/tandem-binary"]);
        let spec = LaunchSpec::new(&config, &mut process).unwrap();

        let err = spawn(&spec).unwrap().start().unwrap_err();
        assert!(err.to_string().contains("exec"), "{err}");
    }

    #[test]
    fn test_signal_is_mirrored() {
        let config = ContainerConfig::builder("/").build().unwrap();
        let mut process = Process::new(["sleep", "30"]);
        let spec = LaunchSpec::new(&config, &mut process).unwrap();

        let pending = spawn(&spec).unwrap();
        let init = pending.init_pid();
        let intermediate = pending.start().unwrap();

        kill(init.as_nix_pid(), Signal::SIGTERM).unwrap();
        assert_eq!(
            waitpid(intermediate, None).unwrap(),
            WaitStatus::Signaled(intermediate, Signal::SIGTERM, false)
        );
    }
}
