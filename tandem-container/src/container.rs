//! Live containers

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitid, waitpid, Id, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tandem_cgroup::{CgroupDriver, DriverKind};
use tandem_core::{ContainerEvent, ContainerId, Error, ProcessId, Result};
use tandem_namespace::{namespace_path, read_identity, NamespaceKind};
use tokio::sync::{watch, Mutex};

use crate::config::ContainerConfig;
use crate::events::EventSink;
use crate::launch::{self, LaunchSpec};
use crate::process::{ExitResult, Launched, Process};
use crate::registry::Registry;

/// Lifecycle status of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// Created, no process has run yet
    Created,
    /// A process is running
    Running,
    /// The last process has exited
    Stopped,
    /// Destroyed; no further operations are possible
    Destroyed,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Runtime state of a container that has run a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Container ID
    pub id: ContainerId,
    /// Host PID of the init process
    pub init_process_pid: ProcessId,
    /// Handle of every namespace kind
    ///
    /// Shared kinds report the path that was joined, every other kind the
    /// link under the init process.
    pub namespace_paths: BTreeMap<NamespaceKind, PathBuf>,
}

impl StateSnapshot {
    /// Handle of one namespace kind
    #[must_use]
    pub fn namespace_path(&self, kind: NamespaceKind) -> Option<&Path> {
        self.namespace_paths.get(&kind).map(PathBuf::as_path)
    }

    /// Kernel identity of one namespace, e.g. `net:[4026531993]`
    ///
    /// # Errors
    /// Returns error if the handle no longer resolves (its owner exited).
    pub fn namespace_identity(&self, kind: NamespaceKind) -> Result<String> {
        let path = self.namespace_path(kind).ok_or_else(|| {
            Error::namespace(format!("No {kind} namespace recorded for {}", self.id))
        })?;
        read_identity(path)
    }
}

/// A container created by a [`Factory`](crate::Factory)
///
/// No namespace exists until the first [`run`](Container::run). A container
/// runs one process at a time and may run several in sequence.
#[derive(Debug)]
pub struct Container {
    id: ContainerId,
    config: Arc<ContainerConfig>,
    driver: Box<dyn CgroupDriver>,
    status: ContainerStatus,
    init_pid: Option<ProcessId>,
    intermediate: Option<Pid>,
    claimed: Option<Arc<AtomicBool>>,
    exit_rx: Option<watch::Receiver<Option<ExitResult>>>,
    registry: Arc<Mutex<Registry>>,
    events: EventSink,
}

impl Container {
    pub(crate) fn new(
        id: ContainerId,
        config: Arc<ContainerConfig>,
        driver: Box<dyn CgroupDriver>,
        registry: Arc<Mutex<Registry>>,
        events: EventSink,
    ) -> Self {
        Self {
            id,
            config,
            driver,
            status: ContainerStatus::Created,
            init_pid: None,
            intermediate: None,
            claimed: None,
            exit_rx: None,
            registry,
            events,
        }
    }

    /// Container ID
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Configuration the container was created from
    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Cgroup driver variant chosen at creation
    #[must_use]
    pub fn driver_kind(&self) -> DriverKind {
        self.driver.kind()
    }

    /// Location of the container's cgroup
    #[must_use]
    pub fn cgroup_path(&self) -> &Path {
        self.driver.path()
    }

    /// Current lifecycle status
    #[must_use]
    pub fn status(&self) -> ContainerStatus {
        match self.status {
            ContainerStatus::Running if self.last_exit().is_some() => ContainerStatus::Stopped,
            status => status,
        }
    }

    /// How the last process ended, once observed
    #[must_use]
    pub fn last_exit(&self) -> Option<ExitResult> {
        self.exit_rx.as_ref().and_then(|rx| *rx.borrow())
    }

    /// Launch a process inside the container
    ///
    /// Returns once the program has been exec'd; wait for it with
    /// [`ProcessSupervisor`](crate::ProcessSupervisor). The caller's copies of
    /// the process's stream handles are closed.
    ///
    /// # Errors
    /// - [`Error::ContainerDestroyed`] after [`destroy`](Container::destroy)
    /// - [`Error::AlreadyRunning`] while the previous process's exit has not
    ///   been observed; that process is not affected
    /// - [`Error::ConfigInvalid`] for an invalid configuration or process
    /// - [`Error::NamespaceJoinFailed`] if a shared namespace cannot be opened
    ///   or joined
    /// - [`Error::Namespace`] if any other setup step or the exec fails
    pub async fn run(&mut self, process: &mut Process) -> Result<()> {
        match self.status() {
            ContainerStatus::Destroyed => {
                return Err(Error::ContainerDestroyed {
                    id: self.id.to_string(),
                });
            }
            ContainerStatus::Running => {
                return Err(Error::AlreadyRunning {
                    id: self.id.to_string(),
                });
            }
            ContainerStatus::Created | ContainerStatus::Stopped => {}
        }

        if process.launched().is_some() {
            return Err(Error::config("Process has already been launched"));
        }

        self.config.validate()?;
        let spec = LaunchSpec::new(&self.config, process)?;

        tracing::info!(
            container_id = %self.id,
            args = ?process.args(),
            "Launching process"
        );

        // The launch spec is dropped after forking, closing the caller's stream copies.
        let pending = tokio::task::spawn_blocking(move || launch::spawn(&spec)).await?;
        let pending = self.report(pending)?;

        let init = pending.init_pid();
        if let Err(e) = self.driver.apply(init).await {
            tokio::task::spawn_blocking(move || pending.abort()).await?;
            return self.report(Err(e));
        }

        let started = tokio::task::spawn_blocking(move || pending.start()).await?;
        let intermediate = self.report(started)?;

        let (exit_tx, exit_rx) = watch::channel(None);
        let claimed = Arc::new(AtomicBool::new(false));
        process.attach(Launched {
            container_id: self.id.clone(),
            intermediate,
            init,
            claimed: Arc::clone(&claimed),
            exit_tx,
            events: self.events.clone(),
        });

        self.init_pid = Some(init);
        self.intermediate = Some(intermediate);
        self.claimed = Some(claimed);
        self.exit_rx = Some(exit_rx);
        self.status = ContainerStatus::Running;

        self.registry
            .lock()
            .await
            .expose(&self.id, self.owned_namespace_paths(init));

        self.events.emit(ContainerEvent::Started {
            id: self.id.clone(),
            init_pid: init,
            timestamp: SystemTime::now(),
        });

        Ok(())
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            self.events.error(&self.id, e.to_string());
        }
        result
    }

    fn owned_namespace_paths(&self, init: ProcessId) -> Vec<PathBuf> {
        NamespaceKind::ORDERED
            .into_iter()
            .filter(|&kind| self.config.namespaces().shared_path(kind).is_none())
            .map(|kind| namespace_path(init, kind))
            .collect()
    }

    /// Runtime state, including the namespace handles other containers can join
    ///
    /// # Errors
    /// - [`Error::NotRunning`] if no process has been run yet
    /// - [`Error::ContainerDestroyed`] after [`destroy`](Container::destroy)
    pub fn state(&self) -> Result<StateSnapshot> {
        if self.status == ContainerStatus::Destroyed {
            return Err(Error::ContainerDestroyed {
                id: self.id.to_string(),
            });
        }

        let init = self.init_pid.ok_or_else(|| Error::NotRunning {
            id: self.id.to_string(),
        })?;

        let namespace_paths = NamespaceKind::ORDERED
            .into_iter()
            .map(|kind| {
                let path = self
                    .config
                    .namespaces()
                    .shared_path(kind)
                    .map_or_else(|| namespace_path(init, kind), Path::to_path_buf);
                (kind, path)
            })
            .collect();

        Ok(StateSnapshot {
            id: self.id.clone(),
            init_process_pid: init,
            namespace_paths,
        })
    }

    /// Destroy the container
    ///
    /// Kills a still running init process, reaps it unless a
    /// [`ProcessSupervisor`](crate::ProcessSupervisor) is waiting for it,
    /// releases the cgroup and frees the name. Namespaces that were only joined are left alone. Calling this
    /// again does nothing.
    ///
    /// # Errors
    /// Returns the cgroup error if the group could not be removed; the
    /// container is destroyed regardless.
    pub async fn destroy(&mut self) -> Result<()> {
        if self.status == ContainerStatus::Destroyed {
            return Ok(());
        }

        if let (Some(init), Some(intermediate)) = (self.init_pid, self.intermediate) {
            if self.last_exit().is_none() && is_alive(intermediate) {
                tracing::debug!(
                    container_id = %self.id,
                    init_pid = init.as_raw(),
                    "Killing init process"
                );
                match kill(init.as_nix_pid(), Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(errno) => {
                        tracing::warn!(
                            container_id = %self.id,
                            error = %errno,
                            "Failed to kill init process"
                        );
                    }
                }
            }

            // Nobody waits for this process, so reap it here
            let unclaimed = self
                .claimed
                .as_ref()
                .is_some_and(|claimed| !claimed.swap(true, Ordering::SeqCst));
            if unclaimed {
                if let Err(e) = tokio::task::spawn_blocking(move || reap(intermediate)).await {
                    tracing::warn!(container_id = %self.id, error = %e, "Failed to reap process");
                }
            }
        }

        let released = self.driver.destroy().await;
        if let Err(ref e) = released {
            tracing::warn!(container_id = %self.id, error = %e, "Failed to release cgroup");
            self.events.error(&self.id, e.to_string());
        }

        let borrowers = self.registry.lock().await.unregister(&self.id);
        if !borrowers.is_empty() {
            tracing::warn!(
                container_id = %self.id,
                borrowers = ?borrowers,
                "Destroyed a container whose namespaces are still joined"
            );
        }

        self.status = ContainerStatus::Destroyed;
        self.events.emit(ContainerEvent::Destroyed {
            id: self.id.clone(),
            timestamp: SystemTime::now(),
        });

        released
    }
}

/// Whether a child has not exited yet, without reaping it
fn is_alive(pid: Pid) -> bool {
    matches!(
        waitid(
            Id::Pid(pid),
            WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT,
        ),
        Ok(WaitStatus::StillAlive)
    )
}

/// Collect the exit status of a child nobody else waits for
fn reap(pid: Pid) {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => {}
            Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) | Err(_) => return,
            Ok(_) => {}
        }
    }
}
