//! Cgroup driver trait for pluggable implementations

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tandem_core::{ProcessId, Result};

use crate::cgroupfs::CgroupfsDriver;
use crate::path::{CgroupPath, DriverKind};
use crate::systemd::SystemdDriver;

/// Default mount point of the unified hierarchy
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Places one container's processes in a control group
///
/// Implementations:
/// - [`CgroupfsDriver`] - plain hierarchy
/// - [`SystemdDriver`] - systemd-style slice/scope layout
/// - [`MockDriver`](crate::MockDriver) - testing without filesystem
///
/// Creating a driver has no side effects; the group appears on the first
/// [`apply`](CgroupDriver::apply).
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait CgroupDriver: Send + Sync + Debug {
    /// Which variant this is
    fn kind(&self) -> DriverKind;

    /// Location of the group in the hierarchy
    fn path(&self) -> &Path;

    /// Create the group if needed and move a process into it
    ///
    /// # Errors
    /// Returns error if the group cannot be created or the process moved
    async fn apply(&self, pid: ProcessId) -> Result<()>;

    /// Remove the group
    ///
    /// Removing a group that does not exist succeeds.
    ///
    /// # Errors
    /// Returns error if the group exists but cannot be removed
    async fn destroy(&self) -> Result<()>;
}

/// Builds the driver a factory hands to each new container
pub trait DriverProvider: Send + Sync + Debug {
    /// Driver of the given kind for one placement
    fn driver(&self, kind: DriverKind, path: &CgroupPath) -> Box<dyn CgroupDriver>;
}

/// Provider backed by a real cgroup v2 hierarchy
#[derive(Debug, Clone)]
pub struct HierarchyProvider {
    root: PathBuf,
}

impl HierarchyProvider {
    /// Provider rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Hierarchy root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for HierarchyProvider {
    fn default() -> Self {
        Self::new(CGROUP_ROOT)
    }
}

impl DriverProvider for HierarchyProvider {
    fn driver(&self, kind: DriverKind, path: &CgroupPath) -> Box<dyn CgroupDriver> {
        tracing::debug!(driver = %kind, path = %path, "Selecting cgroup driver");

        match kind {
            DriverKind::Cgroupfs => Box::new(CgroupfsDriver::new(&self.root, path)),
            DriverKind::Systemd => Box::new(SystemdDriver::new(&self.root, path)),
        }
    }
}
