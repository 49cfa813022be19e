//! Plain cgroupfs driver

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};
use tandem_core::{Error, ProcessId, Result};

use crate::driver::CgroupDriver;
use crate::path::{CgroupPath, DriverKind};

const REMOVE_ATTEMPTS: u32 = 5;

/// A group directory in a cgroup v2 hierarchy
///
/// Shared by both filesystem drivers; only the directory layout differs.
#[derive(Debug, Clone)]
pub(crate) struct CgroupDir {
    path: PathBuf,
}

impl CgroupDir {
    pub(crate) const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn add_process(&self, pid: ProcessId) -> Result<()> {
        if !self.path.exists() {
            debug!("Creating cgroup directory: {}", self.path.display());
            fs::create_dir_all(&self.path).await.map_err(|e| {
                Error::cgroup(format!(
                    "Failed to create cgroup {}: {e}",
                    self.path.display()
                ))
            })?;
        }

        let procs_file = self.path.join("cgroup.procs");
        debug!(pid = pid.as_raw(), "Adding process to {}", procs_file.display());

        fs::write(&procs_file, pid.as_raw().to_string())
            .await
            .map_err(|e| Error::cgroup(format!("Failed to add process {pid} to cgroup: {e}")))
    }

    /// Remove the directory, waiting briefly for killed tasks to leave
    pub(crate) async fn remove(&self) -> Result<()> {
        let mut delay = Duration::from_millis(10);

        for attempt in 1..=REMOVE_ATTEMPTS {
            match fs::remove_dir(&self.path).await {
                Ok(()) => {
                    debug!("Removed cgroup {}", self.path.display());
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) if e.raw_os_error() == Some(libc::EBUSY) && attempt < REMOVE_ATTEMPTS => {
                    debug!(attempt, "Cgroup {} still busy", self.path.display());
                    sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    warn!(error = %e, "Could not remove cgroup {}", self.path.display());
                    return Err(Error::cgroup(format!(
                        "Failed to remove cgroup {}: {e}",
                        self.path.display()
                    )));
                }
            }
        }

        Err(Error::cgroup(format!(
            "Cgroup {} still busy",
            self.path.display()
        )))
    }
}

/// Driver for a plain hierarchy: `<root>/<path>`
#[derive(Debug, Clone)]
pub struct CgroupfsDriver {
    dir: CgroupDir,
}

impl CgroupfsDriver {
    /// Driver for `path` under the hierarchy `root`
    #[must_use]
    pub fn new(root: &Path, path: &CgroupPath) -> Self {
        Self {
            dir: CgroupDir::new(root.join(path.as_path())),
        }
    }
}

#[async_trait]
impl CgroupDriver for CgroupfsDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Cgroupfs
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn apply(&self, pid: ProcessId) -> Result<()> {
        self.dir.add_process(pid).await
    }

    async fn destroy(&self) -> Result<()> {
        self.dir.remove().await
    }
}
