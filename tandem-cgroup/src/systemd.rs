//! systemd-style driver
//!
//! Lays the group out the way systemd does: the parent segment is a slice,
//! expanded into its ancestors (`a-b.slice` lives in `a.slice/a-b.slice`), and
//! the container owns a `tandem-<leaf>.scope` inside it. The directories are
//! managed directly in the hierarchy; no D-Bus connection is made.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tandem_core::{ProcessId, Result};

use crate::cgroupfs::CgroupDir;
use crate::driver::CgroupDriver;
use crate::path::{CgroupPath, DriverKind};

const SCOPE_PREFIX: &str = "tandem";

/// Expand a slice name into its path (`user-1000.slice` -> `user.slice/user-1000.slice`)
#[must_use]
pub fn expand_slice(slice: &str) -> PathBuf {
    let Some(stem) = slice.strip_suffix(".slice") else {
        return PathBuf::from(slice);
    };

    let mut path = PathBuf::new();
    let mut prefix = String::new();
    for part in stem.split('-').filter(|part| !part.is_empty()) {
        if !prefix.is_empty() {
            prefix.push('-');
        }
        prefix.push_str(part);
        path.push(format!("{prefix}.slice"));
    }

    if path.as_os_str().is_empty() {
        path.push(slice);
    }
    path
}

/// Driver for a systemd-style hierarchy
#[derive(Debug, Clone)]
pub struct SystemdDriver {
    dir: CgroupDir,
}

impl SystemdDriver {
    /// Driver for `path` under the hierarchy `root`
    ///
    /// Components between the slice and the leaf are ignored; systemd scopes
    /// sit directly in their slice.
    #[must_use]
    pub fn new(root: &Path, path: &CgroupPath) -> Self {
        let slice = path.parent_segment().unwrap_or("system.slice");
        let scope = format!("{SCOPE_PREFIX}-{}.scope", path.leaf());

        Self {
            dir: CgroupDir::new(root.join(expand_slice(slice)).join(scope)),
        }
    }
}

#[async_trait]
impl CgroupDriver for SystemdDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Systemd
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn apply(&self, pid: ProcessId) -> Result<()> {
        tracing::debug!(scope = %self.dir.path().display(), "Placing process in systemd scope");
        self.dir.add_process(pid).await
    }

    async fn destroy(&self) -> Result<()> {
        self.dir.remove().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_slice() {
        assert_eq!(expand_slice("system.slice"), PathBuf::from("system.slice"));
        assert_eq!(
            expand_slice("user-1000.slice"),
            PathBuf::from("user.slice/user-1000.slice")
        );
        assert_eq!(
            expand_slice("a-b-c.slice"),
            PathBuf::from("a.slice/a-b.slice/a-b-c.slice")
        );
    }

    #[test]
    fn test_scope_path() {
        let path = CgroupPath::new("machine.slice/nested/web").unwrap();
        let driver = SystemdDriver::new(Path::new("/sys/fs/cgroup"), &path);

        assert_eq!(
            driver.path(),
            Path::new("/sys/fs/cgroup/machine.slice/tandem-web.scope")
        );
    }

    #[tokio::test]
    async fn test_apply_in_fake_hierarchy() {
        let root = tempfile::tempdir().unwrap();
        let path = CgroupPath::new("system.slice/db").unwrap();
        let driver = SystemdDriver::new(root.path(), &path);

        driver.apply(ProcessId::from_raw(77)).await.unwrap();

        let procs = root.path().join("system.slice/tandem-db.scope/cgroup.procs");
        assert_eq!(std::fs::read_to_string(procs).unwrap(), "77");
    }
}
