//! Cgroup placement paths and driver selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tandem_core::{ContainerId, Error, Result};

/// Default group used when a container config names no cgroup path
pub const DEFAULT_GROUP: &str = "tandem";

/// Relative cgroup placement, e.g. `integration/test2` or `system.slice/web`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CgroupPath(PathBuf);

impl CgroupPath {
    /// Parse and validate a cgroup path
    ///
    /// # Errors
    /// Returns [`Error::ConfigInvalid`] for empty or absolute paths and for
    /// paths containing `.` or `..` components.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if path.as_os_str().is_empty() {
            return Err(Error::config("Cgroup path cannot be empty"));
        }

        if !path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(Error::config(format!(
                "Cgroup path must be relative and normalized: {}",
                path.display()
            )));
        }

        Ok(Self(path))
    }

    /// Default placement for a container: `tandem/<name>`
    #[must_use]
    pub fn for_container(id: &ContainerId) -> Self {
        Self(Path::new(DEFAULT_GROUP).join(id.as_str()))
    }

    /// The parent segment (first component), if the path has more than one
    #[must_use]
    pub fn parent_segment(&self) -> Option<&str> {
        let mut components = self.0.components();
        let first = components.next()?;
        components.next()?;
        first.as_os_str().to_str()
    }

    /// Last component of the path
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.0
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    /// Path relative to the hierarchy root
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for CgroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl TryFrom<String> for CgroupPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<CgroupPath> for String {
    fn from(path: CgroupPath) -> Self {
        path.0.to_string_lossy().into_owned()
    }
}

/// Cgroup driver variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Plain cgroupfs hierarchy: the path is used as-is under the root
    Cgroupfs,
    /// systemd-style hierarchy: the container gets a scope inside a slice
    Systemd,
}

impl DriverKind {
    /// Pick the driver for a placement
    ///
    /// A parent segment naming a systemd slice (`system.slice`,
    /// `machine.slice`, ...) routes to the systemd-style driver.
    #[must_use]
    pub fn select(path: &CgroupPath) -> Self {
        match path.parent_segment() {
            Some(parent) if parent.ends_with(".slice") => Self::Systemd,
            _ => Self::Cgroupfs,
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cgroupfs => write!(f, "cgroupfs"),
            Self::Systemd => write!(f, "systemd"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_validation() {
        assert!(CgroupPath::new("integration/test2").is_ok());
        assert!(CgroupPath::new("single").is_ok());
        assert!(CgroupPath::new("").is_err());
        assert!(CgroupPath::new("/sys/fs/cgroup/x").is_err());
        assert!(CgroupPath::new("a/../b").is_err());
    }

    #[test]
    fn test_parent_and_leaf() {
        let path = CgroupPath::new("integration/test2").unwrap();
        assert_eq!(path.parent_segment(), Some("integration"));
        assert_eq!(path.leaf(), "test2");

        let single = CgroupPath::new("lonely").unwrap();
        assert_eq!(single.parent_segment(), None);
        assert_eq!(single.leaf(), "lonely");
    }

    #[test]
    fn test_default_placement() {
        let id = ContainerId::new("abc").unwrap();
        assert_eq!(CgroupPath::for_container(&id).to_string(), "tandem/abc");
    }

    #[test]
    fn test_driver_selection() {
        let plain = CgroupPath::new("integration/test").unwrap();
        let slice = CgroupPath::new("system.slice/test").unwrap();
        let nested = CgroupPath::new("user-1000.slice/app/test").unwrap();
        let leaf_only = CgroupPath::new("system.slice").unwrap();

        assert_eq!(DriverKind::select(&plain), DriverKind::Cgroupfs);
        assert_eq!(DriverKind::select(&slice), DriverKind::Systemd);
        assert_eq!(DriverKind::select(&nested), DriverKind::Systemd);
        assert_eq!(DriverKind::select(&leaf_only), DriverKind::Cgroupfs);
    }
}
