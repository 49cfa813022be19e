//! Namespace kinds and their kernel identifiers

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tandem_core::{Error, Result};

/// One kind of Linux namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceKind {
    /// Process ID namespace
    Pid,
    /// Mount namespace
    Mount,
    /// Network namespace
    Network,
    /// User namespace
    User,
    /// UTS (hostname) namespace
    Uts,
    /// IPC namespace
    Ipc,
    /// `CGroup` namespace
    Cgroup,
}

impl NamespaceKind {
    /// Every kind, in the order namespaces are entered.
    ///
    /// The user namespace comes first: joining or creating it grants the
    /// capabilities needed for every other kind.
    pub const ORDERED: [Self; 7] = [
        Self::User,
        Self::Pid,
        Self::Uts,
        Self::Ipc,
        Self::Network,
        Self::Cgroup,
        Self::Mount,
    ];

    /// The `CLONE_NEW*` flag for this kind
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::User => CloneFlags::CLONE_NEWUSER,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Cgroup => CloneFlags::CLONE_NEWCGROUP,
        }
    }

    /// Name of the link under `/proc/<pid>/ns/`
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Pid => "pid",
            Self::Mount => "mnt",
            Self::Network => "net",
            Self::User => "user",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Cgroup => "cgroup",
        }
    }

    /// Whether a container may join this kind from another container.
    ///
    /// PID and mount namespaces are tied to a container's process tree and
    /// root filesystem, so they are always private or host.
    #[must_use]
    pub const fn is_shareable(self) -> bool {
        !matches!(self, Self::Pid | Self::Mount)
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

impl FromStr for NamespaceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ORDERED
            .into_iter()
            .find(|kind| kind.proc_name() == s)
            .ok_or_else(|| Error::config(format!("Unknown namespace kind: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_is_entered_first() {
        assert_eq!(NamespaceKind::ORDERED[0], NamespaceKind::User);
    }

    #[test]
    fn test_shareable_kinds() {
        assert!(NamespaceKind::Network.is_shareable());
        assert!(NamespaceKind::User.is_shareable());
        assert!(!NamespaceKind::Pid.is_shareable());
        assert!(!NamespaceKind::Mount.is_shareable());
    }

    #[test]
    fn test_parse_proc_names() {
        assert_eq!("net".parse::<NamespaceKind>().unwrap(), NamespaceKind::Network);
        assert_eq!("mnt".parse::<NamespaceKind>().unwrap(), NamespaceKind::Mount);
        assert!("network".parse::<NamespaceKind>().is_err());
    }
}
