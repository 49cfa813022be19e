//! Namespace configuration

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tandem_core::{Error, Result};

use crate::kind::NamespaceKind;

/// How a container obtains one namespace kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceMode {
    /// A new namespace is created for the container
    Private,
    /// The container joins the namespace behind this path
    Shared(PathBuf),
    /// No isolation, the caller's namespace is inherited
    Host,
}

static HOST: NamespaceMode = NamespaceMode::Host;

/// Per-kind namespace modes for one container
///
/// Kinds that were never set are [`NamespaceMode::Host`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceSet {
    modes: BTreeMap<NamespaceKind, NamespaceMode>,
}

impl NamespaceSet {
    /// Create an empty set (everything inherited from the host)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No isolation at all
    #[must_use]
    pub fn host() -> Self {
        Self::default()
    }

    /// PID, mount, network, UTS and IPC isolation; user and cgroup inherited
    #[must_use]
    pub fn isolated() -> Self {
        Self::new()
            .with_private(NamespaceKind::Mount)
            .with_private(NamespaceKind::Uts)
            .with_private(NamespaceKind::Ipc)
            .with_private(NamespaceKind::Pid)
            .with_private(NamespaceKind::Network)
    }

    /// Create a fresh namespace of this kind
    #[must_use]
    pub fn with_private(self, kind: NamespaceKind) -> Self {
        self.with_mode(kind, NamespaceMode::Private)
    }

    /// Join the namespace of this kind found at `path`
    #[must_use]
    pub fn with_shared(self, kind: NamespaceKind, path: impl Into<PathBuf>) -> Self {
        self.with_mode(kind, NamespaceMode::Shared(path.into()))
    }

    /// Inherit the caller's namespace of this kind
    #[must_use]
    pub fn with_host(self, kind: NamespaceKind) -> Self {
        self.with_mode(kind, NamespaceMode::Host)
    }

    /// Set an explicit mode
    #[must_use]
    pub fn with_mode(mut self, kind: NamespaceKind, mode: NamespaceMode) -> Self {
        if mode == NamespaceMode::Host {
            self.modes.remove(&kind);
        } else {
            self.modes.insert(kind, mode);
        }
        self
    }

    /// Mode of one kind
    #[must_use]
    pub fn mode(&self, kind: NamespaceKind) -> &NamespaceMode {
        self.modes.get(&kind).unwrap_or(&HOST)
    }

    /// Whether a fresh namespace of this kind is requested
    #[must_use]
    pub fn is_private(&self, kind: NamespaceKind) -> bool {
        matches!(self.mode(kind), NamespaceMode::Private)
    }

    /// Path joined for this kind, if shared
    #[must_use]
    pub fn shared_path(&self, kind: NamespaceKind) -> Option<&Path> {
        match self.mode(kind) {
            NamespaceMode::Shared(path) => Some(path),
            _ => None,
        }
    }

    /// Shared kinds with their paths, in entering order
    pub fn shared(&self) -> impl Iterator<Item = (NamespaceKind, &Path)> + '_ {
        NamespaceKind::ORDERED
            .into_iter()
            .filter_map(|kind| self.shared_path(kind).map(|path| (kind, path)))
    }

    /// Private kinds, in entering order
    #[must_use]
    pub fn private_kinds(&self) -> Vec<NamespaceKind> {
        NamespaceKind::ORDERED
            .into_iter()
            .filter(|kind| self.is_private(*kind))
            .collect()
    }

    /// Clone flags for every private kind
    #[must_use]
    pub fn to_clone_flags(&self) -> CloneFlags {
        self.private_kinds()
            .into_iter()
            .fold(CloneFlags::empty(), |flags, kind| flags | kind.clone_flag())
    }

    /// Check the sharing rules
    ///
    /// # Errors
    /// Returns [`Error::ConfigInvalid`] if a PID or mount namespace is shared,
    /// or a shared path is empty.
    pub fn validate(&self) -> Result<()> {
        for (kind, mode) in &self.modes {
            let NamespaceMode::Shared(path) = mode else {
                continue;
            };

            if !kind.is_shareable() {
                return Err(Error::config(format!(
                    "Sharing the {kind} namespace is not supported"
                )));
            }

            if path.as_os_str().is_empty() {
                return Err(Error::config(format!(
                    "Shared {kind} namespace requires a path"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_is_host() {
        let set = NamespaceSet::default();
        assert_eq!(set.mode(NamespaceKind::Network), &NamespaceMode::Host);
        assert!(set.to_clone_flags().is_empty());
    }

    #[test]
    fn test_isolated_preset() {
        let set = NamespaceSet::isolated();
        assert!(set.is_private(NamespaceKind::Pid));
        assert!(set.is_private(NamespaceKind::Mount));
        assert!(set.is_private(NamespaceKind::Network));
        assert!(!set.is_private(NamespaceKind::User));

        let flags = set.to_clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNET));
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn test_builder_pattern() {
        let set = NamespaceSet::isolated()
            .with_shared(NamespaceKind::Network, "/proc/10/ns/net")
            .with_private(NamespaceKind::User);

        assert_eq!(
            set.shared_path(NamespaceKind::Network),
            Some(Path::new("/proc/10/ns/net"))
        );
        assert!(!set.to_clone_flags().contains(CloneFlags::CLONE_NEWNET));
        assert!(set.to_clone_flags().contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn test_host_mode_clears_entry() {
        let set = NamespaceSet::isolated().with_host(NamespaceKind::Pid);
        assert_eq!(set.mode(NamespaceKind::Pid), &NamespaceMode::Host);
    }

    #[test]
    fn test_shared_iterates_user_first() {
        let set = NamespaceSet::new()
            .with_shared(NamespaceKind::Network, "/proc/1/ns/net")
            .with_shared(NamespaceKind::User, "/proc/1/ns/user");

        let kinds: Vec<_> = set.shared().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![NamespaceKind::User, NamespaceKind::Network]);
    }

    #[test]
    fn test_pid_and_mount_sharing_rejected() {
        for kind in [NamespaceKind::Pid, NamespaceKind::Mount] {
            let set = NamespaceSet::new().with_shared(kind, "/proc/1/ns/x");
            assert!(matches!(set.validate(), Err(Error::ConfigInvalid { .. })));
        }
    }

    #[test]
    fn test_empty_shared_path_rejected() {
        let set = NamespaceSet::new().with_shared(NamespaceKind::Network, "");
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_set_serde() {
        let set = NamespaceSet::new()
            .with_private(NamespaceKind::User)
            .with_shared(NamespaceKind::Network, "/proc/7/ns/net");

        let json = serde_json::to_string(&set).unwrap();
        let back: NamespaceSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set, back);
    }
}
