//! Namespace allocation for a container's init process
//!
//! A [`NamespacePlan`] is prepared in the calling process, where failures can
//! still be reported normally: every shared namespace is opened up front. The
//! `enter_*`/`unshare_*` methods are then run by the forked setup process.

use nix::errno::Errno;
use nix::sched::{setns, unshare, CloneFlags};
use std::fs::File;
use std::path::{Path, PathBuf};
use tandem_core::{Error, Result};

use crate::config::NamespaceSet;
use crate::kind::NamespaceKind;

/// A shared namespace opened for joining
#[derive(Debug)]
pub struct NamespaceJoin {
    kind: NamespaceKind,
    path: PathBuf,
    file: File,
}

impl NamespaceJoin {
    /// Kind being joined
    #[must_use]
    pub const fn kind(&self) -> NamespaceKind {
        self.kind
    }

    /// Path the namespace was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Ordered namespace setup steps derived from a [`NamespaceSet`]
#[derive(Debug)]
pub struct NamespacePlan {
    joins: Vec<NamespaceJoin>,
    new_user: bool,
    new_cgroup: bool,
    unshare: CloneFlags,
}

impl NamespacePlan {
    /// Validate the set and open every shared namespace
    ///
    /// # Errors
    /// Returns [`Error::ConfigInvalid`] if the set breaks the sharing rules and
    /// [`Error::NamespaceJoinFailed`] if a shared path cannot be opened (its
    /// owner is gone or the path is stale).
    pub fn prepare(set: &NamespaceSet) -> Result<Self> {
        set.validate()?;

        let joins = set
            .shared()
            .map(|(kind, path)| {
                let file = File::open(path).map_err(|e| {
                    tracing::warn!(
                        namespace = %kind,
                        path = %path.display(),
                        error = %e,
                        "Shared namespace is not available"
                    );
                    Error::NamespaceJoinFailed {
                        namespace: kind.to_string(),
                        path: path.display().to_string(),
                        message: e.to_string(),
                    }
                })?;

                Ok(NamespaceJoin {
                    kind,
                    path: path.to_path_buf(),
                    file,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut unshare = set.to_clone_flags();
        let new_user = unshare.contains(CloneFlags::CLONE_NEWUSER);
        let new_cgroup = unshare.contains(CloneFlags::CLONE_NEWCGROUP);
        unshare.remove(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWCGROUP);

        tracing::debug!(
            joins = joins.len(),
            new_user,
            new_cgroup,
            unshare = ?unshare,
            "Prepared namespace plan"
        );

        Ok(Self {
            joins,
            new_user,
            new_cgroup,
            unshare,
        })
    }

    /// Shared namespaces, user first
    #[must_use]
    pub fn joins(&self) -> &[NamespaceJoin] {
        &self.joins
    }

    /// Whether a fresh user namespace needs id mappings written
    #[must_use]
    pub const fn requires_id_mapping(&self) -> bool {
        self.new_user
    }

    /// Flags unshared after the user namespace is in place
    #[must_use]
    pub const fn unshare_flags(&self) -> CloneFlags {
        self.unshare
    }

    /// Join every shared namespace, in order
    ///
    /// Runs in the forked setup process.
    ///
    /// # Errors
    /// Returns the kind that the kernel refused to join, with its errno.
    pub fn enter_shared(&self) -> std::result::Result<(), (NamespaceKind, Errno)> {
        for join in &self.joins {
            setns(&join.file, join.kind.clone_flag()).map_err(|errno| (join.kind, errno))?;
        }
        Ok(())
    }

    /// Create the private user namespace, if requested
    ///
    /// # Errors
    /// Returns the errno of a failed `unshare(2)`.
    pub fn unshare_user(&self) -> nix::Result<()> {
        if self.new_user {
            unshare(CloneFlags::CLONE_NEWUSER)?;
        }
        Ok(())
    }

    /// Create every other private namespace except cgroup
    ///
    /// A new PID namespace only applies to children forked afterwards.
    ///
    /// # Errors
    /// Returns the errno of a failed `unshare(2)`.
    pub fn unshare_rest(&self) -> nix::Result<()> {
        if !self.unshare.is_empty() {
            unshare(self.unshare)?;
        }
        Ok(())
    }

    /// Create the private cgroup namespace, if requested
    ///
    /// Called by the init process once it sits in its final cgroup, so the
    /// namespace is rooted there.
    ///
    /// # Errors
    /// Returns the errno of a failed `unshare(2)`.
    pub fn unshare_cgroup(&self) -> nix::Result<()> {
        if self.new_cgroup {
            unshare(CloneFlags::CLONE_NEWCGROUP)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_user_is_split_out() {
        let set = NamespaceSet::isolated().with_private(NamespaceKind::User);
        let plan = NamespacePlan::prepare(&set).unwrap();

        assert!(plan.requires_id_mapping());
        assert!(!plan.unshare_flags().contains(CloneFlags::CLONE_NEWUSER));
        assert!(plan.unshare_flags().contains(CloneFlags::CLONE_NEWPID));
        assert!(plan.joins().is_empty());
    }

    #[test]
    fn test_private_cgroup_is_deferred() {
        let set = NamespaceSet::new().with_private(NamespaceKind::Cgroup);
        let plan = NamespacePlan::prepare(&set).unwrap();

        assert!(plan.unshare_flags().is_empty());
    }

    #[test]
    fn test_join_own_namespace_is_opened() {
        let set = NamespaceSet::new().with_shared(NamespaceKind::Network, "/proc/self/ns/net");
        let plan = NamespacePlan::prepare(&set).unwrap();

        assert_eq!(plan.joins().len(), 1);
        assert_eq!(plan.joins()[0].kind(), NamespaceKind::Network);
        assert_eq!(plan.joins()[0].path(), Path::new("/proc/self/ns/net"));
    }

    #[test]
    fn test_missing_shared_path_fails_to_join() {
        let set = NamespaceSet::new()
            .with_shared(NamespaceKind::Network, "/proc/does-not-exist/ns/net");
        let err = NamespacePlan::prepare(&set).unwrap_err();

        match err {
            Error::NamespaceJoinFailed { namespace, path, .. } => {
                assert_eq!(namespace, "net");
                assert_eq!(path, "/proc/does-not-exist/ns/net");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_set_rejected_before_opening() {
        let set = NamespaceSet::new().with_shared(NamespaceKind::Mount, "/proc/self/ns/mnt");
        assert!(matches!(
            NamespacePlan::prepare(&set),
            Err(Error::ConfigInvalid { .. })
        ));
    }
}
