//! Container configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tandem_cgroup::CgroupPath;
use tandem_core::{Error, Result};
use tandem_namespace::idmap::validate_mappings;
use tandem_namespace::{IdMapping, NamespaceKind, NamespaceSet};

/// Everything needed to create a container
///
/// Built through [`ContainerConfig::builder`] and immutable afterwards.
///
/// # Example
/// ```
/// use tandem_container::ContainerConfig;
/// use tandem_namespace::{IdMapping, NamespaceKind, NamespaceSet};
///
/// let config = ContainerConfig::builder("/var/lib/tandem/rootfs")
///     .with_namespaces(
///         NamespaceSet::isolated()
///             .with_private(NamespaceKind::User)
///             .with_private(NamespaceKind::Network),
///     )
///     .with_uid_mapping(IdMapping::new(0, 0, 1000))
///     .with_gid_mapping(IdMapping::new(0, 0, 1000))
///     .with_hostname("integration")
///     .build()
///     .unwrap();
///
/// assert!(config.namespaces().is_private(NamespaceKind::User));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    namespaces: NamespaceSet,
    #[serde(default)]
    uid_mappings: Vec<IdMapping>,
    #[serde(default)]
    gid_mappings: Vec<IdMapping>,
    #[serde(default)]
    cgroup_path: Option<CgroupPath>,
    rootfs: PathBuf,
    #[serde(default)]
    hostname: Option<String>,
}

impl ContainerConfig {
    /// Start building a config rooted at `rootfs`
    #[must_use]
    pub fn builder(rootfs: impl Into<PathBuf>) -> ContainerConfigBuilder {
        ContainerConfigBuilder {
            config: Self {
                namespaces: NamespaceSet::new(),
                uid_mappings: Vec::new(),
                gid_mappings: Vec::new(),
                cgroup_path: None,
                rootfs: rootfs.into(),
                hostname: None,
            },
        }
    }

    /// Namespace modes
    #[must_use]
    pub const fn namespaces(&self) -> &NamespaceSet {
        &self.namespaces
    }

    /// UID mappings for a private user namespace
    #[must_use]
    pub fn uid_mappings(&self) -> &[IdMapping] {
        &self.uid_mappings
    }

    /// GID mappings for a private user namespace
    #[must_use]
    pub fn gid_mappings(&self) -> &[IdMapping] {
        &self.gid_mappings
    }

    /// Explicit cgroup placement, if any
    #[must_use]
    pub const fn cgroup_path(&self) -> Option<&CgroupPath> {
        self.cgroup_path.as_ref()
    }

    /// Root filesystem
    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    /// Hostname set inside a private UTS namespace
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Check the configuration
    ///
    /// # Errors
    /// Returns [`Error::ConfigInvalid`] if:
    /// - PID or mount namespaces are shared, or a shared path is empty
    /// - a private user namespace has no UID or GID mappings
    /// - mappings in one list overlap or are empty
    /// - the root filesystem is not absolute
    /// - a hostname is set without a private UTS namespace
    pub fn validate(&self) -> Result<()> {
        self.namespaces.validate()?;

        if self.namespaces.is_private(NamespaceKind::User) {
            if self.uid_mappings.is_empty() {
                return Err(Error::config(
                    "A private user namespace requires UID mappings",
                ));
            }
            if self.gid_mappings.is_empty() {
                return Err(Error::config(
                    "A private user namespace requires GID mappings",
                ));
            }
        }

        validate_mappings(&self.uid_mappings, "UID")?;
        validate_mappings(&self.gid_mappings, "GID")?;

        if !self.rootfs.is_absolute() {
            return Err(Error::config(format!(
                "Root filesystem must be an absolute path: {}",
                self.rootfs.display()
            )));
        }

        if let Some(hostname) = &self.hostname {
            if hostname.is_empty() {
                return Err(Error::config("Hostname cannot be empty"));
            }
            if !self.namespaces.is_private(NamespaceKind::Uts) {
                return Err(Error::config(
                    "Setting a hostname requires a private UTS namespace",
                ));
            }
        }

        Ok(())
    }
}

/// Builder for [`ContainerConfig`]
#[derive(Debug, Clone)]
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// Set the namespace modes
    #[must_use]
    pub fn with_namespaces(mut self, namespaces: NamespaceSet) -> Self {
        self.config.namespaces = namespaces;
        self
    }

    /// Append a UID mapping
    #[must_use]
    pub fn with_uid_mapping(mut self, mapping: IdMapping) -> Self {
        self.config.uid_mappings.push(mapping);
        self
    }

    /// Append a GID mapping
    #[must_use]
    pub fn with_gid_mapping(mut self, mapping: IdMapping) -> Self {
        self.config.gid_mappings.push(mapping);
        self
    }

    /// Place the container in an explicit cgroup
    #[must_use]
    pub fn with_cgroup_path(mut self, path: CgroupPath) -> Self {
        self.config.cgroup_path = Some(path);
        self
    }

    /// Set the hostname
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = Some(hostname.into());
        self
    }

    /// Validate and finish
    ///
    /// # Errors
    /// See [`ContainerConfig::validate`].
    pub fn build(self) -> Result<ContainerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
