//! Namespace management for container isolation and sharing
//!
//! This crate describes which Linux namespaces a container owns, joins or
//! inherits, and carries out that allocation for a container's init process:
//! - PID namespace - Process isolation
//! - Network namespace - Network isolation, shareable
//! - Mount namespace - Filesystem isolation
//! - UTS namespace - Hostname isolation, shareable
//! - IPC namespace - Inter-process communication isolation, shareable
//! - User namespace - UID/GID mapping, shareable
//! - Cgroup namespace - Cgroup root isolation, shareable

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod idmap;
pub mod info;
pub mod kind;
pub mod plan;

pub use config::{NamespaceMode, NamespaceSet};
pub use idmap::IdMapping;
pub use info::{namespace_path, read_identity, NamespaceInfo};
pub use kind::NamespaceKind;
pub use plan::{NamespaceJoin, NamespacePlan};
