//! Cgroup v2 placement with pluggable drivers
//!
//! Each container gets a driver that owns one group in the hierarchy. The
//! driver variant is chosen from the placement path: a parent segment naming
//! a systemd slice uses the systemd-style layout, anything else is used as-is.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cgroupfs;
pub mod driver;
pub mod mock;
pub mod path;
pub mod systemd;

pub use cgroupfs::CgroupfsDriver;
pub use driver::{CgroupDriver, DriverProvider, HierarchyProvider, CGROUP_ROOT};
pub use mock::{MockDriver, MockProvider};
pub use path::{CgroupPath, DriverKind, DEFAULT_GROUP};
pub use systemd::SystemdDriver;
