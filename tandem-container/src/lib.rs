//! Containers that selectively share namespaces
//!
//! A [`Factory`] turns a [`ContainerConfig`] into a [`Container`]. Running a
//! [`Process`] allocates the container's namespaces: private kinds are
//! created, shared kinds are joined through a handle another container's
//! [`StateSnapshot`] exposes, and everything else is inherited from the host.
//! [`ProcessSupervisor`] waits for processes and [`TeardownOrchestrator`]
//! destroys containers that lent namespaces only after their borrowers.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

mod channel;
pub mod config;
pub mod container;
mod events;
pub mod factory;
mod launch;
mod message;
pub mod process;
mod registry;
pub mod supervisor;
pub mod teardown;

pub use config::{ContainerConfig, ContainerConfigBuilder};
pub use container::{Container, ContainerStatus, StateSnapshot};
pub use factory::Factory;
pub use process::{ExitResult, Process};
pub use supervisor::{ExitHandle, ProcessSupervisor};
pub use teardown::TeardownOrchestrator;
