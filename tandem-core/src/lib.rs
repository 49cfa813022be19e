//! Tandem Core - Foundation types, events, and errors
//!
//! This crate provides the core abstractions shared by the namespace, cgroup
//! and container crates.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use events::ContainerEvent;
pub use types::{ContainerId, ProcessId};
