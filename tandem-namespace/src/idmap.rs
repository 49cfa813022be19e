//! UID/GID mappings for user namespaces

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use tandem_core::{Error, ProcessId, Result};

/// One contiguous range of ids mapped into a user namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    /// First id on the host side
    pub host_id: u32,
    /// First id inside the container
    pub container_id: u32,
    /// Number of ids in the range
    pub size: u32,
}

impl IdMapping {
    /// Create a mapping of `size` ids starting at `host_id` / `container_id`
    #[must_use]
    pub const fn new(host_id: u32, container_id: u32, size: u32) -> Self {
        Self {
            host_id,
            container_id,
            size,
        }
    }

    fn container_end(self) -> Option<u32> {
        self.container_id.checked_add(self.size)
    }

    fn host_end(self) -> Option<u32> {
        self.host_id.checked_add(self.size)
    }
}

/// Check one mapping list
///
/// `what` names the list in error messages (`"uid"` or `"gid"`).
///
/// # Errors
/// Returns [`Error::ConfigInvalid`] for empty ranges, ranges that overflow, or
/// ranges that overlap on the container side.
pub fn validate_mappings(mappings: &[IdMapping], what: &str) -> Result<()> {
    for mapping in mappings {
        if mapping.size == 0 {
            return Err(Error::config(format!("{what} mapping has zero size")));
        }
        if mapping.container_end().is_none() || mapping.host_end().is_none() {
            return Err(Error::config(format!("{what} mapping overflows: {mapping:?}")));
        }
    }

    let mut sorted = mappings.to_vec();
    sorted.sort_by_key(|m| m.container_id);
    for pair in sorted.windows(2) {
        let end = pair[0].container_end().unwrap_or(u32::MAX);
        if pair[1].container_id < end {
            return Err(Error::config(format!(
                "{what} mappings overlap inside the container: {:?} and {:?}",
                pair[0], pair[1]
            )));
        }
    }

    Ok(())
}

/// Render mappings in the `/proc/<pid>/uid_map` format
#[must_use]
pub fn format_mappings(mappings: &[IdMapping]) -> String {
    mappings.iter().fold(String::new(), |mut out, m| {
        let _ = writeln!(out, "{} {} {}", m.container_id, m.host_id, m.size);
        out
    })
}

/// Write uid and gid maps for a process that just created a user namespace
///
/// # Errors
/// Returns an error if either map file cannot be written.
pub fn write_mappings(pid: ProcessId, uid: &[IdMapping], gid: &[IdMapping]) -> Result<()> {
    let base = PathBuf::from(format!("/proc/{pid}"));

    for (file, mappings) in [("uid_map", uid), ("gid_map", gid)] {
        let path = base.join(file);
        tracing::debug!(path = %path.display(), count = mappings.len(), "Writing id mappings");

        std::fs::write(&path, format_mappings(mappings)).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to write id mappings");
            Error::namespace(format!("Failed to write {}: {e}", path.display()))
        })?;
    }

    Ok(())
}
