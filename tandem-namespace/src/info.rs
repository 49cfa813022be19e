//! Namespace inspection through `/proc/<pid>/ns`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tandem_core::{Error, ProcessId, Result};

use crate::kind::NamespaceKind;

/// Path of a process's namespace link, e.g. `/proc/42/ns/net`
#[must_use]
pub fn namespace_path(pid: ProcessId, kind: NamespaceKind) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/ns/{}", kind.proc_name()))
}

/// Read the identity behind a namespace handle, e.g. `net:[4026531993]`
///
/// # Errors
/// Returns error if the link cannot be read (process gone, no permission).
pub fn read_identity(path: &Path) -> Result<String> {
    fs::read_link(path)
        .map(|target| target.to_string_lossy().into_owned())
        .map_err(|e| Error::namespace(format!("Failed to read {}: {e}", path.display())))
}

/// Namespace identities of one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceInfo {
    identities: BTreeMap<NamespaceKind, String>,
}

impl NamespaceInfo {
    /// Namespaces of the current process
    ///
    /// # Errors
    /// Returns error if no namespace link could be read
    pub fn current() -> Result<Self> {
        Self::for_pid(ProcessId::current())
    }

    /// Namespaces of a specific PID
    ///
    /// Kinds the kernel does not expose are left out.
    ///
    /// # Errors
    /// Returns error if no namespace link could be read
    pub fn for_pid(pid: ProcessId) -> Result<Self> {
        let identities: BTreeMap<_, _> = NamespaceKind::ORDERED
            .into_iter()
            .filter_map(|kind| {
                read_identity(&namespace_path(pid, kind))
                    .ok()
                    .map(|id| (kind, id))
            })
            .collect();

        if identities.is_empty() {
            return Err(Error::namespace(format!(
                "No namespace information for pid {pid}"
            )));
        }

        Ok(Self { identities })
    }

    /// Identity of one kind
    #[must_use]
    pub fn get(&self, kind: NamespaceKind) -> Option<&str> {
        self.identities.get(&kind).map(String::as_str)
    }

    /// Check if in different PID, network or mount namespace than init (PID 1)
    ///
    /// # Errors
    /// Returns error if cannot read namespaces of PID 1
    pub fn is_isolated(&self) -> Result<bool> {
        let init_ns = Self::for_pid(ProcessId::from_raw(1))?;

        Ok([
            NamespaceKind::Pid,
            NamespaceKind::Network,
            NamespaceKind::Mount,
        ]
        .into_iter()
        .any(|kind| self.get(kind) != init_ns.get(kind)))
    }
}

impl std::fmt::Display for NamespaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Namespace Info:")?;
        for (kind, identity) in &self.identities {
            let label = format!("{}:", kind.proc_name().to_uppercase());
            writeln!(f, "  {label:<8}{identity}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_path() {
        let path = namespace_path(ProcessId::from_raw(42), NamespaceKind::Network);
        assert_eq!(path, PathBuf::from("/proc/42/ns/net"));
    }

    #[test]
    fn test_current_namespaces() {
        let info = NamespaceInfo::current().unwrap();
        let net = info.get(NamespaceKind::Network).unwrap();
        assert!(net.starts_with("net:["));
    }

    #[test]
    fn test_identity_of_missing_process() {
        let path = namespace_path(ProcessId::from_raw(i32::MAX), NamespaceKind::User);
        assert!(read_identity(&path).is_err());
    }

    #[test]
    fn test_namespace_info_display() {
        let mut identities = BTreeMap::new();
        identities.insert(NamespaceKind::Pid, "pid:[4026531836]".to_string());
        identities.insert(NamespaceKind::Network, "net:[4026531905]".to_string());
        let info = NamespaceInfo { identities };

        let display = format!("{info}");
        assert!(display.contains("PID:    pid:[4026531836]"));
        assert!(display.contains("NET:    net:[4026531905]"));
    }
}
