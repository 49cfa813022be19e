//! Mock drivers for testing (don't touch the filesystem)

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tandem_core::{ProcessId, Result};

use crate::driver::{CgroupDriver, DriverProvider};
use crate::path::{CgroupPath, DriverKind};

#[derive(Debug, Default)]
struct MockState {
    created: Vec<(DriverKind, CgroupPath)>,
    processes: Vec<(PathBuf, ProcessId)>,
    destroyed: Vec<PathBuf>,
    call_count: usize,
}

/// Provider whose drivers record every call in shared state
///
/// # Example
/// ```
/// use tandem_cgroup::{CgroupPath, DriverKind, DriverProvider, MockProvider};
/// use tandem_core::ProcessId;
///
/// let provider = MockProvider::new();
/// let path = CgroupPath::new("system.slice/web").unwrap();
/// let driver = provider.driver(DriverKind::select(&path), &path);
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(driver.apply(ProcessId::from_raw(123))).unwrap();
///
/// assert_eq!(provider.created()[0].0, DriverKind::Systemd);
/// assert!(provider.has_process(ProcessId::from_raw(123)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Create a new mock provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drivers handed out so far, with their kind
    #[must_use]
    pub fn created(&self) -> Vec<(DriverKind, CgroupPath)> {
        lock(&self.state).created.clone()
    }

    /// Check if a process has been placed by any driver
    #[must_use]
    pub fn has_process(&self, pid: ProcessId) -> bool {
        lock(&self.state).processes.iter().any(|(_, p)| *p == pid)
    }

    /// Number of destroy calls that reached a driver
    #[must_use]
    pub fn destroy_count(&self) -> usize {
        lock(&self.state).destroyed.len()
    }

    /// Get the number of driver calls made (for testing)
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.state).call_count
    }
}

// The guard is never held across an await, so a std mutex is enough.
fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DriverProvider for MockProvider {
    fn driver(&self, kind: DriverKind, path: &CgroupPath) -> Box<dyn CgroupDriver> {
        lock(&self.state).created.push((kind, path.clone()));

        Box::new(MockDriver {
            kind,
            path: PathBuf::from("/mock").join(path.as_path()),
            state: Arc::clone(&self.state),
        })
    }
}

/// Driver that records calls instead of touching the hierarchy
#[derive(Debug, Clone)]
pub struct MockDriver {
    kind: DriverKind,
    path: PathBuf,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl CgroupDriver for MockDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn apply(&self, pid: ProcessId) -> Result<()> {
        let mut state = lock(&self.state);
        state.processes.push((self.path.clone(), pid));
        state.call_count += 1;

        tracing::debug!(pid = pid.as_raw(), path = %self.path.display(), "Mock: Added process");

        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.call_count += 1;

        let before = state.processes.len();
        state.processes.retain(|(path, _)| *path != self.path);
        state.destroyed.push(self.path.clone());

        tracing::debug!(
            processes_removed = before - state.processes.len(),
            "Mock: Cleaned up"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_driver_lifecycle() {
        let provider = MockProvider::new();
        let path = CgroupPath::new("integration/test").unwrap();
        let driver = provider.driver(DriverKind::select(&path), &path);

        assert_eq!(driver.kind(), DriverKind::Cgroupfs);

        let pid = ProcessId::from_raw(123);
        driver.apply(pid).await.unwrap();
        assert!(provider.has_process(pid));
        assert_eq!(provider.call_count(), 1);

        driver.destroy().await.unwrap();
        assert!(!provider.has_process(pid));
        assert_eq!(provider.destroy_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_records_dispatch() {
        let provider = MockProvider::new();
        for raw in ["integration/a", "system.slice/b"] {
            let path = CgroupPath::new(raw).unwrap();
            let _ = provider.driver(DriverKind::select(&path), &path);
        }

        let kinds: Vec<_> = provider.created().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![DriverKind::Cgroupfs, DriverKind::Systemd]);
    }
}
