//! Waiting for container processes

use nix::errno::Errno;
use nix::sys::wait::waitpid;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use tandem_core::{ContainerEvent, Error, Result};
use tokio::sync::oneshot;

use crate::process::{ExitResult, Process};

/// Waits for launched processes and reports how they ended
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSupervisor;

impl ProcessSupervisor {
    /// Block until the process exits
    ///
    /// The result is published to the owning container, which then reports
    /// itself stopped, and an `Exited` event is emitted.
    ///
    /// # Errors
    /// Returns [`Error::WaitFailed`] if the process was never started or the
    /// wait fails (for example because it was already waited for).
    pub fn wait(process: &Process) -> Result<ExitResult> {
        let launched = process.launched().ok_or_else(|| Error::WaitFailed {
            message: "process was never started".to_string(),
        })?;
        launched.claimed.store(true, Ordering::SeqCst);

        let status = loop {
            match waitpid(launched.intermediate, None) {
                Ok(status) => {
                    if let Some(result) = ExitResult::from_wait_status(status) {
                        break result;
                    }
                }
                Err(Errno::EINTR) => {}
                Err(errno) => {
                    return Err(Error::WaitFailed {
                        message: format!("waiting for pid {}: {errno}", launched.init),
                    });
                }
            }
        };

        tracing::debug!(
            container_id = %launched.container_id,
            init_pid = launched.init.as_raw(),
            result = %status,
            "Process finished"
        );

        launched.exit_tx.send_replace(Some(status));
        launched.events.emit(ContainerEvent::Exited {
            id: launched.container_id.clone(),
            exit_code: status.exit_code(),
            signal: status.signal().map(|signal| signal as i32),
            timestamp: SystemTime::now(),
        });

        Ok(status)
    }

    /// Wait for the process on a dedicated blocking thread
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(process: Process) -> ExitHandle {
        let (tx, rx) = oneshot::channel();
        if let Some(launched) = process.launched() {
            launched.claimed.store(true, Ordering::SeqCst);
        }

        tokio::task::spawn_blocking(move || {
            let _ = tx.send(Self::wait(&process));
        });

        ExitHandle { rx }
    }
}

/// Pending exit result of a spawned wait
#[derive(Debug)]
pub struct ExitHandle {
    rx: oneshot::Receiver<Result<ExitResult>>,
}

impl ExitHandle {
    /// Wait for the process to exit
    ///
    /// # Errors
    /// Returns the wait error, or [`Error::WaitFailed`] if the waiting thread
    /// went away without a result.
    pub async fn wait(self) -> Result<ExitResult> {
        self.rx.await.map_err(|_| Error::WaitFailed {
            message: "waiting thread ended without a result".to_string(),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_before_run_fails() {
        let process = Process::new(["true"]);
        let err = ProcessSupervisor::wait(&process).unwrap_err();
        assert!(matches!(err, Error::WaitFailed { .. }));
    }

    #[tokio::test]
    async fn test_spawned_wait_before_run_fails() {
        let handle = ProcessSupervisor::spawn(Process::new(["true"]));
        assert!(matches!(
            handle.wait().await,
            Err(Error::WaitFailed { .. })
        ));
    }
}
