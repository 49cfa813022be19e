//! Error types for Tandem

use thiserror::Error;

/// Tandem error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsupported container configuration
    #[error("Invalid configuration: {message}")]
    ConfigInvalid {
        /// Error message
        message: String,
    },

    /// A live container already uses this name
    #[error("Container name already in use: {name}")]
    DuplicateName {
        /// Conflicting name
        name: String,
    },

    /// A shared namespace could not be opened or joined
    #[error("Failed to join {namespace} namespace at {path}: {message}")]
    NamespaceJoinFailed {
        /// Namespace kind
        namespace: String,
        /// Path that was requested
        path: String,
        /// Error message
        message: String,
    },

    /// The container's previous process has not exited yet
    #[error("Container {id} is already running a process")]
    AlreadyRunning {
        /// Container ID
        id: String,
    },

    /// The container has never run a process
    #[error("Container {id} is not running")]
    NotRunning {
        /// Container ID
        id: String,
    },

    /// The container has been destroyed
    #[error("Container {id} has been destroyed")]
    ContainerDestroyed {
        /// Container ID
        id: String,
    },

    /// Waiting for a process failed
    #[error("Wait failed: {message}")]
    WaitFailed {
        /// Error message
        message: String,
    },

    /// `CGroup` operation failed
    #[error("CGroup error: {message}")]
    CGroup {
        /// Error message
        message: String,
    },

    /// Namespace operation failed
    #[error("Namespace error: {message}")]
    Namespace {
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),

    /// Channel send error
    #[error("Channel send error")]
    ChannelSend,

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Error {
    /// Shorthand for [`Error::ConfigInvalid`]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Namespace`]
    pub fn namespace(message: impl Into<String>) -> Self {
        Self::Namespace {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::CGroup`]
    pub fn cgroup(message: impl Into<String>) -> Self {
        Self::CGroup {
            message: message.into(),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::ChannelSend
    }
}

/// Result type alias for Tandem operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NamespaceJoinFailed {
            namespace: "net".to_string(),
            path: "/proc/42/ns/net".to_string(),
            message: "No such file or directory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to join net namespace at /proc/42/ns/net: No such file or directory"
        );

        let err = Error::config("mount namespace cannot be shared");
        assert!(err.to_string().starts_with("Invalid configuration"));
    }

    #[test]
    fn test_from_nix() {
        let err: Error = nix::Error::ECHILD.into();
        assert!(matches!(err, Error::System(nix::Error::ECHILD)));
    }
}
