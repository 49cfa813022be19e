//! Messages exchanged between the caller and its setup processes

use serde::{Deserialize, Serialize};
use std::fmt;
use tandem_core::{Error, Result};
use tandem_namespace::NamespaceKind;

/// Size of one frame on a setup pipe
///
/// Every message is sent as one frame of JSON padded with spaces. The frames
/// fit on the stack and stay below `PIPE_BUF`, so forked children neither
/// allocate nor see partial writes.
pub const MESSAGE_LEN: usize = 64;

/// The setup step a child process was performing when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupStep {
    /// Joining a shared namespace
    Join(NamespaceKind),
    /// Creating private namespaces
    Unshare,
    /// Waiting for the id mappings
    Mapping,
    /// Forking the init process
    Fork,
    /// Setting the hostname
    Hostname,
    /// Entering the root filesystem
    Rootfs,
    /// Changing to the working directory
    Chdir,
    /// Wiring standard streams
    Stdio,
    /// Executing the program
    Exec,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join(kind) => write!(f, "join {kind} namespace"),
            Self::Unshare => write!(f, "unshare namespaces"),
            Self::Mapping => write!(f, "wait for id mappings"),
            Self::Fork => write!(f, "fork init process"),
            Self::Hostname => write!(f, "set hostname"),
            Self::Rootfs => write!(f, "enter root filesystem"),
            Self::Chdir => write!(f, "change working directory"),
            Self::Stdio => write!(f, "wire standard streams"),
            Self::Exec => write!(f, "exec"),
        }
    }
}

/// Wrapper for the messages sent over the setup pipes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// The intermediate process asks the caller to write its id mappings
    MappingRequest,
    /// The caller has written the id mappings
    MappingWritten,
    /// The intermediate process forked init (host pid)
    InitPid(i32),
    /// The caller released init to exec
    Start,
    /// A setup step failed with the given errno
    Failed(SetupStep, i32),
}

impl Message {
    /// Serialize into one frame
    ///
    /// # Errors
    /// Returns [`Error::Namespace`] if the message does not fit a frame.
    pub fn encode(self) -> Result<[u8; MESSAGE_LEN]> {
        let mut frame = [b' '; MESSAGE_LEN];
        serde_json::to_writer(&mut frame[..], &self)
            .map_err(|e| Error::namespace(format!("Failed to encode {self}: {e}")))?;
        Ok(frame)
    }

    /// Parse a frame read off a pipe
    ///
    /// # Errors
    /// Returns [`Error::Namespace`] if the frame holds no known message.
    pub fn decode(frame: &[u8; MESSAGE_LEN]) -> Result<Self> {
        serde_json::from_slice(frame)
            .map_err(|e| Error::namespace(format!("Malformed setup message: {e}")))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MappingRequest => write!(f, "MappingRequest"),
            Self::MappingWritten => write!(f, "MappingWritten"),
            Self::InitPid(pid) => write!(f, "InitPid({pid})"),
            Self::Start => write!(f, "Start"),
            Self::Failed(step, errno) => write!(f, "Failed({step}, {errno})"),
        }
    }
}
