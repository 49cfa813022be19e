//! Container lifecycle events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::{ContainerId, ProcessId};

/// Events emitted during container lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContainerEvent {
    /// Container created by a factory
    Created {
        /// Container ID
        id: ContainerId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Init process launched
    Started {
        /// Container ID
        id: ContainerId,
        /// Host PID of the init process
        init_pid: ProcessId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Init process exit observed
    Exited {
        /// Container ID
        id: ContainerId,
        /// Exit code (negative signal number when signaled)
        exit_code: i32,
        /// Terminating signal, if any
        signal: Option<i32>,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Container destroyed
    Destroyed {
        /// Container ID
        id: ContainerId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Error occurred
    Error {
        /// Container ID
        id: ContainerId,
        /// Error message
        message: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },
}

impl ContainerEvent {
    /// Get the container ID from any event
    #[must_use]
    pub const fn container_id(&self) -> &ContainerId {
        match self {
            Self::Created { id, .. }
            | Self::Started { id, .. }
            | Self::Exited { id, .. }
            | Self::Destroyed { id, .. }
            | Self::Error { id, .. } => id,
        }
    }

    /// Get the timestamp from any event
    #[must_use]
    pub const fn timestamp(&self) -> SystemTime {
        match self {
            Self::Created { timestamp, .. }
            | Self::Started { timestamp, .. }
            | Self::Exited { timestamp, .. }
            | Self::Destroyed { timestamp, .. }
            | Self::Error { timestamp, .. } => *timestamp,
        }
    }

    /// Check if this is a critical event
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Created { id, .. } => {
                tracing::info!(container_id = %id, event = "created", "Container created");
            }
            Self::Started { id, init_pid, .. } => {
                tracing::info!(
                    container_id = %id,
                    init_pid = init_pid.as_raw(),
                    event = "started",
                    "Container started"
                );
            }
            Self::Exited {
                id,
                exit_code,
                signal,
                ..
            } => {
                tracing::info!(
                    container_id = %id,
                    exit_code,
                    signal = ?signal,
                    event = "exited",
                    "Container process exited"
                );
            }
            Self::Destroyed { id, .. } => {
                tracing::info!(container_id = %id, event = "destroyed", "Container destroyed");
            }
            Self::Error { id, message, .. } => {
                tracing::error!(
                    container_id = %id,
                    message = %message,
                    event = "error",
                    "Container error"
                );
            }
        }
    }
}

impl fmt::Display for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { id, .. } => write!(f, "Container {id} created"),
            Self::Started { id, init_pid, .. } => {
                write!(f, "Container {id} started (init pid {init_pid})")
            }
            Self::Exited {
                id,
                exit_code,
                signal: Some(signal),
                ..
            } => write!(f, "Container {id} killed by signal {signal} ({exit_code})"),
            Self::Exited { id, exit_code, .. } => {
                write!(f, "Container {id} exited with code {exit_code}")
            }
            Self::Destroyed { id, .. } => write!(f, "Container {id} destroyed"),
            Self::Error { id, message, .. } => write!(f, "Container {id} error: {message}"),
        }
    }
}

// Custom SystemTime serialization
mod systemtime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(since_epoch.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_container_id() {
        let id = ContainerId::new("test").unwrap();
        let event = ContainerEvent::Created {
            id: id.clone(),
            timestamp: SystemTime::now(),
        };

        assert_eq!(event.container_id(), &id);
    }

    #[test]
    fn test_event_critical() {
        let id = ContainerId::new("test").unwrap();

        let event = ContainerEvent::Error {
            id: id.clone(),
            message: "test".to_string(),
            timestamp: SystemTime::now(),
        };
        assert!(event.is_critical());

        let event = ContainerEvent::Destroyed {
            id,
            timestamp: SystemTime::now(),
        };
        assert!(!event.is_critical());
    }

    #[test]
    fn test_exited_display() {
        let id = ContainerId::new("ct").unwrap();
        let normal = ContainerEvent::Exited {
            id: id.clone(),
            exit_code: 3,
            signal: None,
            timestamp: SystemTime::now(),
        };
        assert_eq!(normal.to_string(), "Container ct exited with code 3");

        let killed = ContainerEvent::Exited {
            id,
            exit_code: -9,
            signal: Some(9),
            timestamp: SystemTime::now(),
        };
        assert_eq!(killed.to_string(), "Container ct killed by signal 9 (-9)");
    }

    #[test]
    fn test_event_serde() {
        let id = ContainerId::new("test").unwrap();
        let event = ContainerEvent::Started {
            id,
            init_pid: ProcessId::from_raw(42),
            timestamp: SystemTime::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"started\""));

        let deserialized: ContainerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.container_id(), deserialized.container_id());
    }
}
