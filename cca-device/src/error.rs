//! Error types for device communication.

use thiserror::Error;

/// Errors that can occur while talking to a cast receiver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The TLS connection to the receiver is down (being re-established)
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// No media controller is registered on the receiver yet
    #[error("Media controller unavailable: {0}")]
    ControllerUnavailable(String),

    /// The receiver did not answer in time
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Opening the connection failed
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    /// The receiver rejected or failed a command
    #[error("{command} failed: {reason}")]
    Command { command: &'static str, reason: String },

    /// The handle's worker thread has gone away
    #[error("Device handle is closed")]
    Closed,
}

impl DeviceError {
    /// Whether the error is expected to clear up by itself.
    ///
    /// Status polling treats transient errors as a retry, and only gives up
    /// on the device after they persist for a while.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeviceError::NotConnected(_)
                | DeviceError::ControllerUnavailable(_)
                | DeviceError::Timeout(_)
        )
    }

    pub(crate) fn command(command: &'static str, err: impl std::fmt::Display) -> Self {
        DeviceError::Command {
            command,
            reason: err.to_string(),
        }
    }
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(DeviceError::NotConnected("den".into()).is_transient());
        assert!(DeviceError::ControllerUnavailable("no app".into()).is_transient());
        assert!(DeviceError::Timeout("status".into()).is_transient());

        assert!(!DeviceError::Closed.is_transient());
        assert!(!DeviceError::command("pause", "invalid session").is_transient());
        assert!(!DeviceError::Connect {
            host: "10.0.0.2".into(),
            port: 8009,
            reason: "refused".into()
        }
        .is_transient());
    }

    #[test]
    fn test_command_error_display() {
        let err = DeviceError::command("load", "LOAD_FAILED");
        assert_eq!(err.to_string(), "load failed: LOAD_FAILED");
    }
}
