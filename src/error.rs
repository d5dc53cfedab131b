//! Error types for bfarm.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::device::boot::BootStage;

/// Fault kinds raised by post-expect error detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// `Kernel panic - not syncing` was observed on the console.
    KernelPanic,
    /// `Crashdump magic found` was observed on the console.
    Crashdump,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::KernelPanic => write!(f, "kernel panic"),
            FaultKind::Crashdump => write!(f, "crash dump"),
        }
    }
}

/// Main error type for bfarm operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing configuration, unknown station, bad env var.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport refused the connection or hit EOF during the handshake.
    #[error("Connection busy: {0}")]
    ConnectionBusy(String),

    /// A password prompt appeared on a transport with no credential path.
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// EOF on an established session.
    #[error("Connection lost")]
    ConnectionLost,

    /// No pattern matched before the timeout elapsed.
    #[error("No pattern matched within {0:?}")]
    ExpectTimeout(Duration),

    /// EOF was seen while waiting for a pattern (and no EOF sentinel supplied).
    #[error("EOF while waiting for pattern")]
    ExpectEof,

    /// `check_output` exceeded its window; CTRL-C was sent before surfacing.
    #[error("Command '{command}' did not complete within {timeout:?}")]
    CommandTimeout {
        command: String,
        timeout: Duration,
    },

    /// An error detector tripped. The session is closed for kernel panics.
    #[error("Fatal device fault: {0}")]
    FatalDeviceFault(FaultKind),

    /// The boot state machine failed to advance within a stage timeout.
    #[error("Boot stalled at stage '{0}'")]
    BootStalled(BootStage),

    /// All loader TFTP retries were exhausted.
    #[error("TFTP transfer of '{filename}' failed after {attempts} attempts")]
    TftpFailed {
        filename: String,
        attempts: usize,
    },

    /// HTML identification failed for every known power switch vendor.
    #[error("Could not identify power device at {address}")]
    UnknownPowerDevice { address: String },

    /// The lock service returned a resource that does not match the board type.
    #[error("Lock resource '{resource}' does not match board type '{board_type}'")]
    ResourceMismatch {
        resource: String,
        board_type: String,
    },

    /// Operation not implemented by this device subtype.
    #[error("Operation not supported by this device: {0}")]
    Unsupported(&'static str),

    /// Invalid expect/prompt regex.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Transport-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP error from the power identification or lock clients.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether this error is an expect-level timeout (retryable by policy).
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::ExpectTimeout(_) | Error::CommandTimeout { .. }
        )
    }
}

/// Result type alias using bfarm's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kind_display() {
        assert_eq!(FaultKind::KernelPanic.to_string(), "kernel panic");
        assert_eq!(FaultKind::Crashdump.to_string(), "crash dump");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::ExpectTimeout(Duration::from_secs(1)).is_timeout());
        assert!(
            Error::CommandTimeout {
                command: "ls".into(),
                timeout: Duration::from_secs(1),
            }
            .is_timeout()
        );
        assert!(!Error::ConnectionLost.is_timeout());
    }
}
