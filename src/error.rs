//! Error types for the link protocol engine.
//!
//! Every fault a peripheral link can raise is modelled here. Most of them are
//! recovered inside the device supervisor and only show up in logs and status
//! counters; the few that escape (configuration problems, fleet bookkeeping,
//! unreachable devices) are returned to the caller.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: the wireless link dropped or a write failed
//! - **Link Faults**: checksum mismatch, sequence desync, unknown frame tag
//! - **Handshake Errors**: the peripheral never confirmed sync
//! - **Fleet Errors**: duplicate or unknown devices, unreachable peripherals
//! - **Configuration Errors**: invalid or unreadable link configuration
//!
//! ## Recovery
//!
//! ```rust
//! use sensorlink::LinkError;
//!
//! let error = LinkError::SequenceDesync { expected: 1, received: 5 };
//! assert!(error.is_link_fault());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::DeviceId;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for link operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("Transport disconnected")]
    TransportDisconnected,

    #[error("Transport operation failed: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Checksum mismatch on frame {sequence}: expected {expected:#04x}, found {actual:#04x}")]
    ChecksumMismatch { sequence: u16, expected: u8, actual: u8 },

    #[error("Sequence desync: expected {expected}, received {received}")]
    SequenceDesync { expected: u16, received: u16 },

    #[error("Unrecognized frame tag {tag:#04x}")]
    UnrecognizedFrameTag { tag: u8 },

    #[error("Handshake not confirmed after {attempts} attempts")]
    HandshakeExhausted { attempts: u32 },

    #[error("Device {device} unreachable after {attempts} reconnect attempts")]
    Unreachable { device: DeviceId, attempts: u32 },

    #[error("Device {device} already has a running supervisor")]
    AlreadyRunning { device: DeviceId },

    #[error("Device {device} is not managed by this fleet")]
    UnknownDevice { device: DeviceId },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Config file error: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::TransportDisconnected => true,
            LinkError::Transport { .. } => true,
            LinkError::ChecksumMismatch { .. } => true,
            LinkError::SequenceDesync { .. } => true,
            LinkError::UnrecognizedFrameTag { .. } => true,
            LinkError::HandshakeExhausted { .. } => true,
            LinkError::Unreachable { .. } => false,
            LinkError::AlreadyRunning { .. } => false,
            LinkError::UnknownDevice { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::Io { .. } => false,
        }
    }

    /// Returns true for the framing faults that are recovered by the reset protocol.
    pub fn is_link_fault(&self) -> bool {
        matches!(
            self,
            LinkError::ChecksumMismatch { .. }
                | LinkError::SequenceDesync { .. }
                | LinkError::UnrecognizedFrameTag { .. }
        )
    }

    /// Returns true when the error means the transport link is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, LinkError::TransportDisconnected | LinkError::Transport { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::TransportDisconnected | LinkError::Transport { .. } => vec![
                "Check the peripheral is powered and in range",
                "Verify the host Bluetooth adapter is up",
                "Wait for the supervisor to reconnect",
            ],
            LinkError::ChecksumMismatch { .. } => vec![
                "Check for radio interference near the peripheral",
                "Verify the firmware uses the CRC-8/SMBUS profile",
            ],
            LinkError::SequenceDesync { .. } => vec![
                "Let the reset protocol re-handshake the device",
                "Check the firmware restarts its counter on RESET",
            ],
            LinkError::UnrecognizedFrameTag { .. } => vec![
                "Verify firmware and host agree on the frame layout",
                "Check for truncated notifications from the transport",
            ],
            LinkError::HandshakeExhausted { .. } => vec![
                "Power-cycle the peripheral",
                "Check the firmware answers HELLO with an ACK frame",
            ],
            LinkError::Unreachable { .. } => vec![
                "Power-cycle the peripheral",
                "Move the peripheral closer to the host",
                "Restart the device supervisor once the peripheral is back",
            ],
            LinkError::AlreadyRunning { .. } => {
                vec!["Stop the existing supervisor before starting a new one"]
            }
            LinkError::UnknownDevice { .. } => {
                vec!["Check the device address", "Start the device before stopping it"]
            }
            LinkError::Config { .. } => vec![
                "Check the configuration values are non-zero",
                "Check the YAML field names and types",
            ],
            LinkError::Io { .. } => vec!["Check the config file exists and is readable"],
        }
    }

    /// Helper constructor for transport failures.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        LinkError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for config file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        LinkError::Io { path, source }
    }
}
