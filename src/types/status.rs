//! Link phase and status snapshots

use serde::{Deserialize, Serialize};

/// Connection phase of one device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionPhase {
    /// No transport connection
    #[default]
    Disconnected,
    /// Probing the peripheral with HELLO
    Handshaking,
    /// Handshake confirmed, listening for data frames
    Synced,
    /// A fault was detected, reset in progress
    ResetPending,
    /// Transport dropped, reconnect in progress
    Reconnecting,
    /// Reconnect attempts exhausted; the supervisor has exited
    Unreachable,
    /// Supervisor was stopped by its fleet
    Stopped,
}

impl ConnectionPhase {
    /// Whether the supervisor has left its run loop for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionPhase::Unreachable | ConnectionPhase::Stopped)
    }
}

/// Point-in-time view of one device link, published by its supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkStatus {
    pub phase: ConnectionPhase,
    /// Next expected sequence number
    pub sequence: u16,
    /// Frames the sink accepted
    pub frames_delivered: u64,
    /// Frames decoded but refused by the sink
    pub frames_dropped: u64,
    /// Checksum, desync and tag faults seen
    pub faults: u64,
    pub resets: u64,
    pub reconnects: u64,
}
