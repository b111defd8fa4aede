//! Decoded sensor frame types

use serde::{Deserialize, Serialize};

/// Frame type, identified by the tag byte at offset 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// Single EMG sample (`'E'`)
    Emg,
    /// Six-channel sample (`'D'`)
    MultiChannel,
    /// Peripheral clock reading (`'T'`)
    Timestamp,
}

impl FrameKind {
    /// All frame kinds, in tag order of the wire table.
    pub const ALL: [FrameKind; 3] = [FrameKind::Emg, FrameKind::MultiChannel, FrameKind::Timestamp];
}

/// Single EMG sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmgFrame {
    pub sequence: u16,
    pub value: i8,
    /// Firmware-reserved byte between the value and the checksum.
    pub reserved: u8,
}

/// Six signed channel values sampled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiChannelFrame {
    pub sequence: u16,
    pub channels: [i16; 6],
}

/// Peripheral epoch reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampFrame {
    pub sequence: u16,
    pub epoch: u32,
}

/// One complete, checksum-verified, sequence-numbered unit of sensor data.
///
/// Frames are immutable once decoded and are handed to the sink exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Emg(EmgFrame),
    MultiChannel(MultiChannelFrame),
    Timestamp(TimestampFrame),
}

impl Frame {
    /// Sequence number carried by the frame.
    pub fn sequence(&self) -> u16 {
        match self {
            Frame::Emg(f) => f.sequence,
            Frame::MultiChannel(f) => f.sequence,
            Frame::Timestamp(f) => f.sequence,
        }
    }

    /// Frame type.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Emg(_) => FrameKind::Emg,
            Frame::MultiChannel(_) => FrameKind::MultiChannel,
            Frame::Timestamp(_) => FrameKind::Timestamp,
        }
    }

    /// Serialize to the wire layout, checksum included.
    pub fn encode(&self) -> Vec<u8> {
        crate::codec::encode(self)
    }
}

/// Handshake acknowledgment sent by the peripheral in answer to HELLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeFrame {
    pub sequence: u16,
    pub marker: u8,
    pub trailing: u8,
}

impl HandshakeFrame {
    /// Whether the marker byte identifies an acknowledgment.
    pub fn is_ack(&self) -> bool {
        self.marker == crate::codec::ACK_MARKER
    }
}
