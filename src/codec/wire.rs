//! Wire layout of peripheral frames.
//!
//! All multi-byte fields are big-endian. Every frame starts with its 2-byte
//! sequence number and ends with a CRC-8 over everything before it.
//!
//! ```text
//! Handshake ACK  (4)  seq:u16 'A' crc
//! EMG            (6)  seq:u16 'E' value:i8 reserved:u8 crc
//! MultiChannel  (16)  seq:u16 'D' 6 x i16 crc
//! Timestamp      (8)  seq:u16 'T' epoch:u32 crc
//! ```

use crate::types::{
    EmgFrame, Frame, FrameKind, HandshakeFrame, MultiChannelFrame, TimestampFrame,
};

use super::crc::crc8;

/// Length of the leading sequence number.
pub const SEQUENCE_LEN: usize = 2;

/// Offset of the frame type tag.
pub const TAG_OFFSET: usize = 2;

/// Total length of a handshake acknowledgment.
pub const HANDSHAKE_LEN: usize = 4;

pub const EMG_TAG: u8 = b'E';
pub const MULTI_CHANNEL_TAG: u8 = b'D';
pub const TIMESTAMP_TAG: u8 = b'T';

/// Marker byte of a handshake acknowledgment.
pub const ACK_MARKER: u8 = b'A';

/// Single-byte commands written to the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Handshake request
    Hello,
    /// Confirms the peripheral's acknowledgment
    Ack,
    /// Asks the firmware to restart its protocol state
    Reset,
}

impl Command {
    /// ASCII byte sent on the wire.
    pub const fn byte(self) -> u8 {
        match self {
            Command::Hello => b'H',
            Command::Ack => b'A',
            Command::Reset => b'R',
        }
    }

    /// Parse a command byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'H' => Some(Command::Hello),
            b'A' => Some(Command::Ack),
            b'R' => Some(Command::Reset),
            _ => None,
        }
    }
}

/// Read the leading sequence number, if at least two bytes are present.
pub fn read_sequence(window: &[u8]) -> Option<u16> {
    match window {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Identify the frame type from the tag byte at offset 2.
///
/// Returns `None` for an unknown tag or a window too short to hold one.
pub fn classify(window: &[u8]) -> Option<FrameKind> {
    match window.get(TAG_OFFSET)? {
        &EMG_TAG => Some(FrameKind::Emg),
        &MULTI_CHANNEL_TAG => Some(FrameKind::MultiChannel),
        &TIMESTAMP_TAG => Some(FrameKind::Timestamp),
        _ => None,
    }
}

/// Tag byte of a frame kind.
pub const fn tag(kind: FrameKind) -> u8 {
    match kind {
        FrameKind::Emg => EMG_TAG,
        FrameKind::MultiChannel => MULTI_CHANNEL_TAG,
        FrameKind::Timestamp => TIMESTAMP_TAG,
    }
}

/// Total frame length including sequence number and checksum.
pub const fn frame_length(kind: FrameKind) -> usize {
    match kind {
        FrameKind::Emg => 6,
        FrameKind::MultiChannel => 16,
        FrameKind::Timestamp => 8,
    }
}

/// Checksum over the bytes preceding the checksum byte.
pub fn checksum(data: &[u8]) -> u8 {
    crc8(data)
}

/// Verify that the last byte of `window` is the checksum of the rest.
pub fn verify(window: &[u8]) -> bool {
    match window.split_last() {
        Some((&received, body)) => checksum(body) == received,
        None => false,
    }
}

/// Decode a frame of `kind` from the start of `window`.
///
/// Only unpacks fields; the checksum must be checked separately with [`verify`].
/// Returns `None` if `window` is shorter than the frame.
pub fn decode(window: &[u8], kind: FrameKind) -> Option<Frame> {
    let frame = window.get(..frame_length(kind))?;
    let sequence = read_sequence(frame)?;
    let body = &frame[TAG_OFFSET + 1..frame.len() - 1];

    let decoded = match kind {
        FrameKind::Emg => Frame::Emg(EmgFrame {
            sequence,
            value: i8::from_be_bytes([body[0]]),
            reserved: body[1],
        }),
        FrameKind::MultiChannel => {
            let mut channels = [0i16; 6];
            for (channel, pair) in channels.iter_mut().zip(body.chunks_exact(2)) {
                *channel = i16::from_be_bytes([pair[0], pair[1]]);
            }
            Frame::MultiChannel(MultiChannelFrame { sequence, channels })
        }
        FrameKind::Timestamp => Frame::Timestamp(TimestampFrame {
            sequence,
            epoch: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
        }),
    };

    Some(decoded)
}

/// Encode a frame to its wire layout, appending the checksum.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let kind = frame.kind();
    let mut out = Vec::with_capacity(frame_length(kind));
    out.extend_from_slice(&frame.sequence().to_be_bytes());
    out.push(tag(kind));

    match frame {
        Frame::Emg(f) => {
            out.extend_from_slice(&f.value.to_be_bytes());
            out.push(f.reserved);
        }
        Frame::MultiChannel(f) => {
            for channel in f.channels {
                out.extend_from_slice(&channel.to_be_bytes());
            }
        }
        Frame::Timestamp(f) => out.extend_from_slice(&f.epoch.to_be_bytes()),
    }

    out.push(checksum(&out));
    out
}

/// Decode a handshake acknowledgment from the start of `window`.
pub fn decode_handshake(window: &[u8]) -> Option<HandshakeFrame> {
    match window {
        [hi, lo, marker, trailing, ..] => Some(HandshakeFrame {
            sequence: u16::from_be_bytes([*hi, *lo]),
            marker: *marker,
            trailing: *trailing,
        }),
        _ => None,
    }
}

/// Whether the trailing byte of a handshake frame is the CRC-8 of its first three bytes.
pub fn handshake_checksum_ok(frame: &HandshakeFrame) -> bool {
    let [hi, lo] = frame.sequence.to_be_bytes();
    checksum(&[hi, lo, frame.marker]) == frame.trailing
}

/// Encode a handshake acknowledgment the way the firmware sends it.
pub fn encode_handshake(sequence: u16) -> [u8; HANDSHAKE_LEN] {
    let [hi, lo] = sequence.to_be_bytes();
    [hi, lo, ACK_MARKER, checksum(&[hi, lo, ACK_MARKER])]
}
