//! Frame codec: pure functions over byte windows.
//!
//! No state and no I/O. The assembler and handshake build on these to turn a
//! notification stream into [`Frame`](crate::types::Frame) values.

mod crc;
mod wire;

pub use crc::{Crc8Params, FIRMWARE_CRC8, crc8, crc8_parameterised};
pub use wire::{
    ACK_MARKER, Command, EMG_TAG, HANDSHAKE_LEN, MULTI_CHANNEL_TAG, SEQUENCE_LEN, TAG_OFFSET,
    TIMESTAMP_TAG, checksum, classify, decode, decode_handshake, encode, encode_handshake,
    frame_length, handshake_checksum_ok, read_sequence, tag, verify,
};
