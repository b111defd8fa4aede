//! Test utilities for building wire frames
//!
//! Shared by unit tests and benchmarks so both exercise byte streams laid out
//! exactly as the peripheral firmware sends them.

#![cfg(any(test, feature = "benchmark"))]

use crate::types::{EmgFrame, Frame, MultiChannelFrame, TimestampFrame};

/// Wire bytes of an EMG frame with a zero reserved byte.
pub fn emg_bytes(sequence: u16, value: i8) -> Vec<u8> {
    Frame::Emg(EmgFrame { sequence, value, reserved: 0 }).encode()
}

/// Wire bytes of a six-channel frame.
pub fn multichannel_bytes(sequence: u16, channels: [i16; 6]) -> Vec<u8> {
    Frame::MultiChannel(MultiChannelFrame { sequence, channels }).encode()
}

/// Wire bytes of a timestamp frame.
pub fn timestamp_bytes(sequence: u16, epoch: u32) -> Vec<u8> {
    Frame::Timestamp(TimestampFrame { sequence, epoch }).encode()
}

/// A contiguous run of `count` frames starting at `first`, cycling through all frame types.
pub fn frame_run(first: u16, count: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for index in 0..count {
        let sequence = first.wrapping_add(index as u16);
        let bytes = match index % 3 {
            0 => emg_bytes(sequence, (index % 100) as i8),
            1 => multichannel_bytes(sequence, [index as i16, -(index as i16), 3, 4, 5, 6]),
            _ => timestamp_bytes(sequence, 1_700_000_000 + index as u32),
        };
        stream.extend(bytes);
    }
    stream
}
