//! Receive buffer that reassembles frames from fragmented notifications.
//!
//! Notifications can split a frame anywhere or carry several frames at once.
//! [`FrameAssembler::feed`] appends raw bytes; [`FrameAssembler::try_extract`]
//! is called until it reports [`FrameResult::NeedMoreData`]. Extraction checks,
//! in order:
//!
//! 1. at least two bytes for the sequence number
//! 2. the sequence number equals the tracker's expected value
//! 3. the tag byte names a known frame type
//! 4. the whole frame has arrived
//! 5. the checksum matches
//!
//! A desync or unknown tag clears the buffer, since a desynced stream can't be
//! trusted byte by byte. A checksum failure leaves the buffer alone for the
//! caller to deal with. All three faults end in a link reset.

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::codec;
use crate::error::LinkError;
use crate::types::{Frame, SequenceTracker};

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameResult {
    /// A complete, in-sequence, checksum-valid frame was consumed.
    Decoded(Frame),
    /// Not enough bytes buffered yet.
    NeedMoreData,
    /// Leading sequence number did not match; buffer cleared.
    ResyncRequired { expected: u16, received: u16 },
    /// Unknown tag byte; buffer cleared.
    Corrupted { tag: u8 },
    /// Checksum byte did not match; buffer left untouched.
    ChecksumFailed { sequence: u16, expected: u8, actual: u8 },
}

impl FrameResult {
    /// The link fault this result represents, if any.
    pub fn fault(&self) -> Option<LinkError> {
        match *self {
            FrameResult::Decoded(_) | FrameResult::NeedMoreData => None,
            FrameResult::ResyncRequired { expected, received } => {
                Some(LinkError::SequenceDesync { expected, received })
            }
            FrameResult::Corrupted { tag } => Some(LinkError::UnrecognizedFrameTag { tag }),
            FrameResult::ChecksumFailed { sequence, expected, actual } => {
                Some(LinkError::ChecksumMismatch { sequence, expected, actual })
            }
        }
    }
}

/// Frames drained from the buffer, plus the fault that stopped draining (if any).
#[derive(Debug, Default)]
pub struct Drained {
    pub frames: Vec<Frame>,
    pub fault: Option<LinkError>,
}

/// Per-device receive buffer.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self { buffer: BytesMut::with_capacity(256) }
    }

    /// Append an inbound chunk.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Try to extract one frame. See the module docs for the check order.
    pub fn try_extract(&mut self, tracker: &mut SequenceTracker) -> FrameResult {
        let Some(received) = codec::read_sequence(&self.buffer) else {
            return FrameResult::NeedMoreData;
        };

        if !tracker.matches(received) {
            self.buffer.clear();
            return FrameResult::ResyncRequired { expected: tracker.current(), received };
        }

        let Some(&tag) = self.buffer.get(codec::TAG_OFFSET) else {
            return FrameResult::NeedMoreData;
        };

        let Some(kind) = codec::classify(&self.buffer) else {
            self.buffer.clear();
            return FrameResult::Corrupted { tag };
        };

        let length = codec::frame_length(kind);
        if self.buffer.len() < length {
            return FrameResult::NeedMoreData;
        }

        let window = &self.buffer[..length];
        let expected = codec::checksum(&window[..length - 1]);
        let actual = window[length - 1];
        if expected != actual {
            return FrameResult::ChecksumFailed { sequence: received, expected, actual };
        }

        let Some(frame) = codec::decode(window, kind) else {
            return FrameResult::NeedMoreData;
        };

        tracker.advance(received);
        self.buffer.advance(length);
        trace!(sequence = received, ?kind, remaining = self.buffer.len(), "Frame extracted");

        FrameResult::Decoded(frame)
    }

    /// Extract frames until more data is needed or a fault occurs.
    pub fn drain(&mut self, tracker: &mut SequenceTracker) -> Drained {
        let mut drained = Drained::default();
        loop {
            match self.try_extract(tracker) {
                FrameResult::Decoded(frame) => drained.frames.push(frame),
                FrameResult::NeedMoreData => break,
                fault => {
                    drained.fault = fault.fault();
                    break;
                }
            }
        }
        drained
    }

    /// Currently buffered bytes.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop `count` bytes from the front of the buffer.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.buffer.len());
        self.buffer.advance(count);
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{emg_bytes, frame_run, multichannel_bytes, timestamp_bytes};
    use crate::types::{EmgFrame, FrameKind};
    use proptest::prelude::*;

    fn tracker_at(sequence: u16) -> SequenceTracker {
        let mut tracker = SequenceTracker::new();
        if sequence > 0 {
            tracker.advance(sequence - 1);
        }
        tracker
    }

    #[test]
    fn decodes_emg_scenario() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = SequenceTracker::new();
        let mut bytes = vec![0x00, 0x00, 0x45, 0x2A, 0xF7];
        bytes.push(codec::checksum(&bytes));

        assembler.feed(&bytes);
        let result = assembler.try_extract(&mut tracker);

        assert_eq!(
            result,
            FrameResult::Decoded(Frame::Emg(EmgFrame { sequence: 0, value: 42, reserved: 0xF7 }))
        );
        assert_eq!(tracker.current(), 1);
        assert!(assembler.is_empty());
        assert_eq!(assembler.try_extract(&mut tracker), FrameResult::NeedMoreData);
    }

    #[test]
    fn fewer_than_two_bytes_needs_more() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = SequenceTracker::new();
        assert_eq!(assembler.try_extract(&mut tracker), FrameResult::NeedMoreData);
        assembler.feed(&[0x00]);
        assert_eq!(assembler.try_extract(&mut tracker), FrameResult::NeedMoreData);
        assert_eq!(assembler.len(), 1);
    }

    #[test]
    fn sequence_without_tag_needs_more() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = SequenceTracker::new();
        assembler.feed(&[0x00, 0x00]);
        assert_eq!(assembler.try_extract(&mut tracker), FrameResult::NeedMoreData);
        assert_eq!(assembler.len(), 2);
    }

    #[test]
    fn exact_length_buffer_is_complete() {
        for bytes in [emg_bytes(0, 1), multichannel_bytes(0, [1; 6]), timestamp_bytes(0, 5)] {
            let mut assembler = FrameAssembler::new();
            let mut tracker = SequenceTracker::new();
            let kind = codec::classify(&bytes).expect("known tag");
            assert_eq!(bytes.len(), codec::frame_length(kind));

            assembler.feed(&bytes[..bytes.len() - 1]);
            assert_eq!(assembler.try_extract(&mut tracker), FrameResult::NeedMoreData);

            assembler.feed(&bytes[bytes.len() - 1..]);
            assert!(matches!(assembler.try_extract(&mut tracker), FrameResult::Decoded(_)));
            assert!(assembler.is_empty());
        }
    }

    #[test]
    fn sequence_mismatch_clears_buffer() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = tracker_at(1);
        assembler.feed(&multichannel_bytes(5, [0; 6]));

        let result = assembler.try_extract(&mut tracker);
        assert_eq!(result, FrameResult::ResyncRequired { expected: 1, received: 5 });
        assert!(assembler.is_empty());
        assert_eq!(tracker.current(), 1);
        assert!(matches!(result.fault(), Some(LinkError::SequenceDesync { .. })));
    }

    #[test]
    fn unknown_tag_clears_buffer() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = SequenceTracker::new();
        assembler.feed(&[0x00, 0x00, b'Z', 1, 2, 3, 4, 5]);

        assert_eq!(assembler.try_extract(&mut tracker), FrameResult::Corrupted { tag: b'Z' });
        assert!(assembler.is_empty());
        assert_eq!(tracker.current(), 0);
    }

    #[test]
    fn checksum_failure_leaves_buffer() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = SequenceTracker::new();
        let mut bytes = timestamp_bytes(0, 1_700_000_000);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x5A;
        assembler.feed(&bytes);

        let result = assembler.try_extract(&mut tracker);
        assert!(matches!(result, FrameResult::ChecksumFailed { sequence: 0, .. }));
        assert_eq!(assembler.buffered(), bytes.as_slice());
        assert_eq!(tracker.current(), 0);
    }

    #[test]
    fn one_chunk_with_several_frames_drains_all() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = SequenceTracker::new();
        let mut chunk = Vec::new();
        chunk.extend(emg_bytes(0, 10));
        chunk.extend(multichannel_bytes(1, [1, 2, 3, 4, 5, 6]));
        chunk.extend(timestamp_bytes(2, 77));
        chunk.extend(&emg_bytes(3, 11)[..3]);
        assembler.feed(&chunk);

        let drained = assembler.drain(&mut tracker);
        assert!(drained.fault.is_none());
        let kinds: Vec<FrameKind> = drained.frames.iter().map(Frame::kind).collect();
        assert_eq!(kinds, vec![FrameKind::Emg, FrameKind::MultiChannel, FrameKind::Timestamp]);
        assert_eq!(tracker.current(), 3);
        assert_eq!(assembler.len(), 3);
    }

    #[test]
    fn drain_stops_at_fault_after_good_frames() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = SequenceTracker::new();
        let mut chunk = emg_bytes(0, 1);
        chunk.extend(emg_bytes(7, 2));
        assembler.feed(&chunk);

        let drained = assembler.drain(&mut tracker);
        assert_eq!(drained.frames.len(), 1);
        assert!(matches!(
            drained.fault,
            Some(LinkError::SequenceDesync { expected: 1, received: 7 })
        ));
        assert!(assembler.is_empty());
    }

    #[test]
    fn sequence_wraps_through_zero() {
        let mut assembler = FrameAssembler::new();
        let mut tracker = tracker_at(u16::MAX);
        let mut chunk = emg_bytes(u16::MAX, 1);
        chunk.extend(emg_bytes(0, 2));
        assembler.feed(&chunk);

        let drained = assembler.drain(&mut tracker);
        assert_eq!(drained.frames.len(), 2);
        assert_eq!(tracker.current(), 1);
    }

    #[test]
    fn consume_is_bounded() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(&[1, 2, 3]);
        assembler.consume(2);
        assert_eq!(assembler.buffered(), &[3]);
        assembler.consume(10);
        assert!(assembler.is_empty());
    }

    proptest! {
        #[test]
        fn fragmentation_never_loses_or_duplicates(
            count in 1usize..12,
            cuts in prop::collection::vec(1usize..16, 0..40),
        ) {
            let stream = frame_run(0, count);
            let mut assembler = FrameAssembler::new();
            let mut tracker = SequenceTracker::new();
            let mut frames = Vec::new();

            let mut offset = 0;
            for cut in cuts.iter().copied().chain(std::iter::repeat(stream.len())) {
                if offset >= stream.len() {
                    break;
                }
                let end = (offset + cut).min(stream.len());
                assembler.feed(&stream[offset..end]);
                let drained = assembler.drain(&mut tracker);
                prop_assert!(drained.fault.is_none());
                frames.extend(drained.frames);
                offset = end;
            }

            prop_assert_eq!(frames.len(), count);
            for (index, frame) in frames.iter().enumerate() {
                prop_assert_eq!(frame.sequence() as usize, index);
            }
            prop_assert!(assembler.is_empty());
        }

        #[test]
        fn corrupted_checksum_never_advances(
            sequence in any::<u16>(),
            epoch in any::<u32>(),
            flip in 1u8..=255,
        ) {
            let mut bytes = timestamp_bytes(sequence, epoch);
            let last = bytes.len() - 1;
            bytes[last] ^= flip;

            let mut assembler = FrameAssembler::new();
            let mut tracker = tracker_at(sequence);
            let before = tracker.current();
            assembler.feed(&bytes);

            let result = assembler.try_extract(&mut tracker);
            let is_checksum_failure = matches!(result, FrameResult::ChecksumFailed { .. });
            prop_assert!(is_checksum_failure);
            prop_assert_eq!(tracker.current(), before);
        }
    }
}
