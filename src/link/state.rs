//! Per-device protocol state

use tracing::trace;

use crate::assembler::{Drained, FrameAssembler};
use crate::codec::{self, ACK_MARKER, HANDSHAKE_LEN, TAG_OFFSET};
use crate::types::{ConnectionPhase, SequenceTracker};

/// The acknowledgment that confirmed the current handshake.
#[derive(Debug, Clone, Copy)]
struct ConfirmedAck {
    sequence: u16,
    verify_checksum: bool,
}

/// Protocol state of one device link.
///
/// Exactly one instance exists per device, owned by that device's supervisor
/// and never shared, so no lock guards it.
#[derive(Debug, Default)]
pub struct LinkState {
    phase: ConnectionPhase,
    tracker: SequenceTracker,
    handshake_confirmed: bool,
    reset_requested: bool,
    assembler: FrameAssembler,
    confirmed_ack: Option<ConfirmedAck>,
}

impl LinkState {
    /// Fresh state: disconnected, sequence 0, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Next expected sequence number.
    pub fn sequence(&self) -> u16 {
        self.tracker.current()
    }

    pub fn handshake_confirmed(&self) -> bool {
        self.handshake_confirmed
    }

    /// Set when a framing fault was detected; cleared only by a reset.
    pub fn reset_requested(&self) -> bool {
        self.reset_requested
    }

    /// Bytes waiting in the receive buffer.
    pub fn buffered(&self) -> &[u8] {
        self.assembler.buffered()
    }

    /// Append a chunk and drain every complete frame.
    ///
    /// A fault flags the link for reset and empties the receive buffer; frames
    /// decoded before the fault are still returned, in order. Repeats of the
    /// acknowledgment that confirmed the handshake are skipped.
    pub fn ingest(&mut self, chunk: &[u8]) -> Drained {
        self.assembler.feed(chunk);
        if self.skip_repeated_acks() {
            return Drained::default();
        }
        let drained = self.assembler.drain(&mut self.tracker);
        if drained.fault.is_some() {
            self.reset_requested = true;
            self.assembler.clear();
        }
        drained
    }

    /// Forget all protocol state: sequence 0, unconfirmed, no pending reset, empty buffer.
    pub fn clear(&mut self) {
        self.tracker.reset();
        self.handshake_confirmed = false;
        self.reset_requested = false;
        self.assembler.clear();
        self.confirmed_ack = None;
    }

    /// Drop repeats of the confirmed acknowledgment from the head of the buffer.
    ///
    /// The peripheral answers every HELLO, so replies to earlier HELLOs can
    /// arrive after sync. Returns true while a possible repeat is still
    /// incomplete and more bytes are needed to tell.
    fn skip_repeated_acks(&mut self) -> bool {
        let Some(ack) = self.confirmed_ack else {
            return false;
        };

        loop {
            let buffered = self.assembler.buffered();
            let Some(sequence) = codec::read_sequence(buffered) else {
                return false;
            };
            if sequence != ack.sequence || self.tracker.matches(sequence) {
                return false;
            }

            let Some(frame) = codec::decode_handshake(buffered) else {
                // Only wait while the marker is still missing or looks like an acknowledgment
                return buffered.get(TAG_OFFSET).is_none_or(|&marker| marker == ACK_MARKER);
            };
            if !frame.is_ack() || (ack.verify_checksum && !codec::handshake_checksum_ok(&frame)) {
                return false;
            }

            trace!(sequence, "Skipping repeated handshake acknowledgment");
            self.assembler.consume(HANDSHAKE_LEN);
        }
    }

    pub(crate) fn set_phase(&mut self, phase: ConnectionPhase) {
        self.phase = phase;
    }

    /// Append a chunk without draining, e.g. while waiting for a handshake acknowledgment.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.assembler.feed(chunk);
    }

    pub(crate) fn consume(&mut self, count: usize) {
        self.assembler.consume(count);
    }

    pub(crate) fn clear_buffer(&mut self) {
        self.assembler.clear();
    }

    pub(crate) fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    /// Adopt the handshake's sequence number and mark the link confirmed.
    pub(crate) fn confirm_handshake(&mut self, sequence: u16, verify_checksum: bool) {
        self.tracker.advance(sequence);
        self.handshake_confirmed = true;
        self.confirmed_ack = Some(ConfirmedAck { sequence, verify_checksum });
    }
}
