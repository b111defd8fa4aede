//! Connect-time handshake with the peripheral.
//!
//! The host sends HELLO until the peripheral answers with a 4-byte
//! acknowledgment carrying the expected sequence number, then confirms with
//! ACK. A peripheral that ignores too many HELLOs is assumed to be stuck in an
//! inconsistent firmware state and gets a forced reset before probing resumes.

use tracing::{debug, info, trace, warn};

use crate::codec::{self, Command, HANDSHAKE_LEN};
use crate::transport::Transport;
use crate::types::ConnectionPhase;
use crate::{LinkError, Result};

use super::context::LinkContext;
use super::reset::ResetCoordinator;
use super::state::LinkState;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Idle,
    Probing,
    Confirmed,
}

/// Result of inspecting the receive buffer for an acknowledgment.
#[derive(Debug)]
pub enum HandshakeReply {
    /// Valid acknowledgment; the tracker now expects `sequence + 1`.
    Confirmed(u16),
    /// Fewer than four bytes buffered.
    Pending,
    /// Buffered bytes were not a valid acknowledgment and were discarded.
    Rejected(LinkError),
}

/// Drives the HELLO / acknowledgment / ACK exchange for one device.
#[derive(Debug, Default)]
pub struct HandshakeController {
    state: HandshakeState,
    attempts: u32,
}

impl HandshakeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Unanswered HELLOs since the last confirmation or forced reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Back to `Idle` with no attempts counted, as after any link reset.
    pub fn reset(&mut self) {
        self.state = HandshakeState::Idle;
        self.attempts = 0;
    }

    /// Look for an acknowledgment at the front of the receive buffer.
    ///
    /// On success the four acknowledgment bytes are consumed (anything after
    /// them stays buffered for the listener) and the state adopts the
    /// peripheral's sequence number.
    pub fn inspect(state: &mut LinkState, verify_checksum: bool) -> HandshakeReply {
        let Some(frame) = codec::decode_handshake(state.buffered()) else {
            return HandshakeReply::Pending;
        };

        let rejection = if !frame.is_ack() {
            Some(LinkError::UnrecognizedFrameTag { tag: frame.marker })
        } else if verify_checksum && !codec::handshake_checksum_ok(&frame) {
            let [hi, lo] = frame.sequence.to_be_bytes();
            Some(LinkError::ChecksumMismatch {
                sequence: frame.sequence,
                expected: codec::checksum(&[hi, lo, frame.marker]),
                actual: frame.trailing,
            })
        } else if !state.tracker().matches(frame.sequence) {
            Some(LinkError::SequenceDesync {
                expected: state.tracker().current(),
                received: frame.sequence,
            })
        } else {
            None
        };

        if let Some(error) = rejection {
            state.clear_buffer();
            return HandshakeReply::Rejected(error);
        }

        state.consume(HANDSHAKE_LEN);
        state.confirm_handshake(frame.sequence, verify_checksum);
        HandshakeReply::Confirmed(frame.sequence)
    }

    /// Send HELLO until the peripheral confirms sync.
    ///
    /// Only returns early on a transport error (or when the forced reset finds
    /// the device unreachable); cancellation is handled by the caller dropping
    /// this future.
    pub(crate) async fn begin<T: Transport>(&mut self, link: &mut LinkContext<T>) -> Result<()> {
        self.state = HandshakeState::Probing;
        self.attempts = 0;
        link.set_phase(ConnectionPhase::Handshaking);
        let timeout = link.config.handshake_timeout();
        let max_attempts = link.config.max_handshake_attempts;

        loop {
            link.send(Command::Hello).await?;
            trace!(attempt = self.attempts + 1, "HELLO sent");

            if let Some(chunk) = link.wait_notification(timeout).await? {
                link.state.feed(&chunk);
                match Self::inspect(&mut link.state, link.config.verify_handshake_checksum) {
                    HandshakeReply::Confirmed(sequence) => {
                        self.state = HandshakeState::Confirmed;
                        link.send(Command::Ack).await?;
                        link.publish();
                        info!(sequence, attempts = self.attempts + 1, "Handshake confirmed");
                        return Ok(());
                    }
                    HandshakeReply::Pending => trace!("Partial acknowledgment buffered"),
                    HandshakeReply::Rejected(error) => debug!(%error, "Acknowledgment rejected"),
                }
            }

            self.attempts += 1;
            if self.attempts >= max_attempts {
                let error = LinkError::HandshakeExhausted { attempts: self.attempts };
                warn!(%error, "Forcing reset");
                ResetCoordinator::reset(link, self).await?;
                self.state = HandshakeState::Probing;
                link.set_phase(ConnectionPhase::Handshaking);
            }
        }
    }
}
