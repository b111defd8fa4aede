//! Per-device sequence number tracking

/// Monotonic, wrapping sequence counter shared by handshake and data validation.
///
/// Matching is exact: there is no acceptance window, so any mismatch is a
/// desync. Advancing adopts the peer's numbering (`received + 1`) rather than
/// incrementing the local value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    current: u16,
}

impl SequenceTracker {
    /// Create a tracker starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence number the next frame must carry.
    pub fn current(&self) -> u16 {
        self.current
    }

    /// Whether `received` is exactly the expected sequence number.
    pub fn matches(&self, received: u16) -> bool {
        self.current == received
    }

    /// Move past `received`: the next expected number becomes `received + 1` (mod 2^16).
    pub fn advance(&mut self, received: u16) {
        self.current = received.wrapping_add(1);
    }

    /// Back to 0.
    pub fn reset(&mut self) {
        self.current = 0;
    }
}
