//! Core types shared by the codec, assembler and supervisors.
//!
//! - [`DeviceId`] names a peripheral
//! - [`Frame`] is one decoded sensor frame, [`HandshakeFrame`] the connect-time acknowledgment
//! - [`SequenceTracker`] holds the per-device expected sequence number
//! - [`ConnectionPhase`] and [`LinkStatus`] describe a link from the outside
//!
//! ## Usage Example
//!
//! ```rust
//! use sensorlink::types::{EmgFrame, Frame, SequenceTracker};
//!
//! let mut tracker = SequenceTracker::new();
//! let frame = Frame::Emg(EmgFrame { sequence: 0, value: 42, reserved: 0xF7 });
//!
//! assert!(tracker.matches(frame.sequence()));
//! tracker.advance(frame.sequence());
//! assert_eq!(tracker.current(), 1);
//! ```

mod device;
mod frame;
mod sequence;
mod status;

pub use device::DeviceId;
pub use frame::{EmgFrame, Frame, FrameKind, HandshakeFrame, MultiChannelFrame, TimestampFrame};
pub use sequence::SequenceTracker;
pub use status::{ConnectionPhase, LinkStatus};
