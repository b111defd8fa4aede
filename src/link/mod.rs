//! Link protocol engine for a single device.
//!
//! - [`LinkState`] is the exclusively owned per-device protocol state
//! - [`HandshakeController`] establishes the sequence baseline
//! - the reset coordinator clears state and reconnects after any fault
//! - [`LinkSupervisor`] sequences all of it and runs until stopped

mod context;
mod handshake;
mod reset;
mod state;
mod supervisor;

pub use handshake::{HandshakeController, HandshakeState, HandshakeReply};
pub use state::LinkState;
pub use supervisor::{LinkSupervisor, SupervisorExit};

#[cfg(test)]
mod tests;
