//! Self-healing link protocol engine for BLE serial sensor peripherals.
//!
//! Sensorlink turns the raw notification stream of a BLE serial characteristic
//! into validated, in-order sensor frames, and keeps each link healthy without
//! operator involvement.
//!
//! # Features
//!
//! - **Framing**: EMG, multi-channel and timestamp frames reassembled across
//!   arbitrary notification boundaries
//! - **Integrity**: CRC-8 on every frame, strict per-device sequence tracking
//! - **Self-healing**: any fault triggers the RESET protocol and a fresh handshake
//! - **Fleets**: one isolated supervisor task per peripheral
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sensorlink::transports::loopback;
//! use sensorlink::{ChannelSink, DeviceId, FleetManager, LinkConfig};
//!
//! #[tokio::main]
//! async fn main() -> sensorlink::Result<()> {
//!     let (sink, mut frames) = ChannelSink::new(1024);
//!     let mut fleet = FleetManager::new(LinkConfig::default(), sink)?;
//!
//!     let (transport, _peripheral) = loopback();
//!     let handle = fleet.start(DeviceId::new("B0:B1:13:2D:B4:01"), transport)?;
//!     println!("{} is {:?}", handle.device(), handle.phase());
//!
//!     while let Some(delivered) = frames.recv().await {
//!         println!("{}: {:?}", delivered.device, delivered.frame);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocol
pub mod assembler;
pub mod codec;

// Link engine
pub mod config;
pub mod fleet;
pub mod link;
pub mod sink;
pub mod transport;
pub mod transports;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use assembler::{Drained, FrameAssembler, FrameResult};
pub use config::{Backoff, DeviceEntry, FleetConfig, LinkConfig, ReconnectPolicy};
pub use fleet::{DeviceHandle, FleetManager};
pub use link::{LinkState, LinkSupervisor, SupervisorExit};
pub use sink::{ChannelSink, DeliveredFrame, FrameSink};
pub use transport::{NotificationSender, Transport};
