//! Transport implementations

pub mod loopback;

pub use loopback::{LoopbackPeripheral, LoopbackTransport, loopback};
