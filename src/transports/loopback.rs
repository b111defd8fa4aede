//! In-memory loopback transport
//!
//! [`loopback`] returns a connected pair: the [`LoopbackTransport`] goes to a
//! supervisor, the [`LoopbackPeripheral`] plays the device. The peripheral side
//! sees every command the supervisor writes and can push notifications, drop the
//! link, or refuse connects and writes, which makes it the basis for simulations
//! and tests.

use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::transport::{NotificationSender, Transport};
use crate::types::DeviceId;
use crate::{LinkError, Result};

#[derive(Debug, Default)]
struct Shared {
    link: Option<NotificationSender>,
    connected: bool,
    connects: u32,
    disconnects: u32,
    failing_connects: u32,
    failing_writes: u32,
    device: Option<DeviceId>,
    written: Vec<u8>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a transport and the peripheral it talks to.
pub fn loopback() -> (LoopbackTransport, LoopbackPeripheral) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport { shared: Arc::clone(&shared), commands: tx },
        LoopbackPeripheral { shared, commands: rx },
    )
}

/// Supervisor side of a loopback pair.
#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
    commands: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&mut self, device: &DeviceId, notifications: NotificationSender) -> Result<()> {
        let mut shared = lock(&self.shared);
        shared.connects += 1;
        shared.device = Some(device.clone());
        if shared.failing_connects > 0 {
            shared.failing_connects -= 1;
            debug!(%device, "Loopback refusing connect");
            return Err(LinkError::transport_failed(format!("connect to {device} refused")));
        }
        shared.connected = true;
        shared.link = Some(notifications);
        debug!(%device, connects = shared.connects, "Loopback connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        shared.disconnects += 1;
        shared.connected = false;
        shared.link = None;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8], _require_ack: bool) -> Result<()> {
        let mut shared = lock(&self.shared);
        if !shared.connected {
            return Err(LinkError::TransportDisconnected);
        }
        if shared.failing_writes > 0 {
            shared.failing_writes -= 1;
            debug!(?bytes, "Loopback refusing write");
            return Err(LinkError::transport_failed("write to serial characteristic refused"));
        }
        shared.written.extend_from_slice(bytes);
        trace!(?bytes, "Loopback write");
        // The peripheral may have been dropped; the write itself still succeeded
        let _ = self.commands.send(bytes.to_vec());
        Ok(())
    }
}

/// Device side of a loopback pair.
#[derive(Debug)]
pub struct LoopbackPeripheral {
    shared: Arc<Mutex<Shared>>,
    commands: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl LoopbackPeripheral {
    /// Next write from the supervisor, in order. `None` once the transport is dropped.
    pub async fn next_command(&mut self) -> Option<Vec<u8>> {
        self.commands.recv().await
    }

    /// Push a notification to the connected supervisor. Returns false when not connected.
    pub fn notify(&self, bytes: impl Into<Bytes>) -> bool {
        let shared = lock(&self.shared);
        match (&shared.link, shared.connected) {
            (Some(link), true) => link.notify(bytes),
            _ => false,
        }
    }

    /// Simulate the radio link dropping.
    pub fn drop_link(&self) {
        let mut shared = lock(&self.shared);
        shared.connected = false;
        shared.link = None;
    }

    /// Refuse the next `count` connect attempts.
    pub fn fail_next_connects(&self, count: u32) {
        lock(&self.shared).failing_connects = count;
    }

    /// Fail the next `count` writes with a transport error while staying connected.
    pub fn fail_next_writes(&self, count: u32) {
        lock(&self.shared).failing_writes = count;
    }

    /// Device identity passed to the most recent connect attempt.
    pub fn connected_device(&self) -> Option<DeviceId> {
        lock(&self.shared).device.clone()
    }

    /// Disconnects requested by the supervisor so far.
    pub fn disconnect_count(&self) -> u32 {
        lock(&self.shared).disconnects
    }

    /// Connect attempts seen so far, refused ones included.
    pub fn connect_count(&self) -> u32 {
        lock(&self.shared).connects
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    /// Every byte written by the supervisor so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.shared).written.clone()
    }
}
