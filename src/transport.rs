//! Transport trait for the wireless serial link

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::Result;
use crate::types::DeviceId;

/// GATT service exposing the peripheral's serial characteristic.
pub const SERIAL_SERVICE_UUID: &str = "0000dfb0-0000-1000-8000-00805f9b34fb";

/// Serial characteristic written to and notified from.
pub const SERIAL_CHARACTERISTIC_UUID: &str = "0000dfb1-0000-1000-8000-00805f9b34fb";

/// Inbound side of one connection, handed to the transport on connect.
///
/// The transport's notification callback pushes every chunk it receives
/// through [`notify`](Self::notify), which never blocks and is safe to call
/// from any thread. Dropping the sender tells the supervisor the link is gone.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl NotificationSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { tx }
    }

    /// Push a notification payload. Returns false if the supervisor is no longer listening.
    pub fn notify(&self, bytes: impl Into<Bytes>) -> bool {
        self.tx.send(bytes.into()).is_ok()
    }

    /// Whether the supervisor side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Trait for peripheral transports
///
/// A transport owns the low-level link to one peripheral. It is used from a
/// single supervisor task only, and every operation may fail with
/// [`LinkError::TransportDisconnected`](crate::LinkError::TransportDisconnected)
/// or a [`LinkError::Transport`](crate::LinkError::Transport) error, both of
/// which the supervisor answers with a reconnect.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Connect to `device` and start forwarding notifications to `notifications`.
    ///
    /// [`DeviceId::as_str`] is the address exactly as configured, case included.
    /// Each call gets a fresh sender; bytes pushed to an older one are discarded.
    async fn connect(&mut self, device: &DeviceId, notifications: NotificationSender) -> Result<()>;

    /// Tear the link down. Called before every reconnect; must tolerate an already-dead link.
    async fn disconnect(&mut self) -> Result<()>;

    /// Write bytes to the serial characteristic.
    async fn write(&mut self, bytes: &[u8], require_ack: bool) -> Result<()>;
}
