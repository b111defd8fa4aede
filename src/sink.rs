//! Downstream delivery of decoded frames

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::{DeviceId, Frame};

/// Receives every decoded, in-order frame exactly once.
///
/// Called from the device supervisor's task, so implementations must return
/// quickly: hand the frame to a queue, never wait on downstream work.
pub trait FrameSink: Send + Sync + 'static {
    /// Hand off one frame. Returns false if the frame was dropped instead.
    fn deliver(&self, device: &DeviceId, frame: Frame) -> bool;
}

/// Closures always accept the frame.
impl<F> FrameSink for F
where
    F: Fn(&DeviceId, Frame) + Send + Sync + 'static,
{
    fn deliver(&self, device: &DeviceId, frame: Frame) -> bool {
        self(device, frame);
        true
    }
}

/// A frame tagged with the device it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredFrame {
    pub device: DeviceId,
    pub frame: Frame,
}

/// Sink backed by a bounded channel.
///
/// Delivery never waits: when the channel is full the frame is dropped, logged
/// and counted in [`dropped`](Self::dropped).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DeliveredFrame>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// Create a sink and the receiver that consumes it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DeliveredFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped: Arc::new(AtomicU64::new(0)) }, rx)
    }

    /// Frames dropped because the consumer fell behind or went away.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for ChannelSink {
    fn deliver(&self, device: &DeviceId, frame: Frame) -> bool {
        let sequence = frame.sequence();
        match self.tx.try_send(DeliveredFrame { device: device.clone(), frame }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(%device, sequence, dropped, "Sink full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(%device, sequence, "Sink receiver closed, frame dropped");
                false
            }
        }
    }
}
