//! Everything one supervisor owns: transport, inbound queue, state and status publisher

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::codec::Command;
use crate::config::LinkConfig;
use crate::sink::FrameSink;
use crate::transport::{NotificationSender, Transport};
use crate::types::{ConnectionPhase, DeviceId, LinkStatus};
use crate::{LinkError, Result};

use super::state::LinkState;

pub(crate) struct LinkContext<T: Transport> {
    pub(crate) device: DeviceId,
    pub(crate) config: Arc<LinkConfig>,
    pub(crate) state: LinkState,
    transport: T,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    sink: Arc<dyn FrameSink>,
    status: watch::Sender<LinkStatus>,
    stats: LinkStatus,
}

impl<T: Transport> LinkContext<T> {
    pub(crate) fn new(
        device: DeviceId,
        transport: T,
        config: Arc<LinkConfig>,
        sink: Arc<dyn FrameSink>,
    ) -> (Self, watch::Receiver<LinkStatus>) {
        let (status, status_rx) = watch::channel(LinkStatus::default());
        // Closed until the first connect hands out a live sender
        let (_, inbound) = mpsc::unbounded_channel();
        let context = Self {
            device,
            config,
            state: LinkState::new(),
            transport,
            inbound,
            sink,
            status,
            stats: LinkStatus::default(),
        };
        (context, status_rx)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// Record a phase change and publish it.
    pub(crate) fn set_phase(&mut self, phase: ConnectionPhase) {
        if self.state.phase() != phase {
            info!(from = ?self.state.phase(), to = ?phase, "Link phase changed");
        }
        self.state.set_phase(phase);
        self.publish();
    }

    pub(crate) fn publish(&mut self) {
        self.stats.phase = self.state.phase();
        self.stats.sequence = self.state.sequence();
        self.status.send_replace(self.stats);
    }

    pub(crate) fn record_reset(&mut self) {
        self.stats.resets += 1;
    }

    /// Write a single command byte, without write acknowledgment.
    pub(crate) async fn send(&mut self, command: Command) -> Result<()> {
        trace!(?command, "Sending command");
        self.transport.write(&[command.byte()], false).await
    }

    /// Wait up to `timeout` for the next notification.
    ///
    /// `Ok(None)` on timeout; `TransportDisconnected` once the transport has
    /// dropped its notification sender.
    pub(crate) async fn wait_notification(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => Err(LinkError::TransportDisconnected),
            Err(_) => Ok(None),
        }
    }

    /// Feed a chunk through the assembler and deliver decoded frames.
    ///
    /// Returns true once the link needs a reset.
    pub(crate) fn process(&mut self, chunk: &[u8]) -> bool {
        let drained = self.state.ingest(chunk);
        for frame in drained.frames {
            trace!(sequence = frame.sequence(), kind = ?frame.kind(), "Delivering frame");
            if self.sink.deliver(&self.device, frame) {
                self.stats.frames_delivered += 1;
            } else {
                self.stats.frames_dropped += 1;
            }
        }
        if let Some(fault) = drained.fault {
            self.stats.faults += 1;
            warn!(error = %fault, "Link fault, reset requested");
        }
        self.publish();
        self.state.reset_requested()
    }

    /// Connect with the bounded retry policy.
    ///
    /// With `initial` set the first attempt is immediate; every other attempt
    /// tears the old link down and waits out the policy delay first. Returns
    /// [`LinkError::Unreachable`] once all attempts have failed.
    pub(crate) async fn reconnect(&mut self, initial: bool) -> Result<()> {
        let policy = self.config.reconnect.clone();

        for attempt in 1..=policy.max_attempts {
            if !(initial && attempt == 1) {
                if let Err(e) = self.transport.disconnect().await {
                    debug!(error = %e, "Disconnect before reconnect failed");
                }
                let delay = policy.delay(attempt);
                debug!(attempt, ?delay, "Waiting before connect attempt");
                tokio::time::sleep(delay).await;
            }

            let (tx, rx) = mpsc::unbounded_channel();
            match self.transport.connect(&self.device, NotificationSender::new(tx)).await {
                Ok(()) => {
                    self.inbound = rx;
                    if !initial {
                        self.stats.reconnects += 1;
                    }
                    self.publish();
                    info!(attempt, "Transport connected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, max_attempts = policy.max_attempts, error = %e, "Connect attempt failed");
                }
            }
        }

        let err = LinkError::Unreachable { device: self.device.clone(), attempts: policy.max_attempts };
        error!(attempts = policy.max_attempts, "Device unreachable, giving up");
        Err(err)
    }

    /// Best-effort disconnect on shutdown.
    pub(crate) async fn shutdown(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "Disconnect on shutdown failed");
        }
    }
}
