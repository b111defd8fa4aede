//! Per-device supervisor state machine

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, trace, warn};

use crate::config::LinkConfig;
use crate::sink::FrameSink;
use crate::transport::Transport;
use crate::types::{ConnectionPhase, DeviceId, LinkStatus};
use crate::{LinkError, Result};

use super::context::LinkContext;
use super::handshake::HandshakeController;
use super::reset::ResetCoordinator;

/// Why a supervisor stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Cancelled by its owner
    Stopped,
    /// Reconnect attempts exhausted
    Unreachable { attempts: u32 },
    /// The supervisor task panicked or was aborted
    Aborted,
}

/// Runs the link protocol for one device.
///
/// ```text
/// Disconnected -> Handshaking -> Synced -> ResetPending -> Handshaking ...
///          any transport loss -> Reconnecting -> Handshaking
/// ```
///
/// Every fault funnels into reset or reconnect; the supervisor only exits when
/// cancelled or when the device stays unreachable for the whole reconnect policy.
pub struct LinkSupervisor<T: Transport> {
    link: LinkContext<T>,
    handshake: HandshakeController,
}

impl<T: Transport> LinkSupervisor<T> {
    /// Create a supervisor and the receiver its status is published on.
    pub fn new(
        device: DeviceId,
        transport: T,
        config: Arc<LinkConfig>,
        sink: Arc<dyn FrameSink>,
    ) -> (Self, watch::Receiver<LinkStatus>) {
        let (link, status) = LinkContext::new(device, transport, config, sink);
        (Self { link, handshake: HandshakeController::new() }, status)
    }

    pub fn device(&self) -> &DeviceId {
        &self.link.device
    }

    /// Another receiver for this supervisor's status.
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.link.subscribe()
    }

    /// Run until cancelled or the device is declared unreachable.
    ///
    /// Cancellation drops whatever the supervisor was awaiting, so a pending
    /// notification wait or reconnect delay returns immediately.
    pub async fn run(mut self, cancel: CancellationToken) -> SupervisorExit {
        let span = info_span!("link", device = %self.link.device);
        async move {
            info!("Supervisor started");

            let exit = tokio::select! {
                _ = cancel.cancelled() => SupervisorExit::Stopped,
                exit = self.drive() => exit,
            };

            self.link.shutdown().await;
            match exit {
                SupervisorExit::Unreachable { .. } => self.link.set_phase(ConnectionPhase::Unreachable),
                SupervisorExit::Stopped | SupervisorExit::Aborted => {
                    self.link.set_phase(ConnectionPhase::Stopped);
                }
            }

            info!(?exit, "Supervisor ended");
            exit
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> SupervisorExit {
        let mut phase = ConnectionPhase::Disconnected;

        loop {
            let step = match phase {
                ConnectionPhase::Disconnected => {
                    self.link.set_phase(ConnectionPhase::Disconnected);
                    self.link.reconnect(true).await.map(|_| ConnectionPhase::Handshaking)
                }
                ConnectionPhase::Handshaking => {
                    self.handshake.begin(&mut self.link).await.map(|_| ConnectionPhase::Synced)
                }
                ConnectionPhase::Synced => self.listen().await.map(|_| ConnectionPhase::ResetPending),
                ConnectionPhase::ResetPending => {
                    ResetCoordinator::reset(&mut self.link, &mut self.handshake)
                        .await
                        .map(|_| ConnectionPhase::Handshaking)
                }
                ConnectionPhase::Reconnecting => {
                    ResetCoordinator::recover_disconnect(&mut self.link, &mut self.handshake)
                        .await
                        .map(|_| ConnectionPhase::Handshaking)
                }
                ConnectionPhase::Unreachable | ConnectionPhase::Stopped => {
                    return SupervisorExit::Stopped;
                }
            };

            phase = match step {
                Ok(next) => next,
                Err(LinkError::Unreachable { attempts, .. }) => {
                    return SupervisorExit::Unreachable { attempts };
                }
                Err(e) if e.is_disconnect() => {
                    warn!(error = %e, "Transport lost");
                    ConnectionPhase::Reconnecting
                }
                Err(e) => {
                    warn!(error = %e, "Link fault");
                    ConnectionPhase::ResetPending
                }
            };
        }
    }

    /// Deliver frames until a fault requests a reset. Errors on transport loss.
    async fn listen(&mut self) -> Result<()> {
        self.link.set_phase(ConnectionPhase::Synced);
        let timeout = self.link.config.listen_timeout();

        // Bytes that arrived in the same notification as the acknowledgment
        if self.link.process(&[]) {
            return Ok(());
        }

        loop {
            match self.link.wait_notification(timeout).await? {
                Some(chunk) => {
                    if self.link.process(&chunk) {
                        return Ok(());
                    }
                }
                None => trace!(?timeout, "No notification within listen timeout"),
            }
        }
    }
}
