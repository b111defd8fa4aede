//! Reset protocol: the single recovery path for every link fault

use tracing::{debug, info};

use crate::Result;
use crate::codec::Command;
use crate::transport::Transport;
use crate::types::ConnectionPhase;

use super::context::LinkContext;
use super::handshake::HandshakeController;

pub(crate) struct ResetCoordinator;

impl ResetCoordinator {
    /// Signal RESET, forget all protocol state, then reconnect the transport.
    ///
    /// Used for checksum failures, sequence desync, unknown tags and exhausted
    /// handshakes. The caller re-enters the handshake afterwards.
    pub(crate) async fn reset<T: Transport>(
        link: &mut LinkContext<T>,
        handshake: &mut HandshakeController,
    ) -> Result<()> {
        link.set_phase(ConnectionPhase::ResetPending);
        handshake.reset();

        if let Err(e) = link.send(Command::Reset).await {
            debug!(error = %e, "RESET not delivered, continuing with local reset");
        }
        link.state.clear();
        link.record_reset();
        link.publish();

        link.reconnect(false).await?;
        info!("Reset complete");
        Ok(())
    }

    /// Recover from a dropped transport: reconnect first, then RESET on the fresh link.
    pub(crate) async fn recover_disconnect<T: Transport>(
        link: &mut LinkContext<T>,
        handshake: &mut HandshakeController,
    ) -> Result<()> {
        link.set_phase(ConnectionPhase::Reconnecting);
        handshake.reset();
        link.reconnect(false).await?;

        link.state.clear();
        if let Err(e) = link.send(Command::Reset).await {
            debug!(error = %e, "RESET after reconnect not delivered");
        }
        link.publish();
        info!("Recovered from disconnect");
        Ok(())
    }
}
