//! Fleet manager: one independent supervisor per peripheral.
//!
//! Each device gets its own task, transport, [`LinkState`](crate::link::LinkState)
//! and cancellation token. Nothing mutable is shared between devices, so a
//! fault, reset or reconnect on one never touches another.

use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{DeviceEntry, LinkConfig};
use crate::link::{LinkSupervisor, SupervisorExit};
use crate::sink::FrameSink;
use crate::transport::Transport;
use crate::types::{ConnectionPhase, DeviceId, LinkStatus};
use crate::{LinkError, Result};

/// Handle to one running (or finished) device supervisor.
///
/// Cheap to clone. Reading status never blocks the supervisor.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    device: DeviceId,
    status: watch::Receiver<LinkStatus>,
}

impl DeviceHandle {
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Latest published status.
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.status.borrow().phase
    }

    /// Stream of phase changes, starting with the current phase.
    pub fn phase_updates(&self) -> impl Stream<Item = ConnectionPhase> + 'static {
        let mut last = None;
        WatchStream::new(self.status.clone()).filter_map(move |status| {
            let changed = last != Some(status.phase);
            last = Some(status.phase);
            async move { changed.then_some(status.phase) }
        })
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns the matching status, or `None` if the supervisor is gone before
    /// it ever matched.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Option<LinkStatus>
    where
        F: FnMut(&LinkStatus) -> bool,
    {
        let mut status = self.status.clone();
        status.wait_for(|s| predicate(s)).await.ok().map(|s| *s)
    }
}

struct Supervised {
    handle: DeviceHandle,
    cancel: CancellationToken,
    task: JoinHandle<SupervisorExit>,
}

/// Owns one supervisor per device.
pub struct FleetManager {
    config: Arc<LinkConfig>,
    sink: Arc<dyn FrameSink>,
    devices: HashMap<DeviceId, Supervised>,
    cancel: CancellationToken,
}

impl FleetManager {
    /// Create a fleet delivering every device's frames to `sink`.
    pub fn new(config: LinkConfig, sink: impl FrameSink) -> Result<Self> {
        Self::with_shared_sink(config, Arc::new(sink))
    }

    /// Create a fleet around an already shared sink.
    pub fn with_shared_sink(config: LinkConfig, sink: Arc<dyn FrameSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            sink,
            devices: HashMap::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Start supervising `device` over `transport`.
    ///
    /// Must be called inside a tokio runtime. A device whose previous
    /// supervisor has already exited (e.g. unreachable) may be started again.
    pub fn start<T: Transport>(&mut self, device: DeviceId, transport: T) -> Result<DeviceHandle> {
        if let Some(existing) = self.devices.get(&device) {
            if !existing.task.is_finished() {
                return Err(LinkError::AlreadyRunning { device });
            }
            debug!(%device, "Replacing finished supervisor");
        }

        let (supervisor, status) =
            LinkSupervisor::new(device.clone(), transport, Arc::clone(&self.config), Arc::clone(&self.sink));
        let cancel = self.cancel.child_token();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        let handle = DeviceHandle { device: device.clone(), status };
        self.devices.insert(device.clone(), Supervised { handle: handle.clone(), cancel, task });
        info!(%device, devices = self.devices.len(), "Device supervisor started");

        Ok(handle)
    }

    /// Start every configured device, building its transport with `connect`.
    pub fn start_configured<T, F>(&mut self, devices: &[DeviceEntry], mut connect: F) -> Result<Vec<DeviceHandle>>
    where
        T: Transport,
        F: FnMut(&DeviceEntry) -> T,
    {
        devices.iter().map(|entry| self.start(entry.address.clone(), connect(entry))).collect()
    }

    /// Stop `device` if it is still supervised, then start it again over `transport`.
    ///
    /// The usual way back from [`ConnectionPhase::Unreachable`].
    pub async fn restart<T: Transport>(&mut self, device: DeviceId, transport: T) -> Result<DeviceHandle> {
        if self.devices.contains_key(&device) {
            self.stop_device(&device).await?;
        }
        self.start(device, transport)
    }

    /// Stop the supervisor behind `handle` and discard its state.
    pub async fn stop(&mut self, handle: &DeviceHandle) -> Result<SupervisorExit> {
        self.stop_device(handle.device()).await
    }

    /// Stop the supervisor for `device` and discard its state.
    pub async fn stop_device(&mut self, device: &DeviceId) -> Result<SupervisorExit> {
        let supervised = self
            .devices
            .remove(device)
            .ok_or_else(|| LinkError::UnknownDevice { device: device.clone() })?;

        supervised.cancel.cancel();
        let exit = Self::join(device, supervised.task).await;
        info!(%device, ?exit, "Device supervisor stopped");
        Ok(exit)
    }

    /// Stop every supervisor.
    pub async fn shutdown(&mut self) -> Vec<(DeviceId, SupervisorExit)> {
        self.cancel.cancel();
        let mut exits = Vec::with_capacity(self.devices.len());
        for (device, supervised) in self.devices.drain() {
            let exit = Self::join(&device, supervised.task).await;
            exits.push((device, exit));
        }
        info!(devices = exits.len(), "Fleet shut down");
        exits
    }

    async fn join(device: &DeviceId, task: JoinHandle<SupervisorExit>) -> SupervisorExit {
        match task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(%device, error = %e, "Supervisor task failed");
                SupervisorExit::Aborted
            }
        }
    }

    pub fn handle(&self, device: &DeviceId) -> Option<DeviceHandle> {
        self.devices.get(device).map(|s| s.handle.clone())
    }

    pub fn status(&self, device: &DeviceId) -> Option<LinkStatus> {
        self.devices.get(device).map(|s| s.handle.status())
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.keys()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

impl Drop for FleetManager {
    fn drop(&mut self) {
        debug!("Dropping fleet manager");
        self.cancel.cancel();
    }
}
