//! Delivery of one synthesized buffer to the configured output devices.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::device::{DeviceHandle, DeviceRouter};
use super::playback::PlayBuffer;
use crate::error::DeliveryError;
use crate::tts::SynthesisResult;

/// Where a buffer is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Virtual sink only (or the current default output when no sink is configured)
    Single,
    /// Virtual sink and monitor device
    Dual,
}

/// Plays synthesized buffers through one player, routed by the device router.
pub struct AudioDelivery {
    player: Arc<dyn PlayBuffer>,
    router: Arc<DeviceRouter>,
}

impl AudioDelivery {
    pub fn new(player: Arc<dyn PlayBuffer>, router: Arc<DeviceRouter>) -> Self {
        info!("🔊 Player: {} (targets devices: {})", player.name(), player.targets_devices());
        Self { player, router }
    }

    /// Play `result` according to `mode`. The buffer is dropped when this returns.
    ///
    /// A Dual delivery whose sink leg failed is retried once as Single on the sink.
    ///
    /// # Errors
    /// Returns the Single attempt's error; that failure is terminal.
    pub async fn deliver(&self, result: SynthesisResult, mode: DeliveryMode) -> Result<(), DeliveryError> {
        debug!("Delivering {} bytes ({:?}, {:?})", result.len(), result.format, mode);

        if mode == DeliveryMode::Dual {
            match self.router.monitor() {
                Some(monitor) => match self.deliver_dual(&result, &monitor).await {
                    Ok(()) => return Ok(()),
                    Err(e) => warn!("Dual delivery to the sink failed ({}), retrying on the sink only", e),
                },
                None => debug!("Dual delivery without a monitor device, playing once"),
            }
        }

        self.deliver_single(&result).await
    }

    async fn deliver_single(&self, result: &SynthesisResult) -> Result<(), DeliveryError> {
        let sink = self.router.sink();
        self.player.play(result, sink.as_ref().map(|d| d.name.as_str())).await
    }

    /// Play on the sink and the monitor. Only a sink failure is returned;
    /// the message already reached the sink when just the monitor fails.
    async fn deliver_dual(&self, result: &SynthesisResult, monitor: &DeviceHandle) -> Result<(), DeliveryError> {
        let sink = self.router.sink();

        let (to_sink, to_monitor) = if self.player.targets_devices() {
            tokio::join!(
                self.player.play(result, sink.as_ref().map(|d| d.name.as_str())),
                self.player.play(result, Some(monitor.name.as_str()))
            )
        } else {
            // The player follows the default output: drive each device in turn
            let to_sink = match &sink {
                Some(sink) => self.router.scoped_switch(sink, || self.player.play(result, None)).await,
                None => self.player.play(result, None).await,
            };
            let to_monitor = self.router.scoped_switch(monitor, || self.player.play(result, None)).await;
            (to_sink, to_monitor)
        };

        if let Err(e) = to_monitor {
            warn!("Monitor playback on {} failed: {}", monitor, e);
        }
        to_sink
    }
}
