//! Output device routing.
//!
//! The OS "current output device" is process-wide mutable state. Every
//! change goes through [`DeviceRouter`], which serializes switches and offers
//! [`DeviceRouter::scoped_switch`] to change the device temporarily with a
//! guaranteed restore.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::DeviceSwitchError;

/// Role of an output device in the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Captured by another application as a microphone
    VirtualSink,
    /// Local speakers or headphones for the operator
    Monitor,
    /// Any other device present on the system
    Other,
}

/// An OS output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub name: String,
    pub role: DeviceRole,
}

impl DeviceHandle {
    pub fn new(name: impl Into<String>, role: DeviceRole) -> Self {
        Self { name: name.into(), role }
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.role {
            DeviceRole::VirtualSink => write!(f, "{} [virtual sink]", self.name),
            DeviceRole::Monitor => write!(f, "{} [monitor]", self.name),
            DeviceRole::Other => write!(f, "{}", self.name),
        }
    }
}

/// Platform device control.
#[async_trait]
pub trait SwitchDevice: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Current default output device, `None` when unknown.
    async fn current(&self) -> Option<String>;

    /// Names of all output devices.
    async fn list(&self) -> Result<Vec<String>, DeviceSwitchError>;

    /// Make `device` the default output.
    async fn switch_to(&self, device: &str) -> Result<(), DeviceSwitchError>;
}

/// Owner of the process-wide current output device.
pub struct DeviceRouter {
    backend: Arc<dyn SwitchDevice>, // Platform device control
    sink: Option<String>,           // Configured virtual sink
    monitor: Option<String>,        // Configured monitor device
    serial: Arc<Mutex<()>>,         // Held for every switch so switches never interleave
}

impl DeviceRouter {
    /// Create a router.
    ///
    /// # Arguments
    /// * `backend` - Platform device control
    /// * `sink` - Virtual sink name, if configured
    /// * `monitor` - Monitor device name, if configured
    pub fn new(backend: Arc<dyn SwitchDevice>, sink: Option<String>, monitor: Option<String>) -> Self {
        info!("Device router: {} backend", backend.name());
        Self { backend, sink, monitor, serial: Arc::new(Mutex::new(())) }
    }

    /// Handle for a device name, with its role resolved from configuration.
    pub fn handle(&self, name: &str) -> DeviceHandle {
        let role = if self.sink.as_deref() == Some(name) {
            DeviceRole::VirtualSink
        } else if self.monitor.as_deref() == Some(name) {
            DeviceRole::Monitor
        } else {
            DeviceRole::Other
        };
        DeviceHandle::new(name, role)
    }

    /// Configured virtual sink.
    pub fn sink(&self) -> Option<DeviceHandle> {
        self.sink.as_deref().map(|name| self.handle(name))
    }

    /// Configured monitor device.
    pub fn monitor(&self) -> Option<DeviceHandle> {
        self.monitor.as_deref().map(|name| self.handle(name))
    }

    /// Current output device, best effort.
    pub async fn current(&self) -> Option<DeviceHandle> {
        self.backend.current().await.map(|name| self.handle(&name))
    }

    /// All output devices, best effort: failures yield an empty list.
    pub async fn list(&self) -> Vec<DeviceHandle> {
        match self.backend.list().await {
            Ok(names) => names.iter().map(|name| self.handle(name)).collect(),
            Err(e) => {
                debug!("Device enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Switch the default output device. No command is issued when it is already current.
    ///
    /// # Errors
    /// Returns the backend's error. Callers treat it as advisory.
    pub async fn switch_to(&self, device: &DeviceHandle) -> Result<(), DeviceSwitchError> {
        let _serial = self.serial.lock().await;
        switch_if_needed(self.backend.as_ref(), &device.name).await
    }

    /// Switch and log instead of failing.
    pub async fn switch_or_warn(&self, device: &DeviceHandle) {
        if let Err(e) = self.switch_to(device).await {
            warn!("Could not switch output to {}: {}", device, e);
        }
    }

    /// Run `action` with `target` as the default output, then restore the previous device.
    ///
    /// The previous device is restored on every exit path: after success, after
    /// an error returned by `action`, and when the returned future is dropped
    /// before completion. A failed switch is logged and `action` still runs.
    pub async fn scoped_switch<F, Fut, T>(&self, target: &DeviceHandle, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let serial = self.serial.clone().lock_owned().await;

        let original = self.backend.current().await;
        if original.is_none() {
            warn!("Current output device unknown, it will not be restored after using {}", target);
        }

        let guard = RestoreGuard { backend: self.backend.clone(), original, serial: Some(serial) };

        if let Err(e) = switch_if_needed(self.backend.as_ref(), &target.name).await {
            warn!("Could not switch output to {}: {}", target, e);
        }

        let output = action().await;
        guard.restore().await;
        output
    }
}

/// Restores the captured device when the scoped switch ends.
///
/// Holds the router's serial lock until the restore has completed, also when
/// the restore runs from `Drop` on a spawned task.
struct RestoreGuard {
    backend: Arc<dyn SwitchDevice>,
    original: Option<String>,
    serial: Option<OwnedMutexGuard<()>>,
}

impl RestoreGuard {
    async fn restore(mut self) {
        if let Some(original) = self.original.take() {
            restore_device(self.backend.as_ref(), &original).await;
        }
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        let Some(original) = self.original.take() else {
            return;
        };

        let backend = self.backend.clone();
        let serial = self.serial.take();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Scoped switch cancelled, restoring {}", original);
                runtime.spawn(async move {
                    restore_device(backend.as_ref(), &original).await;
                    drop(serial);
                });
            }
            Err(_) => warn!("No runtime left to restore output device {}", original),
        }
    }
}

async fn switch_if_needed(backend: &dyn SwitchDevice, device: &str) -> Result<(), DeviceSwitchError> {
    if backend.current().await.as_deref() == Some(device) {
        debug!("Output already on {}", device);
        return Ok(());
    }
    backend.switch_to(device).await?;
    debug!("Output switched to {}", device);
    Ok(())
}

async fn restore_device(backend: &dyn SwitchDevice, original: &str) {
    match switch_if_needed(backend, original).await {
        Ok(()) => debug!("Output restored to {}", original),
        Err(e) => warn!("Failed to restore output device {}: {}", original, e),
    }
}
