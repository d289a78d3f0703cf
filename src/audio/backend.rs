//! Platform device control backends.
//!
//! - Linux: `pactl` (PulseAudio / PipeWire)
//! - macOS: `SwitchAudioSource`
//! - Elsewhere: cpal enumeration only, switching is unsupported

use std::sync::Arc;

use async_trait::async_trait;
use cpal::traits::HostTrait;
use tracing::debug;

use super::device::SwitchDevice;
use super::util::get_device_name;
use crate::error::DeviceSwitchError;
use crate::platform::{CommandSpec, Platform};

/// Command-line tool that queries and switches the default output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchTool {
    Pactl,
    SwitchAudioSource,
}

/// Device control through an external command-line tool.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    tool: SwitchTool,
}

impl CommandBackend {
    pub fn new(tool: SwitchTool) -> Self {
        Self { tool }
    }

    pub fn current_command(&self) -> CommandSpec {
        match self.tool {
            SwitchTool::Pactl => CommandSpec::new("pactl", ["get-default-sink"]),
            SwitchTool::SwitchAudioSource => CommandSpec::new("SwitchAudioSource", ["-c", "-t", "output"]),
        }
    }

    pub fn list_command(&self) -> CommandSpec {
        match self.tool {
            SwitchTool::Pactl => CommandSpec::new("pactl", ["list", "short", "sinks"]),
            SwitchTool::SwitchAudioSource => CommandSpec::new("SwitchAudioSource", ["-a", "-t", "output"]),
        }
    }

    pub fn switch_command(&self, device: &str) -> CommandSpec {
        match self.tool {
            SwitchTool::Pactl => CommandSpec::new("pactl", ["set-default-sink", device]),
            SwitchTool::SwitchAudioSource => CommandSpec::new("SwitchAudioSource", ["-s", device, "-t", "output"]),
        }
    }

    pub fn parse_list(&self, listing: &str) -> Vec<String> {
        match self.tool {
            SwitchTool::Pactl => parse_pactl_sinks(listing),
            SwitchTool::SwitchAudioSource => listing.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect(),
        }
    }

    async fn run(&self, spec: CommandSpec) -> Result<String, DeviceSwitchError> {
        let failed = |message: String| DeviceSwitchError::Command { command: spec.display(), message };
        let output = spec.run().await.map_err(|e| failed(e.to_string()))?;
        if !output.success {
            return Err(failed(output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SwitchDevice for CommandBackend {
    fn name(&self) -> &'static str {
        match self.tool {
            SwitchTool::Pactl => "pactl",
            SwitchTool::SwitchAudioSource => "SwitchAudioSource",
        }
    }

    async fn current(&self) -> Option<String> {
        match self.run(self.current_command()).await {
            Ok(out) => Some(out.trim().to_string()).filter(|name| !name.is_empty()),
            Err(e) => {
                debug!("Current output device unknown: {}", e);
                None
            }
        }
    }

    async fn list(&self) -> Result<Vec<String>, DeviceSwitchError> {
        let listing = self.run(self.list_command()).await?;
        Ok(self.parse_list(&listing))
    }

    async fn switch_to(&self, device: &str) -> Result<(), DeviceSwitchError> {
        self.run(self.switch_command(device)).await.map(|_| ())
    }
}

/// `pactl list short sinks`: `<index>\t<name>\t<driver>\t<format>\t<state>`.
fn parse_pactl_sinks(listing: &str) -> Vec<String> {
    listing.lines().filter_map(|line| line.split('\t').nth(1)).map(str::trim).filter(|name| !name.is_empty()).map(String::from).collect()
}

/// Read-only device view through cpal.
#[derive(Debug, Default, Clone)]
pub struct CpalBackend;

#[async_trait]
impl SwitchDevice for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    async fn current(&self) -> Option<String> {
        tokio::task::spawn_blocking(|| cpal::default_host().default_output_device().map(|device| get_device_name(&device))).await.ok().flatten()
    }

    async fn list(&self) -> Result<Vec<String>, DeviceSwitchError> {
        let failed = |message: String| DeviceSwitchError::Command { command: "cpal output_devices".into(), message };
        tokio::task::spawn_blocking(|| -> Result<Vec<String>, String> {
            let devices = cpal::default_host().output_devices().map_err(|e| e.to_string())?;
            Ok(devices.map(|device| get_device_name(&device)).collect())
        })
        .await
        .map_err(|e| failed(e.to_string()))?
        .map_err(failed)
    }

    async fn switch_to(&self, _device: &str) -> Result<(), DeviceSwitchError> {
        Err(DeviceSwitchError::Unsupported("cpal"))
    }
}

/// Device control for the given platform.
pub fn platform_backend(platform: Platform) -> Arc<dyn SwitchDevice> {
    match platform {
        Platform::Linux => Arc::new(CommandBackend::new(SwitchTool::Pactl)),
        Platform::MacOs => Arc::new(CommandBackend::new(SwitchTool::SwitchAudioSource)),
        Platform::Windows | Platform::Other => Arc::new(CpalBackend),
    }
}
