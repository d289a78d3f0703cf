//! Playback of synthesized buffers through platform players.
//!
//! - Linux: `paplay`, audio on stdin, device chosen per invocation
//! - macOS: `afplay` on a temporary file, plays on the default output
//! - Windows: PowerShell `Media.SoundPlayer` on a temporary file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stream::StreamPlayer;
use super::util::wrap_raw_pcm;
use crate::error::DeliveryError;
use crate::platform::{CommandSpec, Platform};
use crate::tts::{AudioFormat, SynthesisResult};

/// Plays one synthesized buffer to completion.
#[async_trait]
pub trait PlayBuffer: Send + Sync {
    /// Player name for logs.
    fn name(&self) -> &'static str;

    /// Whether `play` can address a device directly instead of the current default.
    fn targets_devices(&self) -> bool;

    /// Play `audio`, on `device` when given and supported, else on the current default output.
    async fn play(&self, audio: &SynthesisResult, device: Option<&str>) -> Result<(), DeliveryError>;
}

/// Which player implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    /// Platform command player where one exists, else in-process streaming
    #[default]
    Auto,
    /// External player command
    Process,
    /// In-process cpal output stream
    Stream,
}

/// Player for the platform and configured kind.
pub fn build_player(kind: PlayerKind, platform: Platform) -> Arc<dyn PlayBuffer> {
    match (kind, platform) {
        (PlayerKind::Stream, _) | (PlayerKind::Auto, Platform::Windows | Platform::Other) => Arc::new(StreamPlayer::new()),
        _ => Arc::new(ProcessPlayer::new(platform)),
    }
}

/// External player process per buffer.
#[derive(Debug, Clone)]
pub struct ProcessPlayer {
    platform: Platform,
    program: Option<String>, // Replaces the platform player program
    temp_dir: PathBuf,
}

impl ProcessPlayer {
    pub fn new(platform: Platform) -> Self {
        Self { platform, program: None, temp_dir: std::env::temp_dir() }
    }

    #[cfg(test)]
    fn with_program(mut self, program: &str, temp_dir: &Path) -> Self {
        self.program = Some(program.to_string());
        self.temp_dir = temp_dir.to_path_buf();
        self
    }

    /// Whether the player reads a file rather than stdin.
    fn needs_file(&self) -> bool {
        matches!(self.platform, Platform::MacOs | Platform::Windows)
    }

    /// Build the player command.
    ///
    /// # Arguments
    /// * `audio` - Buffer to play
    /// * `device` - Target device (honored on Linux only)
    /// * `file` - Path of the buffer on disk, for players that need one
    ///
    /// # Errors
    /// Returns an error when the platform has no player, or a file-based player gets no file.
    pub fn command(&self, audio: &SynthesisResult, device: Option<&str>, file: Option<&Path>) -> Result<CommandSpec, DeliveryError> {
        let path = || {
            file.map(|p| p.display().to_string())
                .ok_or_else(|| DeliveryError::Player { player: self.program().into(), message: "no audio file to play".into() })
        };

        match self.platform {
            Platform::Linux => {
                let mut args = Vec::new();
                if let Some(device) = device {
                    args.push(format!("--device={device}"));
                }
                if audio.format == AudioFormat::RawPcm {
                    let (Some(rate), Some(channels)) = (audio.sample_rate, audio.channels) else {
                        return Err(DeliveryError::UnsupportedFormat("raw PCM without sample rate and channel count".into()));
                    };
                    args.extend(["--raw".to_string(), "--format=s16le".into(), format!("--rate={rate}"), format!("--channels={channels}")]);
                }
                Ok(CommandSpec::new("paplay", args).with_stdin(audio.audio.clone()))
            }
            Platform::MacOs => Ok(CommandSpec::new("afplay", [path()?])),
            Platform::Windows => {
                let script = format!("(New-Object Media.SoundPlayer '{}').PlaySync()", path()?.replace('\'', "''"));
                Ok(CommandSpec::new("powershell", ["-NoProfile".to_string(), "-NonInteractive".into(), "-Command".into(), script]))
            }
            Platform::Other => Err(DeliveryError::Player { player: "process".into(), message: format!("no player command on {}", self.platform) }),
        }
    }

    fn program(&self) -> &'static str {
        match self.platform {
            Platform::Linux => "paplay",
            Platform::MacOs => "afplay",
            Platform::Windows => "powershell",
            Platform::Other => "process",
        }
    }
}

#[async_trait]
impl PlayBuffer for ProcessPlayer {
    fn name(&self) -> &'static str {
        self.program()
    }

    fn targets_devices(&self) -> bool {
        self.platform == Platform::Linux
    }

    async fn play(&self, audio: &SynthesisResult, device: Option<&str>) -> Result<(), DeliveryError> {
        if device.is_some() && !self.targets_devices() {
            debug!("{} ignores the device argument, playing on the current output", self.program());
        }

        // Held until the player exits; removed on drop
        let file = if self.needs_file() {
            let bytes = match audio.format {
                AudioFormat::RawPcm => wrap_raw_pcm(audio)?,
                _ => audio.audio.clone(),
            };
            let file = tempfile::Builder::new()
                .prefix("chat-voice-")
                .suffix(&format!(".{}", audio.format.extension()))
                .tempfile_in(&self.temp_dir)?;
            tokio::fs::write(file.path(), &bytes).await?;
            Some(file)
        } else {
            None
        };

        let mut spec = self.command(audio, device, file.as_ref().map(|f| f.path()))?;
        if let Some(program) = &self.program {
            spec.program = program.clone();
        }
        debug!("Playing {} bytes with {}", audio.len(), spec.program);

        let output = spec.run().await.map_err(|source| DeliveryError::Spawn { player: spec.program.clone(), source })?;
        if !output.success {
            return Err(DeliveryError::Player { player: spec.program.clone(), message: output.stderr });
        }
        Ok(())
    }
}
