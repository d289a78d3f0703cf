//! Application configuration and CLI argument parsing.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

use crate::audio::{DeliveryMode, PlayerKind};
use crate::tts::{EngineKind, PrimaryConnection, VoiceParams};

/// Bridge configuration. Every option can also be set through its environment variable.
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "chat-voice-bridge")]
#[command(author, version, about = "Speaks chat messages on a virtual microphone", long_about = None)]
pub struct AppConfig {
    /// List the voices of the configured engine and exit
    #[arg(long)]
    pub list_voices: bool,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Report which speech engines are reachable and exit
    #[arg(long)]
    pub check_engines: bool,

    /// Describe a VOICEVOX speaker style id and exit
    #[arg(long, value_name = "ID")]
    pub speaker_info: Option<i64>,

    /// Speech engine: 'primary' (VOICEVOX, falls back to the OS voice) or 'fallback' (OS voice only)
    #[arg(long, short = 'e', env = "TTS_ENGINE", value_enum, default_value = "primary")]
    pub engine: EngineKind,

    /// Voice for the configured engine (OS voice name, or VOICEVOX speaker id)
    #[arg(long, env = "TTS_VOICE")]
    pub voice: Option<String>,

    /// Speaking rate of the OS voice in words per minute (80-500)
    #[arg(long, env = "TTS_RATE", default_value = "180")]
    pub rate: u32,

    /// Volume of the OS voice (0.0 - 1.0)
    #[arg(long, env = "TTS_VOLUME", default_value = "1.0")]
    pub volume: f32,

    /// VOICEVOX host name or base URL
    #[arg(long, env = "VOICEVOX_HOST", default_value = "127.0.0.1")]
    pub voicevox_host: String,

    /// VOICEVOX port
    #[arg(long, env = "VOICEVOX_PORT", default_value = "50021")]
    pub voicevox_port: u16,

    /// Default VOICEVOX speaker style id (3 = ずんだもん ノーマル)
    #[arg(long, env = "VOICEVOX_SPEAKER", default_value = "3")]
    pub speaker_id: i64,

    /// VOICEVOX speedScale
    #[arg(long, env = "VOICEVOX_SPEED", default_value = "1.0")]
    pub speed: f32,

    /// VOICEVOX pitchScale
    #[arg(long, env = "VOICEVOX_PITCH", default_value = "0.0")]
    pub pitch: f32,

    /// VOICEVOX intonationScale
    #[arg(long, env = "VOICEVOX_INTONATION", default_value = "1.0")]
    pub intonation: f32,

    /// VOICEVOX volumeScale
    #[arg(long, env = "VOICEVOX_VOLUME", default_value = "1.0")]
    pub volume_scale: f32,

    /// Output device captured by the voice chat application as a microphone
    #[arg(long, short = 's', env = "VIRTUAL_SINK")]
    pub virtual_sink: Option<String>,

    /// Output device for hearing the speech locally
    #[arg(long, short = 'm', env = "MONITOR_DEVICE")]
    pub monitor: Option<String>,

    /// Play every message on both the virtual sink and the monitor device
    #[arg(long, env = "DUAL_OUTPUT")]
    pub dual_output: bool,

    /// Player: 'auto', 'process' (platform player command) or 'stream' (in-process)
    #[arg(long, env = "PLAYER", value_enum, default_value = "auto")]
    pub player: PlayerKind,

    /// Cut messages longer than this many characters
    #[arg(long, env = "MAX_CHARS")]
    pub max_chars: Option<usize>,

    /// Prefix every message with its author's name
    #[arg(long, env = "READ_AUTHOR")]
    pub read_author: bool,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments and environment.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Whether a one-shot command was requested instead of the bridge.
    pub fn one_shot(&self) -> bool {
        self.list_voices || self.list_devices || self.check_engines || self.speaker_info.is_some()
    }

    /// Primary engine connection settings.
    pub fn primary_connection(&self) -> PrimaryConnection {
        PrimaryConnection {
            host: self.voicevox_host.clone(),
            port: self.voicevox_port,
            speaker_id: self.speaker_id,
            speed: self.speed,
            pitch: self.pitch,
            intonation: self.intonation,
            volume_scale: self.volume_scale,
        }
    }

    /// Voice for the configured engine.
    pub fn voice_params(&self) -> VoiceParams {
        VoiceParams { voice_id: self.voice.clone(), rate: self.rate, volume: self.volume }
    }

    /// Dual when requested and a monitor device is configured.
    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.dual_output && self.monitor.is_some() { DeliveryMode::Dual } else { DeliveryMode::Single }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(80..=500).contains(&self.rate) {
            anyhow::bail!("Rate must be between 80 and 500 words per minute, got {}", self.rate);
        }

        if !(0.0..=1.0).contains(&self.volume) {
            anyhow::bail!("Volume must be between 0.0 and 1.0");
        }

        if self.speed <= 0.0 {
            anyhow::bail!("VOICEVOX speed must be positive");
        }

        if self.voicevox_port == 0 {
            anyhow::bail!("VOICEVOX port must not be 0");
        }

        if self.voicevox_host.trim().is_empty() {
            anyhow::bail!("VOICEVOX host must not be empty");
        }

        if self.dual_output && self.monitor.is_none() {
            anyhow::bail!("--dual-output requires --monitor");
        }

        if let (Some(sink), Some(monitor)) = (&self.virtual_sink, &self.monitor)
            && sink == monitor
        {
            anyhow::bail!("Monitor device must differ from the virtual sink ({})", sink);
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Engine: {}", self.engine);
        if self.engine == EngineKind::Primary {
            info!("  VOICEVOX: {} (speaker {})", self.primary_connection().base_url(), self.speaker_id);
            info!("  Prosody: speed {}, pitch {}, intonation {}, volume {}", self.speed, self.pitch, self.intonation, self.volume_scale);
        }
        info!("  Voice: {}", self.voice.as_deref().unwrap_or("default"));
        info!("  Rate: {} wpm, volume: {}", self.rate, self.volume);
        info!("  Virtual sink: {}", self.virtual_sink.as_deref().unwrap_or("(current output)"));
        if let Some(ref monitor) = self.monitor {
            info!("  Monitor: {}", monitor);
        }
        info!("  Delivery: {:?}", self.delivery_mode());
        info!("  Player: {:?}", self.player);
        if let Some(max) = self.max_chars {
            info!("  Max characters: {}", max);
        }
        if self.read_author {
            info!("  Reading author names");
        }

        match serde_json::to_string(self) {
            Ok(dump) => debug!("Effective configuration: {}", dump),
            Err(e) => debug!("Could not serialize configuration: {}", e),
        }
    }
}
