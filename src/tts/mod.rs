//! Text-to-speech engines.
//!
//! Two interchangeable engines sit behind the [`SynthesizeVoice`] capability:
//! a VOICEVOX-compatible HTTP service (primary) and the host OS voice
//! (fallback). [`Synthesizer`] fixes the engine choice and owns the
//! one-level fallback policy.

mod synthesizer;
pub mod system;
pub mod voicevox;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SynthesisError;

pub use synthesizer::Synthesizer;
pub use system::SystemEngine;
pub use voicevox::{PrimaryConnection, VoicevoxEngine};

/// Which engine produced (or should produce) audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Network synthesis through a VOICEVOX-compatible service
    #[default]
    Primary,
    /// Built-in OS speech command
    Fallback,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Primary => write!(f, "primary"),
            EngineKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// Voice selection shared by both engines.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    pub voice_id: Option<String>, // Engine-specific voice name or speaker id
    pub rate: u32,                // Words per minute
    pub volume: f32,              // 0.0 - 1.0
}

impl VoiceParams {
    /// Parameters used when the primary engine failed and the OS voice takes over.
    pub fn fallback_default() -> Self {
        Self { voice_id: None, rate: 180, volume: 1.0 }
    }
}

/// One synthesis job, built per chat message.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    text: String,
    voice: VoiceParams,
}

impl SpeechRequest {
    /// Create a request.
    ///
    /// # Errors
    /// Returns `SynthesisError::EmptyText` when `text` is blank.
    pub fn new(text: impl Into<String>, voice: VoiceParams) -> Result<Self, SynthesisError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        Ok(Self { text, voice })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> &VoiceParams {
        &self.voice
    }
}

/// Container or encoding of a synthesized buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Aiff,
    /// Headerless signed 16-bit little-endian PCM
    RawPcm,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav | AudioFormat::RawPcm => "wav",
            AudioFormat::Aiff => "aiff",
        }
    }
}

/// Audio produced by one engine for one request.
///
/// Deliberately not `Clone`: the buffer belongs to the pipeline invocation
/// that produced it and is dropped once delivery returns.
#[derive(Debug)]
pub struct SynthesisResult {
    pub audio: Vec<u8>,
    pub format: AudioFormat,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub engine: EngineKind,
}

impl SynthesisResult {
    /// Audio in a self-describing container (WAV, AIFF).
    pub fn container(audio: Vec<u8>, format: AudioFormat, engine: EngineKind) -> Self {
        Self { audio, format, sample_rate: None, channels: None, engine }
    }

    /// Headerless PCM; rate and channel count must travel with it.
    pub fn raw_pcm(audio: Vec<u8>, sample_rate: u32, channels: u16, engine: EngineKind) -> Self {
        Self { audio, format: AudioFormat::RawPcm, sample_rate: Some(sample_rate), channels: Some(channels), engine }
    }

    pub fn len(&self) -> usize {
        self.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }
}

/// A voice offered by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub style: Option<String>,
}

impl std::fmt::Display for VoiceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.style {
            Some(style) => write!(f, "{:<8} {} ({})", self.id, self.name, style),
            None => write!(f, "{:<8} {}", self.id, self.name),
        }
    }
}

/// A speech engine: text in, audio buffer out.
#[async_trait]
pub trait SynthesizeVoice: Send + Sync {
    /// Which variant this engine is.
    fn kind(&self) -> EngineKind;

    /// Synthesize one request into an in-memory buffer.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesisResult, SynthesisError>;

    /// Voices this engine can speak with.
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError>;

    /// Whether the engine currently answers. Never fails; unknown is `false`.
    async fn is_available(&self) -> bool;
}
