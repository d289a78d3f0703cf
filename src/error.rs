//! Error types for the synthesis-and-routing pipeline.
//!
//! Every failure inside one pipeline invocation is one of these typed values.
//! They are logged at the orchestrator boundary and never abort the process.

use thiserror::Error;

use crate::tts::EngineKind;

/// A speech engine could not produce audio.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("nothing to synthesize")]
    EmptyText,

    #[error("{engine} engine failed: {message}")]
    Engine { engine: EngineKind, message: String },

    #[error("both engines failed (primary: {primary}; fallback: {fallback})")]
    Exhausted { primary: Box<SynthesisError>, fallback: Box<SynthesisError> },
}

impl SynthesisError {
    pub fn engine(engine: EngineKind, message: impl Into<String>) -> Self {
        Self::Engine { engine, message: message.into() }
    }
}

/// A device query or switch failed. Always non-fatal for the pipeline.
#[derive(Debug, Error)]
pub enum DeviceSwitchError {
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("device switching is not supported by the {0} backend")]
    Unsupported(&'static str),
}

/// Playback of a synthesized buffer failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to start {player}: {source}")]
    Spawn {
        player: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{player} failed: {message}")]
    Player { player: String, message: String },

    #[error("unsupported audio for this player: {0}")]
    UnsupportedFormat(String),

    #[error("output device error: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Terminal failure of one pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
