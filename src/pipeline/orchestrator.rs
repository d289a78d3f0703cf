//! Single-flight pipeline: normalize, synthesize, route, deliver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::audio::{AudioDelivery, DeliveryMode, DeviceRouter};
use crate::error::PipelineError;
use crate::text::{Normalized, Normalizer};
use crate::tts::{EngineKind, Synthesizer};

/// Whether an invocation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Busy,
}

/// Completion signal for one inbound message.
#[derive(Debug)]
pub enum Outcome {
    /// Audio was delivered
    Spoken { engine: EngineKind },
    /// Nothing speakable in the message
    Skipped,
    /// Another message was in flight
    Dropped,
    /// Synthesis or delivery failed
    Failed(PipelineError),
}

impl Outcome {
    /// Spoken and skipped messages completed normally.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Spoken { .. } | Outcome::Skipped)
    }
}

/// Returns the pipeline to Idle on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Chat-message-to-speech pipeline. At most one message is processed at a time.
pub struct Pipeline {
    normalizer: Normalizer,     // Text cleanup
    synthesizer: Synthesizer,   // Engine choice and fallback
    router: Arc<DeviceRouter>,  // Output device state
    delivery: AudioDelivery,    // Playback
    mode: DeliveryMode,         // Single or Dual output
    read_author: bool,          // Prefix messages with the author's name
    busy: AtomicBool,           // Single-flight flag
}

impl Pipeline {
    pub fn new(normalizer: Normalizer, synthesizer: Synthesizer, router: Arc<DeviceRouter>, delivery: AudioDelivery, mode: DeliveryMode, read_author: bool) -> Self {
        Self { normalizer, synthesizer, router, delivery, mode, read_author, busy: AtomicBool::new(false) }
    }

    pub fn state(&self) -> PipelineState {
        if self.busy.load(Ordering::SeqCst) { PipelineState::Busy } else { PipelineState::Idle }
    }

    /// Speak one chat message.
    ///
    /// Never fails: every error is logged and reported through the returned
    /// [`Outcome`]. A message arriving while another is in flight is dropped.
    pub async fn handle(&self, text: &str, author: &str) -> Outcome {
        if self.busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            warn!("⏭️  Busy, dropping message from {}", author);
            return Outcome::Dropped;
        }
        let _busy = BusyGuard(&self.busy);

        let text = match self.normalizer.normalize(text) {
            Normalized::Speak(text) => text,
            Normalized::Skip => {
                debug!("Nothing to speak in message from {}", author);
                return Outcome::Skipped;
            }
        };

        let text = match self.author_prefix(author) {
            Some(prefix) => format!("{prefix}{text}"),
            None => text,
        };
        info!("💬 {}: {}", author, text);

        let audio = match self.synthesizer.synthesize(&text).await {
            Ok(audio) => audio,
            Err(e) => {
                error!("❌ Synthesis failed: {}", e);
                return Outcome::Failed(e.into());
            }
        };
        let engine = audio.engine;

        if let Some(sink) = self.router.sink() {
            self.router.switch_or_warn(&sink).await;
        }

        match self.delivery.deliver(audio, self.mode).await {
            Ok(()) => {
                info!("🔊 Spoken with the {} engine", engine);
                Outcome::Spoken { engine }
            }
            Err(e) => {
                error!("❌ Delivery failed: {}", e);
                Outcome::Failed(e.into())
            }
        }
    }

    /// `"<author> says. "`, with the name cleaned like message text.
    fn author_prefix(&self, author: &str) -> Option<String> {
        if !self.read_author {
            return None;
        }
        self.normalizer.normalize(author).into_text().map(|name| format!("{name} says. "))
    }
}
