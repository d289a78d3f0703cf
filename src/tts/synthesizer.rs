//! Engine selection with one-level automatic fallback.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{EngineKind, SpeechRequest, SynthesisResult, SynthesizeVoice, VoiceInfo, VoiceParams};
use crate::error::SynthesisError;

/// Speech synthesizer combining the configured engine with the OS fallback.
///
/// The engine choice is fixed at construction. When the primary engine is
/// configured and fails, the same text is retried once on the fallback engine
/// with default fallback voice parameters. The fallback engine is never retried.
pub struct Synthesizer {
    primary: Option<Arc<dyn SynthesizeVoice>>, // Network engine (None when not configured)
    fallback: Arc<dyn SynthesizeVoice>,        // OS voice
    kind: EngineKind,                          // Configured engine
    voice: VoiceParams,                        // Voice for the configured engine
}

impl Synthesizer {
    /// Create a synthesizer.
    ///
    /// # Arguments
    /// * `kind` - Configured engine
    /// * `primary` - Primary engine, required when `kind` is `Primary`
    /// * `fallback` - OS engine, always present
    /// * `voice` - Voice parameters for the configured engine
    pub fn new(kind: EngineKind, primary: Option<Arc<dyn SynthesizeVoice>>, fallback: Arc<dyn SynthesizeVoice>, voice: VoiceParams) -> Self {
        let kind = match (kind, &primary) {
            (EngineKind::Primary, None) => {
                warn!("Primary engine requested but not available, using the OS voice");
                EngineKind::Fallback
            }
            _ => kind,
        };
        info!("Speech engine: {} (voice: {})", kind, voice.voice_id.as_deref().unwrap_or("default"));
        Self { primary, fallback, kind, voice }
    }

    /// Configured engine.
    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Synthesize speakable text.
    ///
    /// # Errors
    /// Returns `SynthesisError::Exhausted` when the primary engine and its
    /// fallback both failed, or the fallback engine's error when it is the
    /// configured engine.
    pub async fn synthesize(&self, text: &str) -> Result<SynthesisResult, SynthesisError> {
        let request = SpeechRequest::new(text, self.voice.clone())?;

        let primary = match (self.kind, &self.primary) {
            (EngineKind::Primary, Some(primary)) => primary,
            _ => return self.fallback.synthesize(&request).await,
        };

        let primary_error = match primary.synthesize(&request).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        warn!("Primary engine failed ({}), retrying with the OS voice", primary_error);
        let fallback_request = SpeechRequest::new(text, VoiceParams::fallback_default())?;

        match self.fallback.synthesize(&fallback_request).await {
            Ok(result) => {
                debug!("Fallback engine recovered the request");
                Ok(result)
            }
            Err(fallback_error) => Err(SynthesisError::Exhausted { primary: Box::new(primary_error), fallback: Box::new(fallback_error) }),
        }
    }

    /// Voices of the configured engine.
    ///
    /// # Errors
    /// Returns the engine's error when the listing cannot be retrieved.
    pub async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError> {
        self.active().list_voices().await
    }

    /// Availability of every configured engine, primary first.
    pub async fn availability(&self) -> Vec<(EngineKind, bool)> {
        let mut report = Vec::with_capacity(2);
        if let Some(primary) = &self.primary {
            report.push((EngineKind::Primary, primary.is_available().await));
        }
        report.push((EngineKind::Fallback, self.fallback.is_available().await));
        report
    }

    fn active(&self) -> &Arc<dyn SynthesizeVoice> {
        match (self.kind, &self.primary) {
            (EngineKind::Primary, Some(primary)) => primary,
            _ => &self.fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::FakeEngine;

    fn configured_voice() -> VoiceParams {
        VoiceParams { voice_id: Some("3".into()), rate: 220, volume: 0.7 }
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_with_default_voice() {
        let primary = FakeEngine::new(EngineKind::Primary, true);
        let fallback = FakeEngine::new(EngineKind::Fallback, false);
        let synth = Synthesizer::new(EngineKind::Primary, Some(primary.clone() as Arc<dyn SynthesizeVoice>), fallback.clone(), configured_voice());

        let result = synth.synthesize("hello").await.unwrap();

        assert_eq!(result.engine, EngineKind::Fallback);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.voices_seen.lock()[0], VoiceParams::fallback_default());
        assert_eq!(primary.voices_seen.lock()[0], configured_voice());
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = FakeEngine::new(EngineKind::Primary, false);
        let fallback = FakeEngine::new(EngineKind::Fallback, false);
        let synth = Synthesizer::new(EngineKind::Primary, Some(primary.clone() as Arc<dyn SynthesizeVoice>), fallback.clone(), configured_voice());

        let result = synth.synthesize("hello").await.unwrap();

        assert_eq!(result.engine, EngineKind::Primary);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_failing_is_exhausted_without_looping() {
        let primary = FakeEngine::new(EngineKind::Primary, true);
        let fallback = FakeEngine::new(EngineKind::Fallback, true);
        let synth = Synthesizer::new(EngineKind::Primary, Some(primary.clone() as Arc<dyn SynthesizeVoice>), fallback.clone(), configured_voice());

        let err = synth.synthesize("hello").await.unwrap_err();

        assert!(matches!(err, SynthesisError::Exhausted { .. }));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_configured_fallback_is_never_retried() {
        let primary = FakeEngine::new(EngineKind::Primary, false);
        let fallback = FakeEngine::new(EngineKind::Fallback, true);
        let synth = Synthesizer::new(EngineKind::Fallback, Some(primary.clone() as Arc<dyn SynthesizeVoice>), fallback.clone(), configured_voice());

        let err = synth.synthesize("hello").await.unwrap_err();

        assert!(matches!(err, SynthesisError::Engine { engine: EngineKind::Fallback, .. }));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.voices_seen.lock()[0], configured_voice());
    }

    #[tokio::test]
    async fn test_missing_primary_uses_fallback_and_reports_availability() {
        let fallback = FakeEngine::new(EngineKind::Fallback, false);
        let synth = Synthesizer::new(EngineKind::Primary, None, fallback.clone(), configured_voice());

        assert_eq!(synth.kind(), EngineKind::Fallback);
        assert_eq!(synth.availability().await, vec![(EngineKind::Fallback, true)]);
        assert_eq!(synth.list_voices().await.unwrap()[0].id, "fallback");
    }

    #[tokio::test]
    async fn test_blank_text_never_reaches_an_engine() {
        let primary = FakeEngine::new(EngineKind::Primary, false);
        let fallback = FakeEngine::new(EngineKind::Fallback, false);
        let synth = Synthesizer::new(EngineKind::Primary, Some(primary.clone() as Arc<dyn SynthesizeVoice>), fallback.clone(), configured_voice());

        assert!(matches!(synth.synthesize("   ").await, Err(SynthesisError::EmptyText)));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }
}
