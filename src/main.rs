//! Chat Voice Bridge - speaks chat messages on a virtual microphone.
//!
//! Messages are cleaned up for speech, synthesized by a local VOICEVOX
//! service (falling back to the OS voice), and played on a virtual output
//! device that a voice chat application captures, optionally also on a
//! monitor device for the operator.

mod audio;
mod config;
mod error;
mod pipeline;
mod platform;
#[cfg(test)]
mod testing;
mod text;
mod tts;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use audio::{AudioDelivery, DeviceRole, DeviceRouter, build_player, platform_backend};
use config::AppConfig;
use pipeline::{ChatEvent, Outcome, Pipeline, PipelineState, spawn_stdin_source};
use platform::Platform;
use text::Normalizer;
use tts::{EngineKind, SynthesizeVoice, Synthesizer, SystemEngine, VoicevoxEngine};

/// Capacity of the inbound event queue.
const EVENT_QUEUE: usize = 32;

/// How long shutdown waits for the in-flight message.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Message counts reported at shutdown.
#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    dropped: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, done: Result<Outcome, tokio::task::JoinError>) {
        match done {
            Ok(outcome) if outcome.is_success() => self.completed += 1,
            Ok(Outcome::Dropped) => self.dropped += 1,
            Ok(_) => self.failed += 1,
            Err(e) => {
                error!("Message task panicked: {}", e);
                self.failed += 1;
            }
        }
    }
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} completed, {} dropped, {} failed", self.completed, self.dropped, self.failed)
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown(shutdown: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
    }

    shutdown.cancel();
}

/// Run a one-shot command and return.
///
/// # Errors
/// Returns an error when the requested information cannot be produced.
async fn run_one_shot(config: &AppConfig, synthesizer: &Synthesizer, router: &DeviceRouter) -> Result<()> {
    if config.list_voices {
        let voices = match synthesizer.list_voices().await {
            Ok(voices) => voices,
            Err(e) if synthesizer.kind() == EngineKind::Primary => {
                warn!("Could not list VOICEVOX speakers ({}), showing well-known styles", e);
                config::voices::builtin_voices()
            }
            Err(e) => return Err(e.into()),
        };
        println!("{:<8} VOICE", "ID");
        println!("{}", "─".repeat(50));
        for voice in &voices {
            println!("{}", voice);
        }
        println!("\n{} voices ({} engine)", voices.len(), synthesizer.kind());
    }

    if config.list_devices {
        let current = router.current().await;
        let devices = router.list().await;
        if devices.is_empty() {
            println!("No output devices found");
        }
        for device in &devices {
            let marker = if current.as_ref().is_some_and(|c| c.name == device.name) { "*" } else { " " };
            println!("{} {}", marker, device);
        }
    }

    if config.check_engines {
        for (kind, available) in synthesizer.availability().await {
            println!("{} {} engine", if available { "✅" } else { "❌" }, kind);
        }
    }

    if let Some(id) = config.speaker_info {
        let engine = VoicevoxEngine::new(config.primary_connection())?;
        match engine.describe_speaker(id).await {
            Some(label) => println!("Speaker {}: {}", id, label),
            None => anyhow::bail!("Unknown speaker id {}", id),
        }
    }

    Ok(())
}

/// Warn about configuration that will not work as expected.
async fn preflight(synthesizer: &Synthesizer, router: &DeviceRouter) {
    for (kind, available) in synthesizer.availability().await {
        if !available {
            warn!("⚠️  The {} engine is not available", kind);
        }
    }

    let devices = router.list().await;
    if devices.is_empty() {
        return;
    }
    for configured in [router.sink(), router.monitor()].into_iter().flatten() {
        if !devices.iter().any(|d| d.name == configured.name) {
            warn!("⚠️  Output device not found: {}", configured);
        }
    }
    debug!("{} output devices, sink present: {}", devices.len(), devices.iter().any(|d| d.role == DeviceRole::VirtualSink));
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🎤 Chat Voice Bridge v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    let platform = Platform::current();
    debug!("Platform: {}", platform);

    let primary: Option<Arc<dyn SynthesizeVoice>> = match config.engine {
        EngineKind::Primary => Some(Arc::new(VoicevoxEngine::new(config.primary_connection())?)),
        EngineKind::Fallback => None,
    };
    let fallback: Arc<dyn SynthesizeVoice> = Arc::new(SystemEngine::new(platform));
    let synthesizer = Synthesizer::new(config.engine, primary, fallback, config.voice_params());

    let router = Arc::new(DeviceRouter::new(platform_backend(platform), config.virtual_sink.clone(), config.monitor.clone()));

    if config.one_shot() {
        return run_one_shot(&config, &synthesizer, &router).await;
    }

    config.log_config();
    preflight(&synthesizer, &router).await;

    let delivery = AudioDelivery::new(build_player(config.player, platform), router.clone());
    let pipeline = Arc::new(Pipeline::new(
        Normalizer::new(config.max_chars),
        synthesizer,
        router,
        delivery,
        config.delivery_mode(),
        config.read_author,
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    let (event_tx, mut event_rx) = mpsc::channel::<ChatEvent>(EVENT_QUEUE);
    let _source = spawn_stdin_source(event_tx)?;

    info!("Listening for messages on stdin...");

    // One task per event: a busy pipeline drops the event instead of queueing it
    let mut in_flight = JoinSet::new();
    let mut tally = Tally::default();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = event_rx.recv() => {
                let Some(event) = event else {
                    info!("Input closed");
                    break;
                };
                let pipeline = pipeline.clone();
                in_flight.spawn(async move {
                    let outcome = pipeline.handle(&event.text, &event.author).await;
                    debug!("Message from {}: {:?}", event.author, outcome);
                    outcome
                });
                while let Some(done) = in_flight.try_join_next() {
                    tally.record(done);
                }
            }
        }
    }

    if !in_flight.is_empty() {
        if pipeline.state() == PipelineState::Busy {
            info!("Waiting for the current message to finish...");
        }
        let settled = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(done) = in_flight.join_next().await {
                tally.record(done);
            }
        })
        .await;
        if settled.is_err() {
            warn!("Message still playing after {:?}, exiting anyway", SHUTDOWN_GRACE);
        }
    }

    info!("✅ Chat Voice Bridge stopped ({})", tally);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, SynthesisError};

    #[test]
    fn test_tally_counts_outcomes() {
        let mut tally = Tally::default();
        tally.record(Ok(Outcome::Spoken { engine: EngineKind::Primary }));
        tally.record(Ok(Outcome::Skipped));
        tally.record(Ok(Outcome::Dropped));
        tally.record(Ok(Outcome::Failed(PipelineError::Synthesis(SynthesisError::EmptyText))));

        assert_eq!(tally.to_string(), "2 completed, 1 dropped, 1 failed");
    }
}
