//! In-process playback using cpal.
//!
//! Each buffer gets its own output stream opened on the requested device.
//! Samples are queued into a lock-free ring buffer before the stream starts
//! so the audio callback never waits on a lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, StreamConfig, SupportedStreamConfig};
use parking_lot::{Condvar, Mutex};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, warn};

use super::playback::PlayBuffer;
use super::util::{DecodedAudio, decode, find_best_config, get_device_name, map_channels};
use crate::error::DeliveryError;
use crate::tts::SynthesisResult;

/// Slack added to the buffer duration before playback is declared stuck
const PLAYBACK_GRACE: Duration = Duration::from_secs(1);

/// Time left for the device to drain its last callback buffer
const DRAIN_TAIL: Duration = Duration::from_millis(50);

/// cpal output stream per buffer. Plays WAV and raw PCM at their native rate.
#[derive(Debug, Default, Clone)]
pub struct StreamPlayer;

impl StreamPlayer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlayBuffer for StreamPlayer {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn targets_devices(&self) -> bool {
        true
    }

    async fn play(&self, audio: &SynthesisResult, device: Option<&str>) -> Result<(), DeliveryError> {
        let decoded = decode(audio)?;
        let device = device.map(str::to_string);

        let stop = Arc::new(AtomicBool::new(false));
        let _stop_on_drop = StopOnDrop(stop.clone());

        tokio::task::spawn_blocking(move || play_blocking(decoded, device.as_deref(), &stop))
            .await
            .map_err(|e| stream_error(e.into()))?
    }
}

/// Silences the stream when the playing future is dropped.
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn find_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match name {
        None => host.default_output_device().context("No output device available"),
        Some(name) => host
            .output_devices()
            .context("Failed to enumerate output devices")?
            .find(|device| get_device_name(device) == name)
            .with_context(|| format!("Output device not found: {name}")),
    }
}

fn stream_error(e: anyhow::Error) -> DeliveryError {
    DeliveryError::Player { player: "stream".into(), message: format!("{e:#}") }
}

/// Play decoded samples and block until the buffer has drained.
fn play_blocking(audio: DecodedAudio, device_name: Option<&str>, stop: &Arc<AtomicBool>) -> Result<(), DeliveryError> {
    if audio.samples.is_empty() {
        return Ok(());
    }

    let device = find_device(device_name).map_err(|e| DeliveryError::Device(format!("{e:#}")))?;
    let supported_configs = device.supported_output_configs().map_err(|e| DeliveryError::Device(format!("{}: {e}", get_device_name(&device))))?;
    let config = find_best_config(supported_configs, audio.sample_rate, audio.channels).map_err(|e| DeliveryError::UnsupportedFormat(format!("{e:#}")))?;

    drain(&device, &config, &audio, stop).map_err(stream_error)
}

/// Open the output stream, feed it every sample and wait until it ran dry.
fn drain(device: &Device, config: &SupportedStreamConfig, audio: &DecodedAudio, stop: &Arc<AtomicBool>) -> Result<()> {
    let samples = map_channels(&audio.samples, audio.channels as usize, config.channels() as usize);
    debug!("Playing {} samples at {} Hz on {}", samples.len(), audio.sample_rate, get_device_name(device));

    let ring = HeapRb::<f32>::new(samples.len());
    let (mut producer, mut consumer) = ring.split();
    let queued = producer.push_slice(&samples);
    if queued < samples.len() {
        warn!("Playback buffer overflow, dropped {} samples", samples.len() - queued);
    }

    let finished = Arc::new(AtomicBool::new(false));
    let finished_lock = Arc::new(Mutex::new(()));
    let finished_signal = Arc::new(Condvar::new());

    let stop_cb = stop.clone();
    let finished_cb = finished.clone();
    let finished_lock_cb = finished_lock.clone();
    let finished_signal_cb = finished_signal.clone();

    let stream_config: StreamConfig = config.config();
    let err_fn = |err| {
        tracing::error!("Audio playback error: {}", err);
    };

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let stopped = stop_cb.load(Ordering::Relaxed);
            for sample in data.iter_mut() {
                *sample = if stopped { 0.0 } else { consumer.try_pop().unwrap_or(0.0) };
            }

            if stopped || consumer.is_empty() {
                finished_cb.store(true, Ordering::SeqCst);
                let _guard = finished_lock_cb.lock();
                finished_signal_cb.notify_all();
            }
        },
        err_fn,
        None,
    )?;

    stream.play().context("Failed to start playback stream")?;

    let frames = samples.len() / config.channels().max(1) as usize;
    let deadline = Instant::now() + Duration::from_secs_f64(frames as f64 / audio.sample_rate as f64) + PLAYBACK_GRACE;

    let mut guard = finished_lock.lock();
    while !finished.load(Ordering::SeqCst) {
        if Instant::now() > deadline {
            anyhow::bail!("playback timeout exceeded");
        }
        finished_signal.wait_for(&mut guard, Duration::from_millis(50));
    }
    drop(guard);

    if !stop.load(Ordering::SeqCst) {
        std::thread::sleep(DRAIN_TAIL);
    }
    debug!("Playback completed");
    Ok(())
}
