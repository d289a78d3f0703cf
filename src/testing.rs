//! Hand-written fakes for the engine, device and player capabilities.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::audio::device::SwitchDevice;
use crate::audio::playback::PlayBuffer;
use crate::error::{DeliveryError, DeviceSwitchError, SynthesisError};
use crate::tts::{AudioFormat, EngineKind, SpeechRequest, SynthesisResult, SynthesizeVoice, VoiceInfo, VoiceParams};

/// Engine that echoes the text as a WAV-tagged buffer, or always fails.
pub struct FakeEngine {
    kind: EngineKind,
    fail: bool,
    pub calls: AtomicUsize,
    pub voices_seen: Mutex<Vec<VoiceParams>>,
    pub texts_seen: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new(kind: EngineKind, fail: bool) -> Arc<Self> {
        Arc::new(Self { kind, fail, calls: AtomicUsize::new(0), voices_seen: Mutex::new(Vec::new()), texts_seen: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl SynthesizeVoice for FakeEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesisResult, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.voices_seen.lock().push(request.voice().clone());
        self.texts_seen.lock().push(request.text().to_string());
        if self.fail {
            return Err(SynthesisError::engine(self.kind, "fake engine down"));
        }
        Ok(SynthesisResult::container(request.text().as_bytes().to_vec(), AudioFormat::Wav, self.kind))
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError> {
        Ok(vec![VoiceInfo { id: self.kind.to_string(), name: "fake".into(), style: None }])
    }

    async fn is_available(&self) -> bool {
        !self.fail
    }
}

/// In-memory output device state.
pub struct FakeSwitch {
    current: Mutex<String>,
    devices: Vec<String>,
    switches: Mutex<Vec<String>>,
    fail_list: AtomicBool,
    fail_switch: AtomicBool,
}

impl FakeSwitch {
    pub fn new(current: &str, devices: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(current.to_string()),
            devices: devices.iter().map(|d| d.to_string()).collect(),
            switches: Mutex::new(Vec::new()),
            fail_list: AtomicBool::new(false),
            fail_switch: AtomicBool::new(false),
        })
    }

    pub fn current_name(&self) -> String {
        self.current.lock().clone()
    }

    /// Every switch the backend was asked to perform, in order.
    pub fn switch_calls(&self) -> Vec<String> {
        self.switches.lock().clone()
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn fail_switch(&self) {
        self.fail_switch.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SwitchDevice for FakeSwitch {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn current(&self) -> Option<String> {
        Some(self.current_name())
    }

    async fn list(&self) -> Result<Vec<String>, DeviceSwitchError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(DeviceSwitchError::Command { command: "fake list".into(), message: "unavailable".into() });
        }
        Ok(self.devices.clone())
    }

    async fn switch_to(&self, device: &str) -> Result<(), DeviceSwitchError> {
        self.switches.lock().push(device.to_string());
        if self.fail_switch.load(Ordering::SeqCst) {
            return Err(DeviceSwitchError::Command { command: format!("fake switch {device}"), message: "refused".into() });
        }
        *self.current.lock() = device.to_string();
        Ok(())
    }
}

/// One recorded playback.
#[derive(Debug, Clone, PartialEq)]
pub struct Played {
    pub format: AudioFormat,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub device: Option<String>, // Explicit target passed by the caller
    pub active: Option<String>, // Default output at the time of playback
}

/// Player that records what it was asked to play.
pub struct FakePlayer {
    targets: bool,
    switch: Option<Arc<FakeSwitch>>,
    played: Mutex<Vec<Played>>,
    fail_on: Mutex<Option<String>>,
    hold: Mutex<Option<Arc<Notify>>>,
    calls: AtomicUsize,
}

impl FakePlayer {
    /// Create a player. `targets` decides whether it addresses devices directly.
    pub fn new(targets: bool, switch: Option<Arc<FakeSwitch>>) -> Arc<Self> {
        Arc::new(Self {
            targets,
            switch,
            played: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            hold: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// Fail every playback whose effective device is `device`.
    pub fn fail_on(&self, device: &str) {
        *self.fail_on.lock() = Some(device.to_string());
    }

    /// Block the next playback until `gate` is notified. Later playbacks run freely.
    pub fn hold_until(&self, gate: Arc<Notify>) {
        *self.hold.lock() = Some(gate);
    }

    pub fn played(&self) -> Vec<Played> {
        self.played.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlayBuffer for FakePlayer {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn targets_devices(&self) -> bool {
        self.targets
    }

    async fn play(&self, audio: &SynthesisResult, device: Option<&str>) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.hold.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let active = self.switch.as_ref().map(|s| s.current_name());
        let effective = device.map(str::to_string).or_else(|| active.clone());
        self.played.lock().push(Played {
            format: audio.format,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            device: device.map(str::to_string),
            active,
        });

        let fail_on = self.fail_on.lock().clone();
        if fail_on.is_some() && fail_on == effective {
            return Err(DeliveryError::Player { player: "fake".into(), message: format!("cannot play on {}", fail_on.unwrap_or_default()) });
        }
        Ok(())
    }
}
