//! Primary engine: a local VOICEVOX-compatible synthesis service.
//!
//! Synthesis is two sequential calls: `/audio_query` builds a query object
//! from the text, `/synthesis` renders the (parameter-adjusted) query to WAV.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{AudioFormat, EngineKind, SpeechRequest, SynthesisResult, SynthesizeVoice, VoiceInfo};
use crate::config::voices;
use crate::error::SynthesisError;

/// Timeout for synthesis calls (long texts take a while on CPU).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the `/version` availability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Connection and prosody settings for the primary engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryConnection {
    pub host: String,      // Host name or base URL
    pub port: u16,         // Service port (VOICEVOX default 50021)
    pub speaker_id: i64,   // Default speaker style id
    pub speed: f32,        // speedScale
    pub pitch: f32,        // pitchScale
    pub intonation: f32,   // intonationScale
    pub volume_scale: f32, // volumeScale
}

impl PrimaryConnection {
    /// Base URL of the service, with `http://` added when the host has no scheme.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }
}

#[derive(Debug, Deserialize)]
struct Speaker {
    name: String,
    #[serde(default)]
    speaker_uuid: String,
    #[serde(default)]
    styles: Vec<SpeakerStyle>,
}

#[derive(Debug, Deserialize)]
struct SpeakerStyle {
    name: String,
    id: i64,
}

/// HTTP client for the primary engine.
pub struct VoicevoxEngine {
    client: Client,
    base_url: String,
    connection: PrimaryConnection,
}

impl VoicevoxEngine {
    /// Create a client for the configured service.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(connection: PrimaryConnection) -> Result<Self> {
        let base_url = connection.base_url();
        info!("Primary engine at {} (speaker {})", base_url, connection.speaker_id);

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().context("Failed to create HTTP client")?;

        Ok(Self { client, base_url, connection })
    }

    /// Speaker id for a request: the request's voice id when numeric, else the configured one.
    fn speaker_for(&self, request: &SpeechRequest) -> i64 {
        request.voice().voice_id.as_deref().and_then(|id| id.trim().parse().ok()).unwrap_or(self.connection.speaker_id)
    }

    /// Overwrite the prosody fields of an audio query with the configured values.
    fn apply_prosody(&self, query: &mut Value) -> Result<(), SynthesisError> {
        let object = query.as_object_mut().ok_or_else(|| fail("audio_query did not return a JSON object"))?;
        object.insert("speedScale".into(), json!(self.connection.speed));
        object.insert("pitchScale".into(), json!(self.connection.pitch));
        object.insert("intonationScale".into(), json!(self.connection.intonation));
        object.insert("volumeScale".into(), json!(self.connection.volume_scale));
        Ok(())
    }

    async fn speakers(&self) -> Result<Vec<Speaker>, SynthesisError> {
        let response = self
            .client
            .get(format!("{}/speakers", self.base_url))
            .send()
            .await
            .map_err(|e| fail(format!("speakers request failed: {e}")))?;
        let response = check_status(response, "speakers")?;
        response.json().await.map_err(|e| fail(format!("invalid speakers response: {e}")))
    }

    /// Descriptive label for a speaker style id.
    ///
    /// Asks the service first and falls back to the built-in table of
    /// well-known VOICEVOX styles.
    pub async fn describe_speaker(&self, id: i64) -> Option<String> {
        if let Ok(speakers) = self.speakers().await {
            for speaker in &speakers {
                if let Some(style) = speaker.styles.iter().find(|s| s.id == id) {
                    return Some(format!("{} ({})", speaker.name, style.name));
                }
            }
        }
        voices::speaker_label(id)
    }
}

#[async_trait]
impl SynthesizeVoice for VoicevoxEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Primary
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesisResult, SynthesisError> {
        let speaker = self.speaker_for(request);
        debug!("audio_query (speaker {}): \"{}\"", speaker, request.text());

        let query_url = format!("{}/audio_query?text={}&speaker={}", self.base_url, urlencoding::encode(request.text()), speaker);
        let response = self.client.post(&query_url).send().await.map_err(|e| fail(format!("audio_query request failed: {e}")))?;
        let response = check_status(response, "audio_query")?;
        let mut query: Value = response.json().await.map_err(|e| fail(format!("invalid audio_query response: {e}")))?;

        self.apply_prosody(&mut query)?;

        let synthesis_url = format!("{}/synthesis?speaker={}", self.base_url, speaker);
        let response = self.client.post(&synthesis_url).json(&query).send().await.map_err(|e| fail(format!("synthesis request failed: {e}")))?;
        let response = check_status(response, "synthesis")?;
        let audio = response.bytes().await.map_err(|e| fail(format!("failed to read synthesis audio: {e}")))?;

        if audio.is_empty() {
            return Err(fail("synthesis returned no audio"));
        }

        debug!("Primary engine produced {} bytes", audio.len());
        Ok(SynthesisResult::container(audio.to_vec(), AudioFormat::Wav, EngineKind::Primary))
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError> {
        let speakers = self.speakers().await?;
        let voices = speakers
            .into_iter()
            .flat_map(|speaker| {
                debug!("Speaker {} ({})", speaker.name, speaker.speaker_uuid);
                let name = speaker.name;
                speaker.styles.into_iter().map(move |style| VoiceInfo { id: style.id.to_string(), name: name.clone(), style: Some(style.name) })
            })
            .collect();
        Ok(voices)
    }

    async fn is_available(&self) -> bool {
        let probe = self.client.get(format!("{}/version", self.base_url)).timeout(PROBE_TIMEOUT).send();
        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(e)) => {
                debug!("Primary engine probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Primary engine probe timed out");
                false
            }
        }
    }
}

fn fail(message: impl Into<String>) -> SynthesisError {
    SynthesisError::engine(EngineKind::Primary, message)
}

fn check_status(response: Response, call: &str) -> Result<Response, SynthesisError> {
    let status = response.status();
    if status.is_success() { Ok(response) } else { Err(fail(format!("{call} returned HTTP {status}"))) }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::Router;
    use axum::extract::{Json, Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use parking_lot::Mutex;

    use super::*;
    use crate::tts::VoiceParams;

    #[derive(Default)]
    struct Seen {
        query_params: Vec<HashMap<String, String>>,
        synthesis_body: Option<Value>,
    }

    type Shared = Arc<Mutex<Seen>>;

    async fn audio_query(State(seen): State<Shared>, Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        seen.lock().query_params.push(params);
        Json(json!({ "accent_phrases": [], "speedScale": 1.0, "pitchScale": 0.0 }))
    }

    async fn synthesis(State(seen): State<Shared>, Query(params): Query<HashMap<String, String>>, Json(body): Json<Value>) -> Vec<u8> {
        let mut seen = seen.lock();
        seen.query_params.push(params);
        seen.synthesis_body = Some(body);
        b"RIFF\x24\x00\x00\x00WAVE".to_vec()
    }

    async fn speakers() -> Json<Value> {
        Json(json!([
            { "name": "Zundamon", "speaker_uuid": "abc", "styles": [{ "name": "Normal", "id": 3 }, { "name": "Sweet", "id": 1 }] }
        ]))
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn connection(addr: SocketAddr) -> PrimaryConnection {
        PrimaryConnection { host: addr.ip().to_string(), port: addr.port(), speaker_id: 3, speed: 1.25, pitch: 0.05, intonation: 1.1, volume_scale: 0.8 }
    }

    fn request(text: &str) -> SpeechRequest {
        SpeechRequest::new(text, VoiceParams { voice_id: None, rate: 180, volume: 1.0 }).unwrap()
    }

    #[tokio::test]
    async fn test_synthesize_runs_query_then_synthesis() {
        let seen: Shared = Arc::default();
        let router = Router::new()
            .route("/audio_query", post(audio_query))
            .route("/synthesis", post(synthesis))
            .with_state(seen.clone());
        let addr = serve(router).await;

        let engine = VoicevoxEngine::new(connection(addr)).unwrap();
        let result = engine.synthesize(&request("hello world")).await.unwrap();

        assert_eq!(result.engine, EngineKind::Primary);
        assert_eq!(result.format, AudioFormat::Wav);
        assert!(result.audio.starts_with(b"RIFF"));

        let seen = seen.lock();
        assert_eq!(seen.query_params[0].get("text").map(String::as_str), Some("hello world"));
        assert_eq!(seen.query_params[0].get("speaker").map(String::as_str), Some("3"));
        assert_eq!(seen.query_params[1].get("speaker").map(String::as_str), Some("3"));

        let body = seen.synthesis_body.as_ref().unwrap();
        assert!((body["speedScale"].as_f64().unwrap() - 1.25).abs() < 1e-6);
        assert!((body["volumeScale"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!(body["accent_phrases"].is_array());
    }

    #[tokio::test]
    async fn test_request_voice_id_selects_speaker() {
        let seen: Shared = Arc::default();
        let router = Router::new()
            .route("/audio_query", post(audio_query))
            .route("/synthesis", post(synthesis))
            .with_state(seen.clone());
        let addr = serve(router).await;

        let engine = VoicevoxEngine::new(connection(addr)).unwrap();
        let request = SpeechRequest::new("hi", VoiceParams { voice_id: Some("8".into()), rate: 180, volume: 1.0 }).unwrap();
        engine.synthesize(&request).await.unwrap();

        assert_eq!(seen.lock().query_params[0].get("speaker").map(String::as_str), Some("8"));
    }

    #[tokio::test]
    async fn test_query_failure_is_primary_error() {
        let router = Router::new().route("/audio_query", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let addr = serve(router).await;

        let engine = VoicevoxEngine::new(connection(addr)).unwrap();
        match engine.synthesize(&request("hello")).await {
            Err(SynthesisError::Engine { engine, message }) => {
                assert_eq!(engine, EngineKind::Primary);
                assert!(message.contains("audio_query"), "{}", message);
            }
            other => panic!("expected primary engine error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_speakers_are_listed_and_described() {
        let router = Router::new().route("/speakers", get(speakers)).route("/version", get(|| async { "\"0.14.0\"" }));
        let addr = serve(router).await;

        let engine = VoicevoxEngine::new(connection(addr)).unwrap();
        let voices = engine.list_voices().await.unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0], VoiceInfo { id: "3".into(), name: "Zundamon".into(), style: Some("Normal".into()) });

        assert_eq!(engine.describe_speaker(1).await.as_deref(), Some("Zundamon (Sweet)"));
        assert!(engine.is_available().await);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let engine = VoicevoxEngine::new(connection(addr)).unwrap();
        assert!(!engine.is_available().await);
        assert!(engine.synthesize(&request("hello")).await.is_err());
        // Built-in table still answers for well-known styles
        assert!(engine.describe_speaker(3).await.is_some());
    }

    #[tokio::test]
    async fn test_slow_service_is_unavailable() {
        let router = Router::new().route(
            "/version",
            get(|| async {
                tokio::time::sleep(PROBE_TIMEOUT + Duration::from_secs(2)).await;
                "\"0.14.0\""
            }),
        );
        let addr = serve(router).await;

        let engine = VoicevoxEngine::new(connection(addr)).unwrap();
        let started = std::time::Instant::now();
        assert!(!engine.is_available().await);
        assert!(started.elapsed() < PROBE_TIMEOUT + Duration::from_secs(1));
    }

    #[test]
    fn test_base_url_keeps_explicit_scheme() {
        let mut conn = connection("127.0.0.1:50021".parse().unwrap());
        assert_eq!(conn.base_url(), "http://127.0.0.1:50021");
        conn.host = "https://tts.local/".into();
        assert_eq!(conn.base_url(), "https://tts.local:50021");
    }
}
