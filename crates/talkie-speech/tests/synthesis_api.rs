//! Integration tests for the synthesis client and the speech broker,
//! against a local mock of the remote TTS API.
//!
//! # What is tested
//!
//! - Successful synthesis round-trips the audio bytes through the
//!   transport encoding
//! - Request bodies carry the text, model, and voice parameters
//! - HTTP errors surface as `RequestFailed`, aborts as `Aborted`
//! - Credential validation distinguishes rejected keys from an
//!   unreachable service
//! - The broker enforces its process-wide bound, echoes the caller's
//!   sequence, registers streams, and drops queued work on `stop_all`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use tokio::time::sleep;

use talkie_core::ports::{
    ApiKey, CredentialStore, SpeechRequest, SpeechTransport, SynthesisFailure,
};
use talkie_core::settings::VoiceSettings;
use talkie_core::types::{EncodedAudio, StreamId};
use talkie_speech::broker::SpeechBroker;
use talkie_speech::error::SpeechError;
use talkie_speech::synth::SynthesisClient;

const FAKE_AUDIO: &[u8] = b"\xFF\xF3ID3-not-really-mpeg-but-bytes";

// ── Mock API ───────────────────────────────────────────────────────

#[derive(Clone)]
struct ApiState {
    /// Response delay, to hold requests in flight.
    delay: Duration,
    /// Requests currently inside the synthesis handler.
    active: Arc<AtomicUsize>,
    /// Highest concurrency observed.
    max_active: Arc<AtomicUsize>,
    /// Total synthesis requests that reached the handler.
    hits: Arc<AtomicUsize>,
    /// Most recent request body.
    last_body: Arc<std::sync::Mutex<Option<serde_json::Value>>>,
    /// Status to answer synthesis requests with.
    status: StatusCode,
}

impl ApiState {
    fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            hits: Arc::new(AtomicUsize::new(0)),
            last_body: Arc::new(std::sync::Mutex::new(None)),
            status: StatusCode::OK,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

async fn synthesis_handler(
    State(state): State<ApiState>,
    axum::Json(body): axum::Json<serde_json::Value>,
) -> (StatusCode, Vec<u8>) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_active.fetch_max(now, Ordering::SeqCst);
    *state.last_body.lock().unwrap() = Some(body);

    sleep(state.delay).await;
    state.active.fetch_sub(1, Ordering::SeqCst);

    if state.status == StatusCode::OK {
        (StatusCode::OK, FAKE_AUDIO.to_vec())
    } else {
        (state.status, Vec::new())
    }
}

async fn voices_handler(headers: HeaderMap) -> StatusCode {
    match headers.get("xi-api-key").and_then(|v| v.to_str().ok()) {
        Some("good-key") => StatusCode::OK,
        _ => StatusCode::UNAUTHORIZED,
    }
}

/// Serve the mock API on an ephemeral port; returns its base URL.
async fn spawn_api(state: ApiState) -> String {
    let app = Router::new()
        .route("/v1/text-to-speech/:voice/stream", post(synthesis_handler))
        .route("/v1/voices", get(voices_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct FixedKey(&'static str);

#[async_trait]
impl CredentialStore for FixedKey {
    async fn get(&self) -> Option<ApiKey> {
        Some(ApiKey::new(self.0))
    }
}

fn client_for(base: String) -> SynthesisClient {
    let settings = VoiceSettings {
        api_base: base,
        ..VoiceSettings::default()
    };
    SynthesisClient::new(settings, Arc::new(FixedKey("good-key")))
}

// ── Client tests ───────────────────────────────────────────────────

#[tokio::test]
async fn synthesis_round_trips_audio_through_the_transport_encoding() {
    let state = ApiState::new();
    let last_body = Arc::clone(&state.last_body);
    let client = client_for(spawn_api(state).await);

    let audio = client.synthesize("Hello there.").await.unwrap();
    let decoded = EncodedAudio::decode_source_url(&audio.to_source_url()).unwrap();
    assert_eq!(decoded, FAKE_AUDIO);

    let body = last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["text"], "Hello there.");
    assert_eq!(body["model_id"], "eleven_turbo_v2");
    assert_eq!(body["voice_settings"]["use_speaker_boost"], true);
}

#[tokio::test]
async fn http_error_surfaces_as_request_failed() {
    let state = ApiState::new().with_status(StatusCode::INTERNAL_SERVER_ERROR);
    let client = client_for(spawn_api(state).await);

    let err = client.synthesize("text").await.unwrap_err();
    match err {
        SpeechError::RequestFailed(message) => assert!(message.contains("500")),
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn abort_interrupts_an_in_flight_call() {
    let state = ApiState::new().with_delay(Duration::from_secs(30));
    let hits = Arc::clone(&state.hits);
    let client = Arc::new(client_for(spawn_api(state).await));

    let in_flight = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.synthesize("doomed").await })
    };

    // Let the request reach the server, then pull the plug.
    for _ in 0..200 {
        if hits.load(Ordering::SeqCst) > 0 {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    client.abort();

    let result = in_flight.await.unwrap();
    assert!(matches!(result, Err(SpeechError::Aborted)));
}

#[tokio::test]
async fn credential_validation_distinguishes_bad_key_from_no_network() {
    let client = client_for(spawn_api(ApiState::new()).await);

    assert!(client.validate_credential("good-key").await.is_valid);

    let rejected = client.validate_credential("bad-key").await;
    assert!(!rejected.is_valid);
    assert_eq!(rejected.error.as_deref(), Some("Invalid API key"));

    // An unreachable endpoint is a network problem, not a key problem.
    let offline = client_for("http://127.0.0.1:1".to_string());
    let unreachable = offline.validate_credential("good-key").await;
    assert!(!unreachable.is_valid);
    assert_eq!(unreachable.error.as_deref(), Some("Network error"));
}

// ── Broker tests ───────────────────────────────────────────────────

fn speech_request(text: &str, sequence: u64) -> SpeechRequest {
    SpeechRequest {
        stream_id: StreamId::new(),
        text: text.to_string(),
        sequence,
    }
}

#[tokio::test]
async fn broker_echoes_sequence_and_registers_the_stream() {
    let client = Arc::new(client_for(spawn_api(ApiState::new()).await));
    let broker = SpeechBroker::new(client, 1);

    let request = speech_request("unit", 7);
    let stream_id = request.stream_id.clone();
    let response = broker.create_speech(request).await;

    assert_eq!(response.sequence, 7);
    assert!(response.error.is_none());
    assert!(response.source_url.is_some());
    assert_eq!(broker.active_streams(), 1);

    broker.cleanup_stream(&stream_id);
    assert_eq!(broker.active_streams(), 0);
}

#[tokio::test]
async fn broker_enforces_the_process_wide_bound() {
    let state = ApiState::new().with_delay(Duration::from_millis(60));
    let max_active = Arc::clone(&state.max_active);
    let client = Arc::new(client_for(spawn_api(state).await));
    let broker = Arc::new(SpeechBroker::new(client, 1));

    let tasks: Vec<_> = (0..3)
        .map(|i| {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.create_speech(speech_request("unit", i)).await })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let response = task.await.unwrap();
        assert!(response.error.is_none(), "request {i} should succeed");
    }
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_all_aborts_in_flight_and_drops_queued_requests() {
    let state = ApiState::new().with_delay(Duration::from_secs(30));
    let hits = Arc::clone(&state.hits);
    let client = Arc::new(client_for(spawn_api(state).await));
    let broker = Arc::new(SpeechBroker::new(client, 1));

    let first = {
        let broker = Arc::clone(&broker);
        tokio::spawn(async move { broker.create_speech(speech_request("in flight", 0)).await })
    };
    let second = {
        let broker = Arc::clone(&broker);
        tokio::spawn(async move { broker.create_speech(speech_request("queued", 1)).await })
    };

    // Wait for the first request to hold the permit on the server.
    for _ in 0..200 {
        if hits.load(Ordering::SeqCst) > 0 {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    broker.stop_all();

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_eq!(first.error, Some(SynthesisFailure::Aborted));
    assert_eq!(second.error, Some(SynthesisFailure::Aborted));

    // The queued request never reached the network.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(broker.active_streams(), 0);
}
