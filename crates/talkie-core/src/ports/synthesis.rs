//! Host transport port — speech synthesis across the process boundary.
//!
//! The dispatch queue and the synthesis client live in isolated
//! processes in the host environment, so they talk through
//! request/response messages correlated by a caller-assigned
//! [`StreamId`]. Responses are values, never transport-level errors:
//! a failed synthesis still produces a well-formed [`SpeechResponse`]
//! carrying a [`SynthesisFailure`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::StreamId;

// ── Wire DTOs ──────────────────────────────────────────────────────

/// One synthesis job, as sent across the host transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    /// Caller-assigned correlation id for this exchange.
    pub stream_id: StreamId,
    /// Text to synthesize.
    pub text: String,
    /// Caller's order key, echoed verbatim in the response.
    pub sequence: u64,
}

/// Why a synthesis request produced no audio.
///
/// `Aborted` is the expected outcome of a reset and is never treated as
/// an error by callers; the other two are genuine failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SynthesisFailure {
    /// No credential is configured.
    CredentialMissing,
    /// The request was cancelled by a reset.
    Aborted,
    /// The network call failed or the API returned an error status.
    #[serde(rename_all = "camelCase")]
    RequestFailed {
        /// Human-readable cause, for logs only.
        message: String,
    },
}

impl std::fmt::Display for SynthesisFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CredentialMissing => f.write_str("no synthesis credential configured"),
            Self::Aborted => f.write_str("request aborted"),
            Self::RequestFailed { message } => write!(f, "request failed: {message}"),
        }
    }
}

/// Result of one synthesis exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechResponse {
    /// The caller's order key, echoed back.
    pub sequence: u64,
    /// Encoded audio as a `data:` URL, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Failure cause, when `source_url` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SynthesisFailure>,
}

impl SpeechResponse {
    /// A successful exchange.
    #[must_use]
    pub fn audio(sequence: u64, source_url: String) -> Self {
        Self {
            sequence,
            source_url: Some(source_url),
            error: None,
        }
    }

    /// A failed exchange.
    #[must_use]
    pub fn failed(sequence: u64, failure: SynthesisFailure) -> Self {
        Self {
            sequence,
            source_url: None,
            error: Some(failure),
        }
    }
}

/// Outcome of a credential validation probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCheck {
    /// Whether the API accepted the key.
    pub is_valid: bool,
    /// Cause, when invalid or unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CredentialCheck {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(reason.into()),
        }
    }
}

// ── Port trait ─────────────────────────────────────────────────────

/// Port to the synthesis side of the host transport.
///
/// Implemented by the speech broker. `create_speech` queues behind the
/// process-wide concurrency bound; `stop_all` is synchronous so a reset
/// can complete without suspension points.
#[async_trait]
pub trait SpeechTransport: Send + Sync {
    /// Synthesize one unit. Resolves when the exchange completes,
    /// fails, or is aborted — never returns a transport error.
    async fn create_speech(&self, request: SpeechRequest) -> SpeechResponse;

    /// Release the registry entry for a played stream.
    fn cleanup_stream(&self, stream_id: &StreamId);

    /// Abort every in-flight call and drop every queued request.
    fn stop_all(&self);

    /// Probe the synthesis API with a candidate key.
    async fn validate_credential(&self, key: &str) -> CredentialCheck;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_wire_shape_matches_the_host_transport() {
        let response = SpeechResponse::audio(3, "data:audio/mpeg;base64,AA==".to_string());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sequence": 3,
                "sourceUrl": "data:audio/mpeg;base64,AA==",
            })
        );
    }

    #[test]
    fn failure_kinds_are_distinguishable_on_the_wire() {
        let aborted = serde_json::to_value(SynthesisFailure::Aborted).unwrap();
        assert_eq!(aborted, serde_json::json!({"kind": "aborted"}));

        let failed = serde_json::to_value(SynthesisFailure::RequestFailed {
            message: "HTTP 500".to_string(),
        })
        .unwrap();
        assert_eq!(failed["kind"], "requestFailed");
    }
}
