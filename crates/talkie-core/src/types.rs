//! Value types flowing through the narration pipeline.

use serde::{Deserialize, Serialize};

use crate::generation::Generation;

/// Maximum length of one transport chunk of base64 text.
///
/// The host message transport rejects oversized single payloads, so the
/// encoded audio is split into bounded chunks and reassembled by plain
/// concatenation on the far side. Chunking happens after encoding;
/// splitting the raw bytes first would leave base64 padding in the
/// middle of the reassembled text.
pub const TRANSPORT_CHUNK_CHARS: usize = 32 * 1024;

/// Media type of the synthesized audio payload.
pub const AUDIO_MEDIA_TYPE: &str = "audio/mpeg";

// ── Stream ids ─────────────────────────────────────────────────────

/// Caller-assigned correlation id for one synthesis request/response
/// exchange across the host transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Mint a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Speech units ───────────────────────────────────────────────────

/// One sentence-level span of text scheduled for synthesis.
///
/// Immutable once created. `sequence` is strictly increasing within
/// `generation` and doubles as the playback order key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechUnit {
    /// The text to speak, already stripped of formatting.
    pub text: String,
    /// Order key within the owning generation.
    pub sequence: u64,
    /// The conversational turn this unit belongs to.
    pub generation: Generation,
}

/// Synthesized audio awaiting playback.
///
/// Owned by the playback queue until played, then dropped; dropping
/// releases the decoded payload, and the per-stream transport registry
/// entry is released separately via `SpeechTransport::cleanup_stream`.
#[derive(Debug)]
pub struct AudioUnit {
    /// Order key, copied from the originating [`SpeechUnit`].
    pub sequence: u64,
    /// The conversational turn this audio belongs to.
    pub generation: Generation,
    /// Correlation id of the transport exchange that produced it.
    pub stream_id: StreamId,
    /// Decoded audio payload (`AUDIO_MEDIA_TYPE`).
    pub data: Vec<u8>,
}

// ── Transport-encoded audio ────────────────────────────────────────

/// Errors produced when reassembling transport-encoded audio.
#[derive(Debug, thiserror::Error)]
pub enum AudioDecodeError {
    /// The payload is not a data URL of the expected media type.
    #[error("Not an {AUDIO_MEDIA_TYPE} data URL")]
    NotADataUrl,

    /// A base64 segment failed to decode.
    #[error("Invalid base64 audio payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Audio payload encoded for the host message transport.
///
/// Binary-safe: the raw bytes are base64-encoded once, and the encoded
/// text is split into chunks of at most [`TRANSPORT_CHUNK_CHARS`]
/// characters so no single transport message exceeds the host's
/// payload limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedAudio {
    chunks: Vec<String>,
}

impl EncodedAudio {
    /// Encode raw audio bytes for transport.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        use base64::Engine as _;

        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        // base64 text is ASCII, so byte-wise splitting is char-safe.
        let chunks = encoded
            .as_bytes()
            .chunks(TRANSPORT_CHUNK_CHARS)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        Self { chunks }
    }

    /// Number of transport chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Render as a `data:` URL, the shape the host transport carries.
    #[must_use]
    pub fn to_source_url(&self) -> String {
        format!("data:{AUDIO_MEDIA_TYPE};base64,{}", self.chunks.concat())
    }

    /// Reassemble the raw audio bytes from a `data:` URL.
    pub fn decode_source_url(url: &str) -> Result<Vec<u8>, AudioDecodeError> {
        use base64::Engine as _;

        let payload = url
            .strip_prefix(&format!("data:{AUDIO_MEDIA_TYPE};base64,"))
            .ok_or(AudioDecodeError::NotADataUrl)?;

        Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_ids_are_unique() {
        assert_ne!(StreamId::new(), StreamId::new());
    }

    #[test]
    fn encode_decode_round_trip() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let encoded = EncodedAudio::from_bytes(&data);
        let url = encoded.to_source_url();

        assert!(url.starts_with("data:audio/mpeg;base64,"));
        assert_eq!(EncodedAudio::decode_source_url(&url).unwrap(), data);
    }

    #[test]
    fn chunking_splits_at_the_transport_boundary() {
        // 24 576 input bytes encode to exactly TRANSPORT_CHUNK_CHARS
        // characters of base64 — a single chunk.
        let data = vec![7u8; TRANSPORT_CHUNK_CHARS / 4 * 3];
        assert_eq!(EncodedAudio::from_bytes(&data).chunk_count(), 1);

        // One more byte tips the encoded text over the boundary.
        let data = vec![7u8; TRANSPORT_CHUNK_CHARS / 4 * 3 + 1];
        let encoded = EncodedAudio::from_bytes(&data);
        assert_eq!(encoded.chunk_count(), 2);

        // Chunked output still decodes to the original bytes.
        assert_eq!(
            EncodedAudio::decode_source_url(&encoded.to_source_url()).unwrap(),
            data
        );
    }

    #[test]
    fn empty_payload_encodes_to_empty_url() {
        let encoded = EncodedAudio::from_bytes(&[]);
        assert_eq!(encoded.chunk_count(), 0);
        assert_eq!(
            EncodedAudio::decode_source_url(&encoded.to_source_url()).unwrap(),
            Vec::<u8>::new()
        );
    }

    #[test]
    fn non_data_url_is_rejected() {
        let err = EncodedAudio::decode_source_url("https://example.com/a.mp3");
        assert!(matches!(err, Err(AudioDecodeError::NotADataUrl)));
    }
}
