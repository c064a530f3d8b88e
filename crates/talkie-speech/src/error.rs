//! Speech-side error types.

use talkie_core::ports::{PlaybackError, SynthesisFailure};

/// Errors raised while synthesizing or playing speech.
///
/// `Aborted` is the expected result of a user interrupt, not a fault;
/// callers log it at debug level and move on. Everything else means the
/// affected unit is dropped and narration continues with the next one.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// No synthesis credential is configured.
    #[error("No synthesis credential configured")]
    CredentialMissing,

    /// The synthesis call failed (network error or non-success status).
    #[error("Speech synthesis failed: {0}")]
    RequestFailed(String),

    /// The synthesis call was cancelled by a reset.
    #[error("Speech synthesis aborted")]
    Aborted,

    /// Audio could not be decoded or played.
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl SpeechError {
    /// The wire-level failure shape for the host transport.
    #[must_use]
    pub fn to_failure(&self) -> SynthesisFailure {
        match self {
            Self::CredentialMissing => SynthesisFailure::CredentialMissing,
            Self::Aborted => SynthesisFailure::Aborted,
            Self::RequestFailed(message) => SynthesisFailure::RequestFailed {
                message: message.clone(),
            },
            Self::Playback(e) => SynthesisFailure::RequestFailed {
                message: e.to_string(),
            },
        }
    }
}
