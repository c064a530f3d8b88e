//! Audio output port.

use async_trait::async_trait;

use crate::types::AudioUnit;

/// Errors surfaced by an [`AudioSink`].
///
/// For scheduling purposes a playback error is treated like normal
/// completion; it exists so the failure can be logged with a cause.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// The audio payload could not be decoded.
    #[error("Audio decode failed: {0}")]
    Decode(String),

    /// The output device rejected or dropped the stream.
    #[error("Audio output failed: {0}")]
    Output(String),
}

/// Something that can play one audio unit at a time.
///
/// `play` resolves when the unit finishes **or** is interrupted by
/// [`stop`](AudioSink::stop); the playback queue relies on that to
/// advance. Implementations must make `stop` safe to call at any time,
/// including when nothing is playing.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play one unit to completion or interruption.
    async fn play(&self, unit: &AudioUnit) -> Result<(), PlaybackError>;

    /// Interrupt the current unit immediately, if any.
    fn stop(&self);
}
