//! Default audio output — rodio-backed [`AudioSink`].
//!
//! Each unit gets its own output stream and sink, created inside a
//! blocking task (the rodio `OutputStream` is not `Send` and must live
//! on the thread that drains it). `sleep_until_end` blocks until the
//! audio finishes or [`stop`](RodioSink::stop) tears the sink down,
//! which makes `play` resolve either way — exactly what the playback
//! queue needs to advance.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, Sink};

use talkie_core::ports::{AudioSink, PlaybackError};
use talkie_core::types::AudioUnit;

/// Plays mpeg audio units on the default output device.
pub struct RodioSink {
    /// The sink currently draining, if any. `Sink` is `Send` in rodio
    /// 0.20+, so `stop` can reach it from any thread.
    current: Arc<Mutex<Option<Arc<Sink>>>>,
}

impl RodioSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for RodioSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, unit: &AudioUnit) -> Result<(), PlaybackError> {
        let data = unit.data.clone();
        let current = Arc::clone(&self.current);

        let result = tokio::task::spawn_blocking(move || {
            let (_stream, handle) = OutputStream::try_default()
                .map_err(|e| PlaybackError::Output(e.to_string()))?;
            let sink = Arc::new(
                Sink::try_new(&handle).map_err(|e| PlaybackError::Output(e.to_string()))?,
            );
            let source = Decoder::new(Cursor::new(data))
                .map_err(|e| PlaybackError::Decode(e.to_string()))?;

            sink.append(source);
            *current.lock().unwrap() = Some(Arc::clone(&sink));

            // Blocks until the queue drains naturally or stop() drops
            // the sources, which returns immediately.
            sink.sleep_until_end();

            *current.lock().unwrap() = None;
            Ok(())
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => Err(PlaybackError::Output(format!("playback task failed: {e}"))),
        }
    }

    fn stop(&self) {
        if let Some(sink) = self.current.lock().unwrap().take() {
            sink.stop();
            tracing::debug!("Audio playback stopped");
        }
    }
}
