//! Playback queue — strict FIFO audio output.
//!
//! Units arrive already in sequence order (the dispatch queue releases
//! them that way); this queue's job is to never start unit N+1 before
//! unit N's completion handler fires. `play_next` is a no-op while
//! something is playing, and every completion — success, sink error, or
//! interruption alike — re-invokes it. A sink error is a scheduling
//! non-event: log it, release the unit, move on.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use talkie_core::generation::GenerationCounter;
use talkie_core::ports::{AudioSink, SpeechTransport};
use talkie_core::types::AudioUnit;

use crate::dispatch::QueueState;
use crate::pipeline::NarrationEvent;

struct PlaybackInner {
    state: QueueState,
    queue: VecDeque<AudioUnit>,
}

/// Strictly sequential audio player over an [`AudioSink`].
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Mutex<PlaybackInner>>,
    sink: Arc<dyn AudioSink>,
    transport: Arc<dyn SpeechTransport>,
    generation: GenerationCounter,
    /// Tracks the speaking span across chained units, so started /
    /// finished events fire per span, not per unit.
    speaking: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<NarrationEvent>,
}

impl PlaybackQueue {
    #[must_use]
    pub fn new(
        sink: Arc<dyn AudioSink>,
        transport: Arc<dyn SpeechTransport>,
        generation: GenerationCounter,
        events: mpsc::UnboundedSender<NarrationEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaybackInner {
                state: QueueState::Idle,
                queue: VecDeque::new(),
            })),
            sink,
            transport,
            generation,
            speaking: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Queue one unit and start playing if nothing else is.
    pub fn enqueue(&self, unit: AudioUnit) {
        if !self.generation.is_current(unit.generation) {
            tracing::debug!(
                sequence = unit.sequence,
                generation = %unit.generation,
                "Discarding audio from a superseded turn"
            );
            return;
        }

        self.inner.lock().unwrap().queue.push_back(unit);
        self.play_next();
    }

    /// Stop the current unit and drop everything queued.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.queue.clear();
            if inner.state == QueueState::Active {
                inner.state = QueueState::Draining;
            }
        }
        // Unblocks the in-flight `sink.play`, whose completion handler
        // then observes the empty queue and goes idle.
        self.sink.stop();

        if self.speaking.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(NarrationEvent::SpeakingFinished);
        }
    }

    #[must_use]
    pub fn state(&self) -> QueueState {
        self.inner.lock().unwrap().state
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Whether a speaking span is in progress.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Start the head unit unless one is already playing.
    fn play_next(&self) {
        let unit = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != QueueState::Idle {
                return;
            }
            let Some(unit) = inner.queue.pop_front() else {
                return;
            };
            inner.state = QueueState::Active;
            unit
        };

        if !self.speaking.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(NarrationEvent::SpeakingStarted);
        }

        let this = self.clone();
        tokio::spawn(async move {
            tracing::debug!(sequence = unit.sequence, "Playing unit");

            if let Err(e) = this.sink.play(&unit).await {
                // Treated exactly like completion for scheduling.
                tracing::warn!(sequence = unit.sequence, error = %e, "Playback failed, skipping unit");
            }

            // Release the unit's backing resources before advancing.
            this.transport.cleanup_stream(&unit.stream_id);
            drop(unit);

            let drained = {
                let mut inner = this.inner.lock().unwrap();
                inner.state = QueueState::Idle;
                inner.queue.is_empty()
            };

            if drained {
                if this.speaking.swap(false, Ordering::SeqCst) {
                    let _ = this.events.send(NarrationEvent::SpeakingFinished);
                }
            } else {
                this.play_next();
            }
        });
    }
}
