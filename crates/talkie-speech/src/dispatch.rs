//! Dispatch queue — sentences in, ordered audio hand-off out.
//!
//! Each enqueued sentence gets the next sequence number in the current
//! generation and waits its turn behind the in-flight bound. Results
//! that complete out of order (possible when the bound is above one)
//! park in a hold-back map and are released to playback strictly by
//! sequence; a failed or aborted unit releases its slot so later units
//! never stall behind it.
//!
//! Per unit: `queued → in-flight → completed | failed | discarded`.
//! A completion whose generation is no longer current is discarded
//! silently — it belongs to a turn the user already interrupted.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use talkie_core::generation::GenerationCounter;
use talkie_core::ports::{SpeechRequest, SpeechTransport, SynthesisFailure};
use talkie_core::settings::DispatchSettings;
use talkie_core::types::{AudioUnit, EncodedAudio, SpeechUnit, StreamId};

use crate::pipeline::NarrationEvent;
use crate::playback::PlaybackQueue;

/// Explicit queue state.
///
/// `Draining` means the queue was cleared while work was still in
/// flight; it falls back to `Idle` once the last stale continuation
/// lands. One enum instead of `is_processing`-style flag pairs, so no
/// unintended combination is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Active,
    Draining,
}

struct DispatchInner {
    state: QueueState,
    queue: VecDeque<SpeechUnit>,
    in_flight: usize,
    /// How many of the in-flight requests belong to a cleared turn.
    /// Their completions will be discarded; until they land the queue
    /// reports `Draining` unless fresh work has already started.
    stale_in_flight: usize,
    /// Next sequence number to assign, within the current generation.
    next_sequence: u64,
    /// Next sequence number allowed to reach playback.
    next_release: u64,
    /// Completed-out-of-order results parked until their predecessors
    /// land. `None` marks a dropped unit that releases its slot.
    held: BTreeMap<u64, Option<AudioUnit>>,
}

impl DispatchInner {
    /// The single state-transition function: state is derived from the
    /// work counters, never toggled ad hoc.
    fn update_state(&mut self) {
        self.state = if self.in_flight == 0 && self.queue.is_empty() {
            QueueState::Idle
        } else if self.in_flight > self.stale_in_flight || !self.queue.is_empty() {
            QueueState::Active
        } else {
            QueueState::Draining
        };
    }
}

/// Concurrency-bounded scheduler from speech units to audio units.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<Mutex<DispatchInner>>,
    transport: Arc<dyn SpeechTransport>,
    playback: PlaybackQueue,
    generation: GenerationCounter,
    settings: DispatchSettings,
    events: mpsc::UnboundedSender<NarrationEvent>,
}

impl DispatchQueue {
    #[must_use]
    pub fn new(
        settings: DispatchSettings,
        transport: Arc<dyn SpeechTransport>,
        playback: PlaybackQueue,
        generation: GenerationCounter,
        events: mpsc::UnboundedSender<NarrationEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DispatchInner {
                state: QueueState::Idle,
                queue: VecDeque::new(),
                in_flight: 0,
                stale_in_flight: 0,
                next_sequence: 0,
                next_release: 0,
                held: BTreeMap::new(),
            })),
            transport,
            playback,
            generation,
            settings,
            events,
        }
    }

    /// Tag `text` with the next sequence number and schedule it.
    pub fn enqueue_text(&self, text: impl Into<String>) -> SpeechUnit {
        let unit = {
            let mut inner = self.inner.lock().unwrap();
            let unit = SpeechUnit {
                text: text.into(),
                sequence: inner.next_sequence,
                generation: self.generation.current(),
            };
            inner.next_sequence += 1;
            inner.queue.push_back(unit.clone());
            inner.update_state();
            unit
        };

        self.process();
        unit
    }

    /// Drop everything queued or parked; in-flight work keeps running
    /// but its results will fail the generation check when they land.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.clear();
        inner.held.clear();
        inner.next_sequence = 0;
        inner.next_release = 0;
        inner.stale_in_flight = inner.in_flight;
        inner.update_state();
    }

    #[must_use]
    pub fn state(&self) -> QueueState {
        self.inner.lock().unwrap().state
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Issue requests while there is queue and spare in-flight room.
    ///
    /// Re-entrant by construction: at the bound (or with nothing
    /// queued) this is a no-op, and every completion calls it again to
    /// keep the queue draining.
    fn process(&self) {
        let to_issue = {
            let mut inner = self.inner.lock().unwrap();
            let bound = self.settings.max_in_flight.max(1);
            let mut to_issue = Vec::new();
            while inner.in_flight < bound {
                let Some(unit) = inner.queue.pop_front() else {
                    break;
                };
                inner.in_flight += 1;
                to_issue.push(unit);
            }
            inner.update_state();
            to_issue
        };

        for unit in to_issue {
            let this = self.clone();
            tokio::spawn(async move { this.run_unit(unit).await });
        }
    }

    /// One unit's journey: request, completion, ordered release.
    async fn run_unit(&self, unit: SpeechUnit) {
        let stream_id = StreamId::new();
        let request = SpeechRequest {
            stream_id: stream_id.clone(),
            text: unit.text.clone(),
            sequence: unit.sequence,
        };

        let response = self.transport.create_speech(request).await;

        {
            let mut inner = self.inner.lock().unwrap();
            inner.in_flight -= 1;

            if self.generation.is_current(unit.generation) {
                let slot = self.decode_response(&unit, &stream_id, response);
                inner.held.insert(unit.sequence, slot);

                loop {
                    let next_release = inner.next_release;
                    let Some(entry) = inner.held.remove(&next_release) else {
                        break;
                    };
                    inner.next_release += 1;
                    if let Some(audio) = entry {
                        // Hand off under the lock: two completions
                        // racing here must not reorder the release
                        // sequence. `enqueue` never suspends and never
                        // takes this lock.
                        self.playback.enqueue(audio);
                    }
                }
            } else {
                tracing::debug!(
                    sequence = unit.sequence,
                    generation = %unit.generation,
                    "Discarding synthesis result from a superseded turn"
                );
                inner.stale_in_flight = inner.stale_in_flight.saturating_sub(1);
            }
            inner.update_state();
        }

        self.process();
    }

    /// Turn a transport response into a playable unit, or `None` when
    /// the unit is dropped (failure, abort, undecodable payload).
    fn decode_response(
        &self,
        unit: &SpeechUnit,
        stream_id: &StreamId,
        response: talkie_core::ports::SpeechResponse,
    ) -> Option<AudioUnit> {
        match (response.source_url, response.error) {
            (Some(url), _) => match EncodedAudio::decode_source_url(&url) {
                Ok(data) => Some(AudioUnit {
                    sequence: unit.sequence,
                    generation: unit.generation,
                    stream_id: stream_id.clone(),
                    data,
                }),
                Err(e) => {
                    tracing::warn!(sequence = unit.sequence, error = %e, "Dropping undecodable audio");
                    let _ = self.events.send(NarrationEvent::UnitDropped {
                        sequence: unit.sequence,
                    });
                    None
                }
            },
            (None, Some(SynthesisFailure::Aborted)) => {
                tracing::debug!(sequence = unit.sequence, "Unit aborted");
                None
            }
            (None, failure) => {
                let failure = failure.unwrap_or(SynthesisFailure::RequestFailed {
                    message: "empty response".to_string(),
                });
                tracing::warn!(
                    sequence = unit.sequence,
                    failure = %failure,
                    "Dropping failed unit"
                );
                let _ = self.events.send(NarrationEvent::UnitDropped {
                    sequence: unit.sequence,
                });
                None
            }
        }
    }
}
