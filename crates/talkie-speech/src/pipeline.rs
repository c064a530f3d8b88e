//! Narration pipeline — wiring, events, and the reset controller.
//!
//! ```text
//!   response bytes ─ tap ─ decoder ─ segmenter ─ dispatch ─ synthesis
//!                                                              │
//!                                         audio out ─ playback ┘
//! ```
//!
//! The pipeline owns one instance of every stage plus the single piece
//! of cross-component shared state: the generation counter.
//! [`reset`](NarrationPipeline::reset) can reach into all of them at
//! any time — synchronously, idempotently — and leaves the pipeline
//! immediately ready for a fresh turn.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use talkie_core::events::PageEvent;
use talkie_core::generation::{Generation, GenerationCounter};
use talkie_core::ports::{AudioSink, SpeechTransport};
use talkie_core::settings::NarrationSettings;
use talkie_stream::decoder::EventDecoder;
use talkie_stream::segment::SentenceSegmenter;
use talkie_stream::tap::{PassthroughStream, ResponseTap};

use crate::dispatch::DispatchQueue;
use crate::playback::PlaybackQueue;

/// Events emitted by the pipeline to the embedding layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationEvent {
    /// A speech unit was segmented and scheduled, in document order.
    TextChunk {
        /// The unit's text.
        chunk: String,
    },

    /// Audio output began for a span of units.
    SpeakingStarted,

    /// Audio output drained — nothing left to play.
    SpeakingFinished,

    /// A unit was dropped (synthesis or decode failure); narration
    /// continues with the next one.
    UnitDropped {
        /// Sequence number of the dropped unit.
        sequence: u64,
    },

    /// A reset completed; subsequent units belong to a new generation.
    PipelineReset,
}

/// The assembled narration pipeline.
pub struct NarrationPipeline {
    settings: NarrationSettings,
    generation: GenerationCounter,
    segmenter: Arc<Mutex<SentenceSegmenter>>,
    dispatch: DispatchQueue,
    playback: PlaybackQueue,
    transport: Arc<dyn SpeechTransport>,
    tap: ResponseTap,
    events: mpsc::UnboundedSender<NarrationEvent>,
}

impl NarrationPipeline {
    /// Assemble a pipeline around the given transport and sink.
    ///
    /// Returns the pipeline and the receiver for [`NarrationEvent`]s.
    #[must_use]
    pub fn new(
        settings: NarrationSettings,
        transport: Arc<dyn SpeechTransport>,
        sink: Arc<dyn AudioSink>,
    ) -> (Self, mpsc::UnboundedReceiver<NarrationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let generation = GenerationCounter::new();

        let playback = PlaybackQueue::new(
            sink,
            Arc::clone(&transport),
            generation.clone(),
            event_tx.clone(),
        );
        let dispatch = DispatchQueue::new(
            settings.dispatch.clone(),
            Arc::clone(&transport),
            playback.clone(),
            generation.clone(),
            event_tx.clone(),
        );

        let pipeline = Self {
            segmenter: Arc::new(Mutex::new(SentenceSegmenter::new(settings.segmenter.clone()))),
            tap: ResponseTap::new(settings.intercept.clone()),
            settings,
            generation,
            dispatch,
            playback,
            transport,
            events: event_tx,
        };

        (pipeline, event_rx)
    }

    /// Whether a request matches the intercept predicate.
    #[must_use]
    pub fn should_tap(&self, method: &str, url_path: &str) -> bool {
        self.tap.should_tap(method, url_path)
    }

    /// Tap a response body: returns the untouched passthrough stream
    /// for the original caller and spawns the decode/ingest loops that
    /// feed narration.
    pub fn attach_response<S, E>(&self, upstream: S) -> PassthroughStream<E>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Send + 'static,
    {
        let (passthrough, inspection) = self.tap.split(upstream);

        let decoder = EventDecoder::new(self.settings.decoder.clone());
        let (delta_tx, mut delta_rx) = mpsc::unbounded_channel();
        tokio::spawn(decoder.run(inspection, delta_tx, self.tap.inspection_token()));

        let segmenter = Arc::clone(&self.segmenter);
        let dispatch = self.dispatch.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(delta) = delta_rx.recv().await {
                ingest_delta(&segmenter, &dispatch, &events, &delta.text, delta.is_final);
            }
        });

        passthrough
    }

    /// Feed one already-decoded text delta (for embeddings that do
    /// their own response interception).
    pub fn handle_delta(&self, text: &str, is_final: bool) {
        ingest_delta(&self.segmenter, &self.dispatch, &self.events, text, is_final);
    }

    /// React to a control event from the page bridge.
    pub fn handle_page_event(&self, event: &PageEvent) {
        match event {
            PageEvent::ResetPipeline => self.reset(),
            // Text chunks are outbound only; an inbound one is a no-op.
            PageEvent::AssistantTextChunk { .. } => {}
        }
    }

    /// Interrupt everything and return every stage to its initial
    /// state, atomically from the caller's point of view.
    ///
    /// Order matters: the generation advances first so that every
    /// continuation still in flight is already stale before any queue
    /// is touched. Safe to call at any time, from any task, including
    /// re-entrantly.
    pub fn reset(&self) {
        let stale = self.generation.current();
        let fresh = self.generation.advance();
        tracing::info!(%stale, %fresh, "Resetting narration pipeline");

        self.dispatch.clear();
        self.segmenter.lock().unwrap().reset();
        self.transport.stop_all();
        self.playback.clear();
        self.tap.cancel_inspection();

        let _ = self.events.send(NarrationEvent::PipelineReset);
    }

    /// The currently active generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    /// Whether audio output is in progress.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.playback.is_speaking()
    }

    /// Direct access to the dispatch queue (tests, embeddings that
    /// segment their own text).
    #[must_use]
    pub fn dispatch(&self) -> &DispatchQueue {
        &self.dispatch
    }

    /// Direct access to the playback queue.
    #[must_use]
    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }
}

impl Drop for NarrationPipeline {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Segment one delta and schedule every completed sentence.
fn ingest_delta(
    segmenter: &Arc<Mutex<SentenceSegmenter>>,
    dispatch: &DispatchQueue,
    events: &mpsc::UnboundedSender<NarrationEvent>,
    text: &str,
    is_final: bool,
) {
    let units = segmenter.lock().unwrap().append(text, is_final);
    for text in units {
        let _ = events.send(NarrationEvent::TextChunk {
            chunk: text.clone(),
        });
        dispatch.enqueue_text(text);
    }
}

/// Forward each scheduled unit to the page bridge as an
/// `assistantTextChunk` event; other pipeline events are internal.
///
/// The spawned task self-terminates when either channel closes.
pub fn spawn_page_event_bridge(
    mut events: mpsc::UnboundedReceiver<NarrationEvent>,
    page: mpsc::UnboundedSender<PageEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let NarrationEvent::TextChunk { chunk } = event {
                if page.send(PageEvent::AssistantTextChunk { chunk }).is_err() {
                    break;
                }
            }
        }
    });
}
