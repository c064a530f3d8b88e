//! Speech broker — the synthesis side of the host transport.
//!
//! The broker implements [`SpeechTransport`]: it queues incoming
//! synthesis requests behind a process-wide concurrency bound, runs
//! them through the [`SynthesisClient`], registers the produced audio
//! per stream id, and answers every request with a well-formed
//! [`SpeechResponse`] — failures travel as values, never as transport
//! errors.
//!
//! `stop_all` must take effect instantly and without awaiting: it bumps
//! an epoch, aborts the client, and clears the registry. Requests still
//! parked at the semaphore when the epoch moves are answered `Aborted`
//! before they touch the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use talkie_core::ports::{
    CredentialCheck, SpeechRequest, SpeechResponse, SpeechTransport,
};
use talkie_core::types::StreamId;

use crate::error::SpeechError;
use crate::synth::SynthesisClient;

/// In-process [`SpeechTransport`] adapter around a [`SynthesisClient`].
pub struct SpeechBroker {
    client: Arc<SynthesisClient>,
    /// Process-wide bound on concurrent synthesis calls. Fair FIFO:
    /// waiters acquire in arrival order.
    permits: Arc<Semaphore>,
    /// Bumped by `stop_all`; a request that captured an older epoch is
    /// dropped the moment it gets a permit.
    epoch: AtomicU64,
    /// Audio produced per stream, held until playback releases it.
    active: Mutex<HashMap<StreamId, String>>,
}

impl SpeechBroker {
    /// Create a broker with the given process-wide concurrency bound.
    #[must_use]
    pub fn new(client: Arc<SynthesisClient>, max_concurrent: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            epoch: AtomicU64::new(0),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Number of streams with audio still registered.
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechTransport for SpeechBroker {
    async fn create_speech(&self, request: SpeechRequest) -> SpeechResponse {
        let epoch = self.epoch.load(Ordering::SeqCst);

        // Queue behind the bound. The semaphore is never closed, so an
        // acquire error cannot happen in practice; treat it as an abort
        // rather than poisoning the response channel.
        let Ok(_permit) = self.permits.acquire().await else {
            return SpeechResponse::failed(request.sequence, SpeechError::Aborted.to_failure());
        };

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(
                stream_id = %request.stream_id,
                sequence = request.sequence,
                "Dropping queued request superseded by stop_all"
            );
            return SpeechResponse::failed(request.sequence, SpeechError::Aborted.to_failure());
        }

        match self.client.synthesize(&request.text).await {
            Ok(audio) => {
                let url = audio.to_source_url();
                self.active
                    .lock()
                    .unwrap()
                    .insert(request.stream_id.clone(), url.clone());
                SpeechResponse::audio(request.sequence, url)
            }
            Err(e @ SpeechError::Aborted) => {
                tracing::debug!(sequence = request.sequence, "Synthesis aborted");
                SpeechResponse::failed(request.sequence, e.to_failure())
            }
            Err(e) => {
                tracing::warn!(
                    sequence = request.sequence,
                    error = %e,
                    "Synthesis failed, dropping unit"
                );
                SpeechResponse::failed(request.sequence, e.to_failure())
            }
        }
    }

    fn cleanup_stream(&self, stream_id: &StreamId) {
        if self.active.lock().unwrap().remove(stream_id).is_some() {
            tracing::debug!(%stream_id, "Released stream audio");
        }
    }

    fn stop_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.client.abort();
        self.active.lock().unwrap().clear();
        tracing::debug!("All synthesis requests stopped");
    }

    async fn validate_credential(&self, key: &str) -> CredentialCheck {
        self.client.validate_credential(key).await
    }
}
