//! Response tap — duplicate a response body without touching it.
//!
//! Given an outbound request that matches the configured predicate, the
//! tap splits the response body into two feeds: a passthrough stream
//! handed back to the original caller, byte-for-byte identical to the
//! upstream, and an inspection feed consumed by a detached read loop.
//!
//! Inspection is strictly best-effort. If the inspection receiver is
//! gone or inspection has been cancelled, chunks keep flowing to the
//! caller unchanged — the host page must never break because narration
//! did.

use std::sync::Mutex;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use talkie_core::settings::InterceptSettings;

/// The untouched stream returned to the original caller.
pub type PassthroughStream<E> = UnboundedReceiverStream<Result<Bytes, E>>;

/// Splits matching response bodies and owns the inspection lifecycle.
pub struct ResponseTap {
    settings: InterceptSettings,
    /// Cancelling this token stops inspection of the current response.
    /// Replaced with a fresh token on cancellation so the next response
    /// can be inspected again.
    cancel: Mutex<CancellationToken>,
}

impl ResponseTap {
    #[must_use]
    pub fn new(settings: InterceptSettings) -> Self {
        Self {
            settings,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Whether a request should be tapped at all.
    ///
    /// Non-matching requests must be passed through without calling
    /// [`split`](Self::split).
    #[must_use]
    pub fn should_tap(&self, method: &str, url_path: &str) -> bool {
        self.settings.matches(method, url_path)
    }

    /// Duplicate `upstream` into a passthrough stream and an inspection
    /// feed, spawning the detached pump task.
    ///
    /// The pump forwards every chunk to the passthrough unconditionally
    /// and copies it to the inspection feed while inspection is alive.
    /// Upstream errors travel down the passthrough only; the inspection
    /// feed simply ends.
    pub fn split<S, E>(&self, upstream: S) -> (PassthroughStream<E>, mpsc::UnboundedReceiver<Bytes>)
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Send + 'static,
    {
        let (pass_tx, pass_rx) = mpsc::unbounded_channel();
        let (inspect_tx, inspect_rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.lock().unwrap().clone();

        tokio::spawn(pump(upstream, pass_tx, inspect_tx, cancel));

        (UnboundedReceiverStream::new(pass_rx), inspect_rx)
    }

    /// Stop inspecting the current response and re-arm for the next.
    ///
    /// The passthrough side of an in-progress split is unaffected.
    pub fn cancel_inspection(&self) {
        let mut guard = self.cancel.lock().unwrap();
        guard.cancel();
        *guard = CancellationToken::new();
        tracing::debug!("Response inspection cancelled");
    }

    /// The cancellation token governing the current inspection, for
    /// downstream loops (decoder) that should die with it.
    #[must_use]
    pub fn inspection_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap().clone()
    }
}

impl Default for ResponseTap {
    fn default() -> Self {
        Self::new(InterceptSettings::default())
    }
}

/// The detached read loop: drain upstream into both feeds.
async fn pump<S, E>(
    upstream: S,
    pass_tx: mpsc::UnboundedSender<Result<Bytes, E>>,
    inspect_tx: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Bytes, E>>,
{
    futures_util::pin_mut!(upstream);
    let mut inspect_tx = Some(inspect_tx);

    while let Some(item) = upstream.next().await {
        if cancel.is_cancelled() {
            // Drop the sender so the decode loop sees end-of-stream.
            inspect_tx = None;
        }

        match item {
            Ok(chunk) => {
                if let Some(tx) = &inspect_tx {
                    if tx.send(chunk.clone()).is_err() {
                        // Inspector went away — fail open, keep serving
                        // the caller.
                        inspect_tx = None;
                    }
                }
                if pass_tx.send(Ok(chunk)).is_err() {
                    // Caller dropped the response; nothing left to do.
                    tracing::debug!("Passthrough receiver dropped, tap pump exiting");
                    return;
                }
            }
            Err(e) => {
                inspect_tx = None;
                if pass_tx.send(Err(e)).is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_tap_honours_the_predicate() {
        let tap = ResponseTap::default();
        assert!(tap.should_tap("POST", "/backend-api/conversation"));
        assert!(!tap.should_tap("GET", "/backend-api/conversation"));
        assert!(!tap.should_tap("POST", "/other"));
    }

    #[tokio::test]
    async fn cancel_re_arms_for_the_next_response() {
        let tap = ResponseTap::default();
        let first = tap.inspection_token();

        tap.cancel_inspection();

        assert!(first.is_cancelled());
        assert!(!tap.inspection_token().is_cancelled());
    }
}
