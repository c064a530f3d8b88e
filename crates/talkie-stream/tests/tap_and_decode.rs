//! Integration tests for the response tap and the decode loop.
//!
//! These drive the tap with in-memory byte streams — no network. What
//! is tested:
//!
//! - Passthrough is byte-identical to upstream, errors included
//! - Inspection sees the same bytes while alive
//! - Cancelling inspection mid-stream leaves the passthrough intact
//! - The full tap → decoder chain turns SSE bytes into text deltas

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use talkie_core::settings::DecoderSettings;
use talkie_stream::decoder::{EventDecoder, TextDelta};
use talkie_stream::tap::ResponseTap;

/// A fallible upstream stream fed chunk-by-chunk from a channel.
fn upstream_channel() -> (
    mpsc::Sender<Result<Bytes, String>>,
    ReceiverStream<Result<Bytes, String>>,
) {
    let (tx, rx) = mpsc::channel(16);
    (tx, ReceiverStream::new(rx))
}

#[tokio::test]
async fn passthrough_is_byte_identical() {
    let tap = ResponseTap::default();
    let (tx, upstream) = upstream_channel();
    let (mut passthrough, mut inspection) = tap.split(upstream);

    let chunks = [&b"data: {\"v\":\"He"[..], &b"llo\"}\n\ndata: [DONE]\n\n"[..]];
    for chunk in chunks {
        tx.send(Ok(Bytes::from_static(chunk))).await.unwrap();
    }
    drop(tx);

    let mut passed = Vec::new();
    while let Some(item) = passthrough.next().await {
        passed.extend_from_slice(&item.unwrap());
    }
    assert_eq!(passed, chunks.concat());

    let mut inspected = Vec::new();
    while let Some(chunk) = inspection.recv().await {
        inspected.extend_from_slice(&chunk);
    }
    assert_eq!(inspected, passed);
}

#[tokio::test]
async fn upstream_errors_reach_the_caller_untouched() {
    let tap = ResponseTap::default();
    let (tx, upstream) = upstream_channel();
    let (mut passthrough, _inspection) = tap.split(upstream);

    tx.send(Ok(Bytes::from_static(b"partial"))).await.unwrap();
    tx.send(Err("connection reset".to_string())).await.unwrap();
    drop(tx);

    assert_eq!(
        passthrough.next().await.unwrap().unwrap(),
        Bytes::from_static(b"partial")
    );
    assert_eq!(
        passthrough.next().await.unwrap().unwrap_err(),
        "connection reset"
    );
}

#[tokio::test]
async fn cancelling_inspection_keeps_the_passthrough_flowing() {
    let tap = ResponseTap::default();
    let (tx, upstream) = upstream_channel();
    let (mut passthrough, mut inspection) = tap.split(upstream);

    tx.send(Ok(Bytes::from_static(b"before"))).await.unwrap();
    assert_eq!(passthrough.next().await.unwrap().unwrap(), "before");
    assert_eq!(inspection.recv().await.unwrap(), "before");

    tap.cancel_inspection();

    tx.send(Ok(Bytes::from_static(b"after"))).await.unwrap();
    drop(tx);

    // The caller still gets every byte...
    assert_eq!(passthrough.next().await.unwrap().unwrap(), "after");
    assert!(passthrough.next().await.is_none());

    // ...while the inspection feed just ends.
    assert!(inspection.recv().await.is_none());
}

#[tokio::test]
async fn tap_to_decoder_chain_produces_deltas() {
    let tap = ResponseTap::default();
    let (tx, upstream) = upstream_channel();
    let (mut passthrough, inspection) = tap.split(upstream);

    let (delta_tx, mut delta_rx) = mpsc::unbounded_channel::<TextDelta>();
    let decoder = EventDecoder::new(DecoderSettings::default());
    tokio::spawn(decoder.run(inspection, delta_tx, tap.inspection_token()));

    // Drain the passthrough like the page would.
    tokio::spawn(async move { while passthrough.next().await.is_some() {} });

    tx.send(Ok(Bytes::from_static(b"data: {\"v\":\"Hello there.\"}\n\n")))
        .await
        .unwrap();
    tx.send(Ok(Bytes::from_static(b"data: [DONE]\n\n")))
        .await
        .unwrap();
    drop(tx);

    let first = delta_rx.recv().await.unwrap();
    assert_eq!(first.text, "Hello there.");
    assert!(!first.is_final);

    let last = delta_rx.recv().await.unwrap();
    assert!(last.is_final);
    assert!(delta_rx.recv().await.is_none());
}
