#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

// Integration-test-only dev-dependencies
#[cfg(test)]
use axum as _;
#[cfg(test)]
use tokio_stream as _;

pub mod broker;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod playback;
#[cfg(feature = "rodio")]
pub mod sink;
pub mod synth;

// Re-export key types for convenience
pub use broker::SpeechBroker;
pub use dispatch::{DispatchQueue, QueueState};
pub use error::SpeechError;
pub use pipeline::{NarrationEvent, NarrationPipeline};
pub use playback::PlaybackQueue;
#[cfg(feature = "rodio")]
pub use sink::RodioSink;
pub use synth::SynthesisClient;
