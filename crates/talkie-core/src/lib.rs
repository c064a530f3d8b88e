#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod events;
pub mod generation;
pub mod ports;
pub mod settings;
pub mod types;

// Re-export key types for convenience
pub use events::PageEvent;
pub use generation::{Generation, GenerationCounter};
pub use types::{AudioUnit, EncodedAudio, SpeechUnit, StreamId};
