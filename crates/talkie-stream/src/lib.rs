#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod decoder;
pub mod segment;
pub mod tap;

// Re-export key types for convenience
pub use decoder::{EventDecoder, TextDelta};
pub use segment::SentenceSegmenter;
pub use tap::ResponseTap;
