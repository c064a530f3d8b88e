//! Port traits and the wire DTOs that cross them.
//!
//! Adapters implement these; the pipeline consumes them. DTOs here are
//! transport-agnostic wire shapes — conversion to and from native types
//! happens inside the adapter crates, never here.

pub mod audio;
pub mod credentials;
pub mod synthesis;

pub use audio::{AudioSink, PlaybackError};
pub use credentials::{ApiKey, CredentialStore};
pub use synthesis::{
    CredentialCheck, SpeechRequest, SpeechResponse, SpeechTransport, SynthesisFailure,
};
