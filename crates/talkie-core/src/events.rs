//! Page-bridge wire events.
//!
//! The pipeline does not touch the page DOM. It emits
//! `assistantTextChunk` events (one per speech unit) for the page-side
//! collaborator to observe, and consumes `resetPipeline` control events
//! when the user interrupts. Both are plain tagged JSON on the wire.

use serde::{Deserialize, Serialize};

/// Events exchanged with the page-side collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageEvent {
    /// One segmented speech unit, in document order.
    #[serde(rename_all = "camelCase")]
    AssistantTextChunk {
        /// The unit's text, stripped of formatting.
        chunk: String,
    },

    /// The user interrupted: abort everything and start fresh.
    ResetPipeline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_chunk_wire_shape() {
        let event = PageEvent::AssistantTextChunk {
            chunk: "Hello there.".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "assistantTextChunk", "chunk": "Hello there."})
        );
    }

    #[test]
    fn reset_round_trips() {
        let parsed: PageEvent =
            serde_json::from_str(r#"{"type":"resetPipeline"}"#).unwrap();
        assert_eq!(parsed, PageEvent::ResetPipeline);
    }
}
