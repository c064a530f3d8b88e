//! Pipeline configuration.
//!
//! The behaviors that varied across revisions of the original pipeline
//! (segmentation thresholds, dispatch concurrency, intercept predicate,
//! voice parameters) are configuration here, not forked code paths.

use serde::{Deserialize, Serialize};

// ── Interception ───────────────────────────────────────────────────

/// Predicate selecting which outbound requests get tapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptSettings {
    /// HTTP method to match, uppercase.
    pub method: String,
    /// Exact path of the conversation endpoint.
    pub endpoint_path: String,
}

impl InterceptSettings {
    /// Whether a request should be tapped.
    #[must_use]
    pub fn matches(&self, method: &str, url_path: &str) -> bool {
        method.eq_ignore_ascii_case(&self.method) && url_path == self.endpoint_path
    }
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self {
            method: "POST".to_string(),
            endpoint_path: "/backend-api/conversation".to_string(),
        }
    }
}

// ── Decoding ───────────────────────────────────────────────────────

/// Event-decoder knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderSettings {
    /// Token that opens a tool-invocation span inside a text delta.
    /// Everything from this token on is withheld from narration until
    /// the stream reports the tool call finished.
    pub tool_call_open: String,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            tool_call_open: "<|tool_call_begin|>".to_string(),
        }
    }
}

// ── Segmentation ───────────────────────────────────────────────────

/// Sentence-segmentation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmenterSettings {
    /// Units of this many characters or fewer are discarded rather
    /// than spoken. Rejects stray fragments and abbreviation
    /// artifacts ("a.", "e.") that would otherwise become one-beat
    /// audio blips.
    pub min_unit_chars: usize,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self { min_unit_chars: 2 }
    }
}

// ── Dispatch ───────────────────────────────────────────────────────

/// Dispatch-queue knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSettings {
    /// Maximum synthesis requests in flight at once. One keeps cost
    /// bounded and ordering trivial; two pipelines synthesis ahead of
    /// playback at the price of an out-of-order hold-back buffer.
    pub max_in_flight: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self { max_in_flight: 1 }
    }
}

// ── Voice ──────────────────────────────────────────────────────────

/// Parameters forwarded verbatim to the synthesis API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParameters {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.2,
            style: 1.0,
            use_speaker_boost: true,
        }
    }
}

/// Remote synthesis service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    /// Base URL of the synthesis API.
    pub api_base: String,
    /// Voice to synthesize with.
    pub voice_id: String,
    /// Synthesis model.
    pub model_id: String,
    /// Voice rendering parameters.
    pub parameters: VoiceParameters,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io".to_string(),
            voice_id: "9BWtsMINqrJLrRacOk9x".to_string(),
            model_id: "eleven_turbo_v2".to_string(),
            parameters: VoiceParameters::default(),
        }
    }
}

// ── Aggregate ──────────────────────────────────────────────────────

/// Everything the narration pipeline needs, in one place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NarrationSettings {
    pub intercept: InterceptSettings,
    pub decoder: DecoderSettings,
    pub segmenter: SegmenterSettings,
    pub dispatch: DispatchSettings,
    pub voice: VoiceSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intercept_predicate_matches_method_and_exact_path() {
        let settings = InterceptSettings::default();

        assert!(settings.matches("POST", "/backend-api/conversation"));
        assert!(settings.matches("post", "/backend-api/conversation"));
        assert!(!settings.matches("GET", "/backend-api/conversation"));
        assert!(!settings.matches("POST", "/backend-api/conversation/init"));
    }

    #[test]
    fn defaults_carry_the_production_constants() {
        let voice = VoiceSettings::default();
        assert_eq!(voice.model_id, "eleven_turbo_v2");
        assert!((voice.parameters.stability - 0.5).abs() < f32::EPSILON);

        assert_eq!(DispatchSettings::default().max_in_flight, 1);
        assert_eq!(SegmenterSettings::default().min_unit_chars, 2);
    }

    #[test]
    fn settings_deserialize_with_partial_json() {
        let parsed: NarrationSettings =
            serde_json::from_str(r#"{"dispatch":{"maxInFlight":2}}"#).unwrap();
        assert_eq!(parsed.dispatch.max_in_flight, 2);
        assert_eq!(parsed.voice, VoiceSettings::default());
    }
}
