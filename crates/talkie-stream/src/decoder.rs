//! Event decoder — server-sent events in, assistant text deltas out.
//!
//! The inspection feed carries a server-sent-event byte stream:
//! blank-line-delimited records whose `data: ` line holds a JSON
//! payload, terminated by a literal `[DONE]` sentinel. The decoder
//! reassembles records across arbitrary chunk boundaries, pulls the
//! assistant-authored text out of each payload, and withholds anything
//! the user should not hear read aloud: user-authored echoes and
//! tool-invocation payloads.
//!
//! Malformed payloads are logged and skipped — a single bad record must
//! never kill the loop.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use talkie_core::settings::DecoderSettings;

/// JSON pointer to the text content of a nested message value.
const CONTENT_PART_ZERO: &str = "/message/content/parts/0";

/// Message status value that marks the assistant turn complete.
const STATUS_COMPLETE: &str = "finished_successfully";

/// Patch status value that marks a tool invocation complete.
const STATUS_TOOL_FINISHED: &str = "finished";

/// One decoded text fragment.
///
/// `is_final` is set only by the record carrying the explicit
/// completion flag or by the terminal sentinel; a final delta may carry
/// empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta {
    pub text: String,
    pub is_final: bool,
}

impl TextDelta {
    fn text(text: String) -> Self {
        Self {
            text,
            is_final: false,
        }
    }

    fn fin(text: String) -> Self {
        Self {
            text,
            is_final: true,
        }
    }
}

/// Incremental SSE decoder. Push bytes in, get [`TextDelta`]s out.
pub struct EventDecoder {
    settings: DecoderSettings,
    buf: BytesMut,
    /// Whether the most recently declared author role is `assistant`.
    /// Starts true: a stream that never declares a role is assumed to
    /// be the assistant speaking.
    assistant_speaking: bool,
    /// Inside a tool-invocation span; all text withheld.
    in_tool_call: bool,
    /// The sentinel or completion flag was seen; remaining records are
    /// ignored.
    finished: bool,
}

impl EventDecoder {
    #[must_use]
    pub fn new(settings: DecoderSettings) -> Self {
        Self {
            settings,
            buf: BytesMut::new(),
            assistant_speaking: true,
            in_tool_call: false,
            finished: false,
        }
    }

    /// Feed a chunk of raw bytes; returns the deltas completed by it.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<TextDelta> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(end) = find_record_end(&self.buf) {
            let record = self.buf.split_to(end);
            self.buf.advance(2); // the blank-line delimiter
            if self.finished {
                continue;
            }
            let record = String::from_utf8_lossy(&record);
            self.decode_record(&record, &mut out);
        }
        out
    }

    /// Signal upstream end-of-stream.
    ///
    /// Streams normally close with the `[DONE]` sentinel, but if the
    /// connection ends without one the pending text still has to be
    /// flushed downstream.
    pub fn end_of_stream(&mut self) -> Option<TextDelta> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(TextDelta::fin(String::new()))
    }

    /// Decode one complete SSE record.
    fn decode_record(&mut self, record: &str, out: &mut Vec<TextDelta>) {
        // First `data:` line wins; comment and field lines are skipped.
        let Some(payload) = record
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .map(str::trim)
        else {
            return;
        };

        if payload == "[DONE]" {
            self.finished = true;
            out.push(TextDelta::fin(String::new()));
            return;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed stream event");
                return;
            }
        };

        // Track the most recently declared author. Anything declared
        // by a non-assistant stays muted until the assistant speaks
        // again.
        if let Some(role) = value.pointer("/v/message/author/role").and_then(Value::as_str) {
            self.assistant_speaking = role == "assistant";
        }

        let is_final = is_turn_complete(&value);
        if is_final {
            self.finished = true;
        }

        // A record that closes a tool span is still part of the span:
        // its own text is withheld, extraction resumes afterwards.
        let was_in_tool_call = self.in_tool_call;
        if was_in_tool_call && closes_tool_call(&value) {
            tracing::debug!("Tool invocation finished, resuming narration");
            self.in_tool_call = false;
        }

        let mut text = if self.assistant_speaking && !was_in_tool_call {
            extract_delta_text(&value)
        } else {
            String::new()
        };

        // A tool-invocation marker mid-delta: speak what precedes it,
        // withhold the rest until the span closes.
        if let Some(at) = text.find(&self.settings.tool_call_open) {
            tracing::debug!("Tool invocation started, muting narration");
            text.truncate(at);
            self.in_tool_call = true;
        }

        if !text.is_empty() || is_final {
            out.push(if is_final {
                TextDelta::fin(text)
            } else {
                TextDelta::text(text)
            });
        }
    }

    /// Drive the decoder from an inspection feed until the feed ends,
    /// the sentinel arrives, or `cancel` fires.
    pub async fn run(
        mut self,
        mut feed: mpsc::UnboundedReceiver<bytes::Bytes>,
        deltas: mpsc::UnboundedSender<TextDelta>,
        cancel: CancellationToken,
    ) {
        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Decode loop cancelled");
                    return;
                }
                chunk = feed.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                if let Some(delta) = self.end_of_stream() {
                    let _ = deltas.send(delta);
                }
                return;
            };

            for delta in self.push_bytes(&chunk) {
                if deltas.send(delta).is_err() {
                    return;
                }
            }
            if self.finished {
                return;
            }
        }
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(DecoderSettings::default())
    }
}

// ── Record framing ─────────────────────────────────────────────────

/// Position of the next blank-line record delimiter, if a complete
/// record is buffered.
fn find_record_end(buf: &BytesMut) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

// ── Payload inspection ─────────────────────────────────────────────

/// Extract the assistant text delta from one payload.
///
/// Rules in priority order, first match wins:
/// 1. a nested message carrying content part zero;
/// 2. an append operation targeting content part zero;
/// 3. a bare string value with no path;
/// 4. a patch list — the concatenation of its appends to content
///    part zero.
fn extract_delta_text(value: &Value) -> String {
    if let Some(text) = value
        .pointer("/v/message/content/parts/0")
        .and_then(Value::as_str)
    {
        return text.to_string();
    }

    if value["p"] == CONTENT_PART_ZERO && value["o"] == "append" {
        if let Some(text) = value["v"].as_str() {
            return text.to_string();
        }
    }

    // "No path" includes an explicitly empty one; a patch payload also
    // has an empty path but never a string value, so rule 4 is safe.
    let pathless = match value.get("p") {
        None => true,
        Some(p) => p.as_str().is_some_and(str::is_empty),
    };
    if pathless {
        if let Some(text) = value.get("v").and_then(Value::as_str) {
            return text.to_string();
        }
    }

    if let Some(entries) = patch_entries(value) {
        return entries
            .iter()
            .filter(|e| e["p"] == CONTENT_PART_ZERO && e["o"] == "append")
            .filter_map(|e| e["v"].as_str())
            .collect();
    }

    String::new()
}

/// The entries of a patch-list payload (empty path, patch operation,
/// array value), if this is one.
fn patch_entries(value: &Value) -> Option<&Vec<Value>> {
    if value["p"] == "" && value["o"] == "patch" {
        value["v"].as_array()
    } else {
        None
    }
}

/// Whether this payload carries the assistant-turn completion flag.
fn is_turn_complete(value: &Value) -> bool {
    if value.pointer("/v/message/status").and_then(Value::as_str) == Some(STATUS_COMPLETE) {
        return true;
    }
    patch_entries(value).is_some_and(|entries| {
        entries
            .iter()
            .any(|e| e["p"] == "/message/status" && e["v"] == STATUS_COMPLETE)
    })
}

/// Whether this payload closes an open tool-invocation span: a patch
/// entry setting some status field to "finished".
fn closes_tool_call(value: &Value) -> bool {
    patch_entries(value).is_some_and(|entries| {
        entries.iter().any(|e| {
            e["p"].as_str().is_some_and(|p| p.ends_with("/status"))
                && e["v"] == STATUS_TOOL_FINISHED
        })
    })
}
