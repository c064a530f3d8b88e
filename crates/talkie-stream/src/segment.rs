//! Text accumulator and sentence segmenter.
//!
//! Deltas arrive as arbitrary fragments — half a word, three sentences,
//! a markdown table. The segmenter buffers them, strips formatting the
//! voice should not pronounce, and emits each complete sentence exactly
//! once, as soon as its boundary appears. Unterminated trailing text
//! waits for more input; the completion flag flushes whatever is left
//! as one last unit.
//!
//! Duplicate suppression is by exact emitted text, which makes emission
//! idempotent under retried or overlapping deltas.

use std::collections::HashSet;

use talkie_core::settings::SegmenterSettings;

/// Sentence-terminal punctuation.
const TERMINALS: [char; 3] = ['.', '!', '?'];

/// Accumulates cleaned text and yields complete sentences in order.
pub struct SentenceSegmenter {
    settings: SegmenterSettings,
    /// Cleaned text not yet emitted.
    pending: String,
    /// Exact text of every unit already emitted this turn.
    emitted: HashSet<String>,
}

impl SentenceSegmenter {
    #[must_use]
    pub fn new(settings: SegmenterSettings) -> Self {
        Self {
            settings,
            pending: String::new(),
            emitted: HashSet::new(),
        }
    }

    /// Append one delta and return any sentences it completed.
    ///
    /// With `is_final` set, any nonempty leftover is flushed as a final
    /// unit even without terminal punctuation, and the turn state
    /// (buffer and emitted set) is cleared.
    pub fn append(&mut self, text: &str, is_final: bool) -> Vec<String> {
        let clean = strip_formatting(text);
        if !clean.is_empty() {
            if !self.pending.is_empty() {
                self.pending.push(' ');
            }
            self.pending.push_str(&clean);
        }

        let mut units = self.drain_complete();

        if is_final {
            let leftover = std::mem::take(&mut self.pending);
            let leftover = leftover.trim();
            if self.accept(leftover) && !self.emitted.contains(leftover) {
                units.push(leftover.to_string());
            }
            self.emitted.clear();
        }

        units
    }

    /// Drop all buffered turn state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.emitted.clear();
    }

    /// Whether any unterminated text is waiting for more input.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Extract every complete sentence currently in the buffer.
    fn drain_complete(&mut self) -> Vec<String> {
        let mut units = Vec::new();

        while let Some(end) = sentence_end(&self.pending) {
            let sentence = self.pending[..end].trim().to_string();
            self.pending = self.pending.split_off(end).trim_start().to_string();

            if !self.accept(&sentence) {
                tracing::debug!(len = sentence.len(), "Discarding sub-threshold fragment");
                continue;
            }
            if self.emitted.insert(sentence.clone()) {
                units.push(sentence);
            }
        }

        units
    }

    /// Length and content filter: rejects stray fragments, lone
    /// abbreviation artifacts, and punctuation-only units.
    fn accept(&self, unit: &str) -> bool {
        unit.chars().count() > self.settings.min_unit_chars
            && unit.chars().any(char::is_alphanumeric)
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(SegmenterSettings::default())
    }
}

/// Byte offset just past the first complete sentence, if any.
///
/// A boundary is terminal punctuation followed by whitespace. Terminal
/// punctuation at the very end of the buffer does not count — the next
/// delta might continue the token ("3." → "3.5").
fn sentence_end(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if TERMINALS.contains(&c)
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace())
        {
            return Some(i + c.len_utf8());
        }
    }
    None
}

// ── Formatting removal ─────────────────────────────────────────────

/// Strip markdown-style formatting, keeping the words underneath.
///
/// Fenced code blocks are dropped wholesale (reading code aloud is
/// noise); inline code spans are unwrapped; emphasis markers, link
/// targets, heading and blockquote prefixes, and citation brackets all
/// disappear. Whitespace is collapsed to single spaces.
#[must_use]
pub fn strip_formatting(text: &str) -> String {
    let text = drop_fenced_blocks(text);

    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let line = strip_block_prefixes(line);
        let line = strip_links(line);
        let line = strip_inline_code(&line);
        let line = strip_citations(&line);
        let line = strip_emphasis(&line);

        let line = line.trim();
        if !line.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(line);
        }
    }

    collapse_whitespace(&out)
}

/// Remove complete ``` fenced blocks. An unterminated fence is left
/// alone — its closing half may arrive in a later delta.
fn drop_fenced_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            break;
        };
        out.push_str(&rest[..open]);
        rest = &after_open[close + 3..];
    }

    out.push_str(rest);
    out
}

/// Strip leading blockquote markers and heading hashes from one line.
fn strip_block_prefixes(line: &str) -> &str {
    let mut line = line.trim_start();
    while let Some(rest) = line.strip_prefix('>') {
        line = rest.trim_start();
    }
    if line.starts_with('#') {
        line = line.trim_start_matches('#').trim_start();
    }
    line
}

/// `[text](url)` → `text`. Brackets without a following target pass
/// through unchanged.
fn strip_links(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '[' {
            out.push(c);
            continue;
        }
        let label: String = chars.by_ref().take_while(|&c| c != ']').collect();
        if chars.peek() == Some(&'(') {
            chars.next();
            let _target: String = chars.by_ref().take_while(|&c| c != ')').collect();
            out.push_str(&label);
        } else {
            out.push('[');
            out.push_str(&label);
            out.push(']');
        }
    }

    out
}

/// Unwrap `` `code` `` spans. Backtick runs of two or more (a fence
/// half still waiting for its partner) and unclosed singles stay put.
fn strip_inline_code(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '`' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&c| c == '`').count();
        if run == 1 {
            if let Some(off) = chars[i + 1..].iter().position(|&c| c == '`') {
                out.extend(&chars[i + 1..i + 1 + off]);
                i += off + 2;
                continue;
            }
        }
        out.push_str(&"`".repeat(run));
        i += run;
    }

    out
}

/// Remove citation brackets (`【…】`) entirely — they reference source
/// footnotes and have no spoken form.
fn strip_citations(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;

    for c in line.chars() {
        match c {
            '【' => depth += 1,
            '】' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }

    out
}

/// Remove emphasis markers. Underscores are left alone unless doubled —
/// snake_case identifiers should survive.
fn strip_emphasis(line: &str) -> String {
    line.replace("**", "")
        .replace("__", "")
        .replace("~~", "")
        .replace('*', "")
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(c);
            prev_space = false;
        }
    }

    out.trim().to_string()
}
