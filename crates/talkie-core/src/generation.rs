//! Generation tokens — the one piece of cross-component shared state.
//!
//! A [`Generation`] identifies the current conversational turn. Every
//! speech unit, in-flight synthesis request, and queued audio unit is
//! tagged with the generation that produced it. A reset advances the
//! counter, and every async continuation compares its captured copy
//! against the current value on resumption; a mismatch means the result
//! is stale and must be voided.
//!
//! The token is copied by value into spawned futures at call time, so
//! staleness is always an explicit comparison rather than an implicit
//! shared-memory race.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier for one conversational turn.
///
/// Comparisons use last-writer-wins semantics: only the value most
/// recently minted by [`GenerationCounter::advance`] is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u64);

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Shared counter that mints and tracks the current [`Generation`].
///
/// Cheap to clone; all clones observe the same current value.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    /// Create a counter starting at the first generation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently active generation.
    #[must_use]
    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }

    /// Mark the current generation stale and mint its successor.
    pub fn advance(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `generation` is still the active one.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_counter_is_current_for_its_own_token() {
        let counter = GenerationCounter::new();
        let g = counter.current();
        assert!(counter.is_current(g));
    }

    #[test]
    fn advance_invalidates_previous_generation() {
        let counter = GenerationCounter::new();
        let old = counter.current();
        let new = counter.advance();

        assert!(!counter.is_current(old));
        assert!(counter.is_current(new));
        assert_ne!(old, new);
    }

    #[test]
    fn clones_share_the_same_current_value() {
        let counter = GenerationCounter::new();
        let clone = counter.clone();

        let before = clone.current();
        counter.advance();

        assert!(!clone.is_current(before));
        assert_eq!(clone.current(), counter.current());
    }
}
