//! Detection of the platform's own text replacement.
//!
//! When macOS expands a text shortcut it deletes the typed abbreviation with
//! its own Delete events and inserts the expansion on Space. If we also
//! re-synthesize the word at that moment the text doubles, so a Space whose
//! signal looks like that situation passes through untouched.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::{EngineSignal, ExtCode, SignalCode};

/// Counts Delete key-downs that did not come from us.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExternalDeleteTracker {
    /// Deletes seen in the current burst.
    count: u32,
    /// Time of the most recent one.
    last: Option<Instant>,
}

impl ExternalDeleteTracker {
    /// Record an external Delete at `now`. A gap longer than `window` starts
    /// a new burst.
    pub fn record(&mut self, now: Instant, window: Duration) {
        if let Some(prev) = self.last
            && now.saturating_duration_since(prev) > window
        {
            self.count = 0;
        }
        self.last = Some(now);
        self.count = self.count.saturating_add(1);
    }

    /// Deletes in the current burst.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Time since the most recent external Delete.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.last.map(|t| now.saturating_duration_since(t))
    }

    /// Whether an external Delete happened within `window` of `now`.
    pub fn recent(&self, now: Instant, window: Duration) -> bool {
        self.count > 0 && self.elapsed(now).is_some_and(|e| e <= window)
    }
}

/// Why a Space was let through.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TextReplacementDecision {
    /// Not a candidate; process normally.
    NotEvaluated,
    /// An external Delete happened within the window.
    ExternalDelete,
    /// A restore that inserts more than it deletes.
    Pattern2A,
    /// A will-process edit that inserts at least two more than it deletes.
    Pattern2B,
    /// Evaluated and nothing matched.
    NoMatch,
}

impl TextReplacementDecision {
    /// Pass the Space through unmodified.
    pub fn bypass(self) -> bool {
        matches!(self, Self::ExternalDelete | Self::Pattern2A | Self::Pattern2B)
    }
}

/// Only Space key-downs with some edit are evaluated.
pub fn should_evaluate(is_space: bool, signal: &EngineSignal) -> bool {
    is_space && (signal.backspace_count > 0 || signal.new_char_count() > 0)
}

/// Decide what to do with a Space key-down's signal.
pub fn evaluate(
    is_space: bool,
    signal: &EngineSignal,
    deletes: &ExternalDeleteTracker,
    now: Instant,
    window: Duration,
) -> TextReplacementDecision {
    if !should_evaluate(is_space, signal) {
        return TextReplacementDecision::NotEvaluated;
    }
    let bs = usize::from(signal.backspace_count);
    let new = signal.new_char_count();
    let auto_english = signal.ext == ExtCode::AutoEnglish;

    let decision = if deletes.recent(now, window) {
        TextReplacementDecision::ExternalDelete
    } else if signal.code.is_restore() && !auto_english && new > bs {
        TextReplacementDecision::Pattern2A
    } else if signal.code == SignalCode::WillProcess && !auto_english && new > bs + 1 {
        TextReplacementDecision::Pattern2B
    } else {
        TextReplacementDecision::NoMatch
    };
    debug!(
        ?decision,
        backspaces = bs,
        new_chars = new,
        external_deletes = deletes.count(),
        "text_replacement_evaluated"
    );
    decision
}
