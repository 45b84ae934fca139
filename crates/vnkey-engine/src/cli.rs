//! Typing profiles for terminals and IDE terminal panels.
//!
//! Terminals echo what they receive, so edits sent too fast interleave with
//! the echo. A [`CliProfile`] spaces backspaces and text; [`CliRuntime`]
//! scales those delays by how fast the user is typing and keeps a quiet
//! window after each injection.

use std::time::{Duration, Instant};

use crate::apps;

/// Floor of the post-send quiet window.
const MIN_POST_SEND_BLOCK_US: u64 = 20_000;
/// UTF-16 units per chunk for non-CLI targets.
pub const NON_CLI_TEXT_CHUNK: usize = 20;

/// Speed factor thresholds: (max interval between key-downs, factor).
const SPEED_STEPS: [(u64, f64); 3] = [(20_000, 2.1), (32_000, 1.6), (48_000, 1.3)];

/// Which profile a bundle gets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum CliProfileKind {
    /// A terminal we know nothing about.
    #[default]
    Default,
    /// VS Code family or JetBrains IDEs.
    Ide,
    /// GPU terminals that keep up with fast input.
    FastTerminal,
    /// Most terminals.
    MediumTerminal,
    /// Terminals that need the most room.
    SlowTerminal,
}

impl CliProfileKind {
    /// Classify a bundle id.
    pub fn for_bundle(bundle_id: Option<&str>) -> Self {
        let Some(b) = bundle_id.filter(|b| !b.is_empty()) else {
            return Self::Default;
        };
        if apps::is_vscode_family(b) || apps::is_jetbrains(b) {
            Self::Ide
        } else if apps::is_fast_terminal(b) {
            Self::FastTerminal
        } else if apps::is_medium_terminal(b) {
            Self::MediumTerminal
        } else if apps::is_slow_terminal(b) {
            Self::SlowTerminal
        } else {
            Self::Default
        }
    }

    /// Timing for this kind.
    pub fn profile(self) -> CliProfile {
        let (backspace, wait, text) = match self {
            Self::Ide => (8_000, 25_000, 8_000),
            Self::FastTerminal => (6_000, 18_000, 5_000),
            Self::MediumTerminal => (9_000, 27_000, 7_000),
            Self::SlowTerminal => (12_000, 36_000, 9_000),
            Self::Default => (8_000, 24_000, 6_000),
        };
        CliProfile {
            backspace_delay_us: backspace,
            wait_after_backspace_us: wait,
            text_delay_us: text,
            text_chunk: 1,
        }
    }
}

/// Delays for one target, in microseconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CliProfile {
    /// Between consecutive backspaces.
    pub backspace_delay_us: u64,
    /// After the last backspace, before text.
    pub wait_after_backspace_us: u64,
    /// Between text chunks.
    pub text_delay_us: u64,
    /// UTF-16 units per chunk.
    pub text_chunk: usize,
}

impl CliProfile {
    /// Quiet window after a send.
    pub fn post_send_block_us(&self) -> u64 {
        MIN_POST_SEND_BLOCK_US.max(self.text_delay_us.saturating_mul(3))
    }
}

/// Next speed factor given the interval since the previous key-down.
pub fn next_speed_factor(delta_us: u64, current: f64) -> f64 {
    let target = if delta_us == 0 {
        1.0
    } else {
        SPEED_STEPS
            .iter()
            .find(|(max, _)| delta_us <= *max)
            .map_or(1.0, |(_, f)| *f)
    };
    if target >= current {
        return target;
    }
    (current * 0.7 + target * 0.3).max(1.0)
}

/// Live CLI timing state. Cleared whenever a non-CLI target is seen.
#[derive(Clone, Debug)]
pub struct CliRuntime {
    /// Active profile; `None` for non-CLI targets.
    profile: Option<CliProfile>,
    /// Current speed factor, at least 1.0.
    speed_factor: f64,
    /// Previous CLI key-down.
    last_key_down: Option<Instant>,
    /// Injection quiet window end.
    block_until: Option<Instant>,
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self {
            profile: None,
            speed_factor: 1.0,
            last_key_down: None,
            block_until: None,
        }
    }
}

impl CliRuntime {
    /// Switch to `profile` (a CLI target) or clear it (anything else).
    pub fn apply_profile(&mut self, profile: Option<CliProfile>) {
        self.profile = profile;
        if profile.is_none() {
            self.speed_factor = 1.0;
            self.last_key_down = None;
        }
    }

    /// The active profile.
    pub fn profile(&self) -> Option<CliProfile> {
        self.profile
    }

    /// Record a CLI key-down and update the speed factor.
    pub fn record_key_down(&mut self, now: Instant) {
        match self.last_key_down.replace(now) {
            None => self.speed_factor = 1.0,
            Some(prev) => {
                let delta = now.saturating_duration_since(prev).as_micros();
                let delta = u64::try_from(delta).unwrap_or(u64::MAX);
                self.speed_factor = next_speed_factor(delta, self.speed_factor);
            }
        }
    }

    /// Current speed factor.
    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    /// Scale a delay by the speed factor.
    pub fn scale(&self, us: u64) -> Duration {
        if us == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(us).mul_f64(self.speed_factor)
    }

    /// Extend the quiet window to at least `duration` from `now`.
    pub fn schedule_block(&mut self, duration: Duration, now: Instant) {
        if duration.is_zero() {
            return;
        }
        let until = now + duration;
        if self.block_until.is_none_or(|b| until > b) {
            self.block_until = Some(until);
        }
    }

    /// Time left in the quiet window.
    pub fn remaining_block(&self, now: Instant) -> Duration {
        self.block_until
            .map_or(Duration::ZERO, |b| b.saturating_duration_since(now))
    }

    /// Chunk size and inter-chunk delay for sending text.
    pub fn text_pacing(&self) -> (usize, Duration) {
        match self.profile {
            Some(p) => (p.text_chunk.max(1), self.scale(p.text_delay_us)),
            None => (NON_CLI_TEXT_CHUNK, Duration::ZERO),
        }
    }
}
