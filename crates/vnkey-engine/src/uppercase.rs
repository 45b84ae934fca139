//! Sentence-start capitalisation.
//!
//! Two small state machines. [`english_uppercase_transition`] runs on every
//! key-down in English mode and decides whether the next letter is forced to
//! uppercase. [`uppercase_prime_transition`] decides when a focus change
//! warrants asking whether the caret sits at a sentence start; in Vietnamese
//! mode the engine is primed, in English mode [`english_primed_key`] applies
//! the answer to the key being typed.

use mac_keycode::{CgFlags, Key};

/// English-mode capitalisation state. The default value is idle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct EnglishUppercaseState {
    /// A sentence terminator was typed.
    pub pending: bool,
    /// A space must follow before the next letter counts as a new sentence.
    pub needs_space_confirm: bool,
}

impl EnglishUppercaseState {
    /// The idle state.
    pub const IDLE: Self = Self {
        pending: false,
        needs_space_confirm: false,
    };
}

/// Modifiers that make a key-down a shortcut, not text.
const BLOCKING: CgFlags = CgFlags::SHORTCUT;

/// Advance the English capitalisation state for one key-down.
///
/// Returns the next state and whether this key must be typed uppercase.
pub fn english_uppercase_transition(
    state: EnglishUppercaseState,
    key: u16,
    flags: CgFlags,
    enabled: bool,
    excluded: bool,
) -> (EnglishUppercaseState, bool) {
    if !enabled || excluded {
        return (EnglishUppercaseState::IDLE, false);
    }
    if flags.intersects(BLOCKING) {
        return (state, false);
    }
    let Some(k) = Key::from_scancode(key) else {
        return if state.pending {
            (EnglishUppercaseState::IDLE, false)
        } else {
            (state, false)
        };
    };
    let shift = flags.contains(CgFlags::SHIFT);

    if let Some(armed) = terminator(k, shift) {
        return (armed, false);
    }
    if k.is_enter() {
        return (EnglishUppercaseState::IDLE, false);
    }
    if !state.pending {
        return (state, false);
    }

    if k == Key::Space {
        return (
            EnglishUppercaseState {
                pending: true,
                needs_space_confirm: false,
            },
            false,
        );
    }
    if is_skippable_punctuation(k, shift) {
        return (state, false);
    }
    if k.is_letter() {
        if state.needs_space_confirm {
            return (EnglishUppercaseState::IDLE, false);
        }
        let already_upper = flags.has_case();
        return (EnglishUppercaseState::IDLE, !already_upper);
    }
    (EnglishUppercaseState::IDLE, false)
}

/// State armed by a sentence terminator: `.` waits for a space, `!` and `?`
/// do not.
fn terminator(k: Key, shift: bool) -> Option<EnglishUppercaseState> {
    match k {
        Key::Period if !shift => Some(EnglishUppercaseState {
            pending: true,
            needs_space_confirm: true,
        }),
        Key::Digit1 | Key::Slash if shift => Some(EnglishUppercaseState {
            pending: true,
            needs_space_confirm: false,
        }),
        _ => None,
    }
}

/// What an English key-down does once the caret was found at a sentence
/// start after a focus move.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PrimedKey {
    /// Type this letter uppercase.
    Force,
    /// Not a letter yet: carry this state to the next key.
    Carry(EnglishUppercaseState),
    /// The prime does not apply to this key.
    Ignore,
}

/// Apply a sentence-start prime to an English key-down. A plain letter is
/// forced; a terminator, space or opening punctuation keeps the prime alive.
pub fn english_primed_key(key: u16, flags: CgFlags) -> PrimedKey {
    if flags.intersects(BLOCKING) {
        return PrimedKey::Ignore;
    }
    let Some(k) = Key::from_scancode(key) else {
        return PrimedKey::Ignore;
    };
    let shift = flags.contains(CgFlags::SHIFT);
    if k.is_letter() {
        return if flags.has_case() {
            PrimedKey::Ignore
        } else {
            PrimedKey::Force
        };
    }
    if let Some(armed) = terminator(k, shift) {
        return PrimedKey::Carry(armed);
    }
    if k == Key::Space || is_skippable_punctuation(k, shift) {
        return PrimedKey::Carry(EnglishUppercaseState {
            pending: true,
            needs_space_confirm: false,
        });
    }
    PrimedKey::Ignore
}

/// Keys that may sit between a terminator and the next sentence: quotes,
/// brackets and parentheses.
fn is_skippable_punctuation(k: Key, shift: bool) -> bool {
    match k {
        Key::Quote | Key::LeftBracket | Key::RightBracket => true,
        Key::Digit9 | Key::Digit0 => shift,
        _ => false,
    }
}

/// Outcome of the Vietnamese-mode prime check for one key-down.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct PrimeStep {
    /// Ask the accessibility collaborator whether the caret is at a sentence
    /// start, and prime the engine if it is.
    pub attempt: bool,
    /// Next value of the pending flag.
    pub pending: bool,
}

/// Focus-moving modifiers: a key typed with any of these likely moved the
/// caret somewhere new.
const FOCUS_MODIFIERS: CgFlags = CgFlags::COMMAND
    .union(CgFlags::CONTROL)
    .union(CgFlags::ALTERNATE)
    .union(CgFlags::SECONDARY_FN)
    .union(CgFlags::NUMERIC_PAD)
    .union(CgFlags::HELP);

/// Advance the prime check. `ch` is the character the key produces, if any.
pub fn uppercase_prime_transition(
    pending: bool,
    flags: CgFlags,
    key: u16,
    ch: Option<char>,
) -> PrimeStep {
    let k = Key::from_scancode(key);
    let focus_move = flags.intersects(FOCUS_MODIFIERS)
        || k.is_some_and(|k| k == Key::Tab || k.is_navigation());
    let pending = pending || focus_move;
    let candidate = !flags.intersects(BLOCKING)
        && ch.is_some_and(|c| !matches!(c, ' ' | '\t' | '\n' | '\r'));
    if pending && candidate {
        PrimeStep {
            attempt: true,
            pending: false,
        }
    } else {
        PrimeStep {
            attempt: false,
            pending,
        }
    }
}

/// Rewrite an outgoing event to type `key` uppercase: adds Shift and
/// returns the replacement Unicode payload.
pub fn force_uppercase(key: u16, flags: CgFlags) -> (CgFlags, Option<Vec<u16>>) {
    let units = Key::from_scancode(key)
        .and_then(|k| k.to_char(true))
        .map(|c| {
            let mut buf = [0u16; 2];
            c.encode_utf16(&mut buf).to_vec()
        });
    (flags | CgFlags::SHIFT, units)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Feed `keys` through the English transition; returns the forced keys.
    fn type_keys(keys: &[(Key, CgFlags)]) -> Vec<bool> {
        let mut st = EnglishUppercaseState::IDLE;
        keys.iter()
            .map(|(k, f)| {
                let (next, force) = english_uppercase_transition(st, k.scancode(), *f, true, false);
                st = next;
                force
            })
            .collect()
    }

    fn plain(k: Key) -> (Key, CgFlags) {
        (k, CgFlags::empty())
    }

    #[test]
    fn period_space_letter_forces() {
        let forced = type_keys(&[
            (Key::H, CgFlags::SHIFT),
            plain(Key::E),
            plain(Key::L),
            plain(Key::L),
            plain(Key::O),
            plain(Key::Period),
            plain(Key::Space),
            plain(Key::W),
        ]);
        assert_eq!(forced.last(), Some(&true));
        assert_eq!(forced.iter().filter(|f| **f).count(), 1);
    }

    #[test]
    fn double_space_still_forces() {
        let forced = type_keys(&[
            plain(Key::O),
            plain(Key::Period),
            plain(Key::Space),
            plain(Key::Space),
            plain(Key::W),
        ]);
        assert_eq!(forced.last(), Some(&true));
    }

    #[test]
    fn decimal_point_does_not_force() {
        let forced = type_keys(&[
            plain(Key::Digit3),
            plain(Key::Period),
            plain(Key::Digit1),
            plain(Key::Digit4),
            plain(Key::X),
        ]);
        assert!(forced.iter().all(|f| !f));
    }

    #[test]
    fn letter_without_space_after_period_disarms() {
        let forced = type_keys(&[plain(Key::Period), plain(Key::C), plain(Key::Space), plain(Key::D)]);
        assert!(forced.iter().all(|f| !f));
    }

    #[test]
    fn exclamation_needs_no_space() {
        let forced = type_keys(&[(Key::Digit1, CgFlags::SHIFT), plain(Key::A)]);
        assert_eq!(forced, vec![false, true]);
    }

    #[test]
    fn quotes_and_parens_are_skipped() {
        let forced = type_keys(&[
            plain(Key::Period),
            plain(Key::Space),
            plain(Key::Quote),
            (Key::Digit9, CgFlags::SHIFT),
            plain(Key::A),
        ]);
        assert_eq!(forced.last(), Some(&true));
    }

    #[test]
    fn shift_already_held_is_not_forced() {
        let forced = type_keys(&[plain(Key::Period), plain(Key::Space), (Key::A, CgFlags::SHIFT)]);
        assert_eq!(forced.last(), Some(&false));
    }

    #[test]
    fn enter_disarms() {
        let forced = type_keys(&[plain(Key::Period), plain(Key::Return), plain(Key::A)]);
        assert!(forced.iter().all(|f| !f));
    }

    #[test]
    fn shortcut_leaves_state_alone() {
        let st = EnglishUppercaseState {
            pending: true,
            needs_space_confirm: false,
        };
        let (next, force) =
            english_uppercase_transition(st, Key::A.scancode(), CgFlags::COMMAND, true, false);
        assert_eq!(next, st);
        assert!(!force);
    }

    #[test]
    fn disabled_or_excluded_is_idle() {
        let st = EnglishUppercaseState {
            pending: true,
            needs_space_confirm: false,
        };
        for (enabled, excluded) in [(false, false), (true, true)] {
            let (next, force) =
                english_uppercase_transition(st, Key::A.scancode(), CgFlags::empty(), enabled, excluded);
            assert_eq!(next, EnglishUppercaseState::IDLE);
            assert!(!force);
        }
    }

    #[test]
    fn prime_arms_on_focus_moves() {
        let tab = uppercase_prime_transition(false, CgFlags::empty(), Key::Tab.scancode(), Some('\t'));
        assert!(!tab.attempt && tab.pending);
        let next = uppercase_prime_transition(tab.pending, CgFlags::empty(), Key::A.scancode(), Some('a'));
        assert!(next.attempt && !next.pending);
        let idle = uppercase_prime_transition(false, CgFlags::empty(), Key::A.scancode(), Some('a'));
        assert!(!idle.attempt && !idle.pending);
    }

    #[test]
    fn prime_waits_through_whitespace() {
        let st = uppercase_prime_transition(true, CgFlags::empty(), Key::Space.scancode(), Some(' '));
        assert!(!st.attempt && st.pending);
    }

    #[test]
    fn forced_uppercase_sets_shift_and_payload() {
        let (flags, units) = force_uppercase(Key::W.scancode(), CgFlags::NON_COALESCED);
        assert!(flags.contains(CgFlags::SHIFT | CgFlags::NON_COALESCED));
        assert_eq!(units, Some(vec![u16::from(b'W')]));
    }

    #[test]
    fn primed_letter_is_forced_unless_cased() {
        assert_eq!(english_primed_key(Key::W.scancode(), CgFlags::empty()), PrimedKey::Force);
        assert_eq!(english_primed_key(Key::W.scancode(), CgFlags::SHIFT), PrimedKey::Ignore);
        assert_eq!(english_primed_key(Key::W.scancode(), CgFlags::ALPHA_SHIFT), PrimedKey::Ignore);
        assert_eq!(english_primed_key(Key::W.scancode(), CgFlags::CONTROL), PrimedKey::Ignore);
    }

    #[test]
    fn primed_space_and_quote_carry_forward() {
        let carried = PrimedKey::Carry(EnglishUppercaseState {
            pending: true,
            needs_space_confirm: false,
        });
        assert_eq!(english_primed_key(Key::Space.scancode(), CgFlags::empty()), carried);
        assert_eq!(english_primed_key(Key::Quote.scancode(), CgFlags::empty()), carried);
        assert_eq!(
            english_primed_key(Key::Period.scancode(), CgFlags::empty()),
            PrimedKey::Carry(EnglishUppercaseState {
                pending: true,
                needs_space_confirm: true,
            })
        );
        assert_eq!(english_primed_key(Key::Digit5.scancode(), CgFlags::empty()), PrimedKey::Ignore);
    }

    #[test]
    fn carried_prime_forces_the_next_letter() {
        let PrimedKey::Carry(st) = english_primed_key(Key::Space.scancode(), CgFlags::empty()) else {
            panic!("space should carry the prime");
        };
        let (next, force) =
            english_uppercase_transition(st, Key::H.scancode(), CgFlags::empty(), true, false);
        assert_eq!(next, EnglishUppercaseState::IDLE);
        assert!(force);
    }

    fn idle_key() -> impl Strategy<Value = Key> {
        prop::sample::select(vec![
            Key::Digit2,
            Key::Digit3,
            Key::Minus,
            Key::Equal,
            Key::Comma,
            Key::Semicolon,
            Key::Space,
            Key::Tab,
            Key::LeftArrow,
            Key::Delete,
            Key::Backslash,
            Key::Grave,
        ])
    }

    proptest! {
        #[test]
        fn idle_stays_idle_on_non_terminators(keys in prop::collection::vec(idle_key(), 0..40)) {
            let mut st = EnglishUppercaseState::IDLE;
            for k in keys {
                let (next, force) = english_uppercase_transition(st, k.scancode(), CgFlags::empty(), true, false);
                prop_assert_eq!(next, EnglishUppercaseState::IDLE);
                prop_assert!(!force);
                st = next;
            }
        }
    }
}
