//! Modifier and hotkey transitions.
//!
//! Every function here is a pure step `(ModifierState, inputs) -> outcome`
//! carrying the next state; the pipeline stores it back under its lock.

use mac_keycode::CgFlags;

use crate::{Language, Settings};

/// Bits that decide whether a flags-changed event is a press or a release.
const TRACKED: CgFlags = CgFlags::HOTKEY.union(CgFlags::ALPHA_SHIFT);

/// Modifiers that keep the pause modifier in place when combined with it.
const SIGNIFICANT: CgFlags = CgFlags::COMMAND
    .union(CgFlags::CONTROL)
    .union(CgFlags::ALTERNATE)
    .union(CgFlags::SHIFT);

/// Modifier tracking shared by every callback.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ModifierState {
    /// Flags seen on the last modifier press; empty after a release.
    pub last_flags: CgFlags,
    /// The next printable key should ask whether to capitalise.
    pub pending_uppercase_prime_check: bool,
    /// A hotkey fired during the current press/release cycle.
    pub has_just_used_hotkey: bool,
    /// The pause modifier is held.
    pub pause_pressed: bool,
    /// Language to return to when the pause modifier is released.
    pub saved_language: Language,
    /// The restore modifier is held.
    pub restore_modifier_pressed: bool,
    /// A key went down while the restore modifier was held.
    pub key_pressed_with_restore_modifier: bool,
    /// A key went down while a modifier-only switch/convert combo was held.
    pub key_pressed_while_switch_modifiers_held: bool,
    /// A key went down while the modifier-only emoji combo was held.
    pub key_pressed_while_emoji_modifiers_held: bool,
}

impl ModifierState {
    /// State for a freshly started tap: everything cleared, prime check armed.
    pub fn fresh() -> Self {
        Self {
            pending_uppercase_prime_check: true,
            ..Self::default()
        }
    }

    /// Clear per-cycle tracking at the start of a new typing session.
    pub fn reset_session(self) -> Self {
        Self {
            last_flags: CgFlags::empty(),
            has_just_used_hotkey: false,
            pending_uppercase_prime_check: true,
            ..self
        }
    }
}

/// How a flags-changed event relates to the last press.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlagsChange {
    /// A modifier went down.
    Press,
    /// A modifier went up.
    Release,
    /// Nothing tracked changed.
    Unchanged,
}

/// Classify a flags-changed event against `last`.
pub fn classify_flags_change(last: CgFlags, new: CgFlags) -> FlagsChange {
    let last = last & TRACKED;
    let new = new & TRACKED;
    if last.is_empty() {
        return FlagsChange::Press;
    }
    if new == last {
        return FlagsChange::Unchanged;
    }
    if new.contains(last) {
        return FlagsChange::Press;
    }
    if last.contains(new) {
        return FlagsChange::Release;
    }
    if new.bits() > last.bits() {
        FlagsChange::Press
    } else {
        FlagsChange::Release
    }
}

/// Result of a modifier press.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PressOutcome {
    /// State to store.
    pub state: ModifierState,
    /// Language to switch to, when the pause key engaged.
    pub language: Option<Language>,
}

/// Hotkey action decided on modifier release.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ReleaseAction {
    /// Nothing fired.
    #[default]
    None,
    /// Toggle English/Vietnamese.
    SwitchLanguage,
    /// Convert the selection.
    QuickConvert,
    /// Open the emoji picker.
    EmojiPicker,
    /// Toggle spell-check suspension.
    TempOffSpelling,
    /// Toggle the temporary engine bypass.
    TempOffEngine,
}

impl ReleaseAction {
    /// Actions the pipeline consumes the event for.
    pub fn is_hotkey(self) -> bool {
        matches!(
            self,
            Self::SwitchLanguage | Self::QuickConvert | Self::EmojiPicker
        )
    }
}

/// Result of a modifier release.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReleaseOutcome {
    /// State to store.
    pub state: ModifierState,
    /// Hotkey action to perform.
    pub action: ReleaseAction,
    /// The restore modifier was tapped alone; try restoring the raw keys
    /// before anything else.
    pub attempt_restore: bool,
    /// Language to switch to, when the pause key was released.
    pub language: Option<Language>,
}

/// Hotkey action decided on key-down.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum KeyDownAction {
    /// Nothing fired.
    #[default]
    None,
    /// Toggle English/Vietnamese.
    SwitchLanguage,
    /// Convert the selection.
    QuickConvert,
    /// Open the emoji picker.
    EmojiPicker,
}

/// Result of the key-down hotkey check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyDownOutcome {
    /// State to store.
    pub state: ModifierState,
    /// Action to perform; the event is swallowed when it is handled.
    pub action: KeyDownAction,
}

/// True when `bit` was held in `old` and is not in `new`.
fn released(bit: CgFlags, old: CgFlags, new: CgFlags) -> bool {
    old.contains(bit) && !new.contains(bit)
}

/// A modifier went down.
pub fn on_modifier_press(
    state: ModifierState,
    flags: CgFlags,
    settings: &Settings,
    current: Language,
) -> PressOutcome {
    let mut next = ModifierState {
        last_flags: flags,
        key_pressed_while_switch_modifiers_held: false,
        key_pressed_while_emoji_modifiers_held: false,
        ..state
    };
    if settings.restore_on_escape
        && let Some(bit) = settings.restore_modifier_flag()
        && flags.contains(bit)
    {
        next.restore_modifier_pressed = true;
        next.key_pressed_with_restore_modifier = false;
    }

    let mut language = None;
    if let Some(mask) = settings.pause_flag()
        && flags.contains(mask)
        && !state.pause_pressed
    {
        next.pause_pressed = true;
        next.saved_language = current;
        if current == Language::Vietnamese {
            language = Some(Language::English);
        }
    }
    PressOutcome {
        state: next,
        language,
    }
}

/// A modifier went up. `old` is the flags stored by the last press.
pub fn on_modifier_release(
    state: ModifierState,
    old: CgFlags,
    new: CgFlags,
    settings: &Settings,
) -> ReleaseOutcome {
    let restore_bit = settings.restore_modifier_flag();
    let restore_released = restore_bit.is_some_and(|b| released(b, old, new));
    let attempt_restore = settings.restore_on_escape
        && state.restore_modifier_pressed
        && !state.key_pressed_with_restore_modifier
        && !state.has_just_used_hotkey
        && restore_released;

    let action = release_action(&state, old, settings);

    let mut next = ModifierState {
        last_flags: CgFlags::empty(),
        key_pressed_while_switch_modifiers_held: false,
        key_pressed_while_emoji_modifiers_held: false,
        has_just_used_hotkey: action.is_hotkey(),
        ..state
    };
    if state.restore_modifier_pressed && restore_released {
        next.restore_modifier_pressed = false;
    }

    let mut language = None;
    if state.pause_pressed
        && let Some(mask) = settings.pause_flag()
        && released(mask, old, new)
    {
        next.pause_pressed = false;
        language = Some(state.saved_language);
    }

    ReleaseOutcome {
        state: next,
        action,
        attempt_restore,
        language,
    }
}

/// Which hotkey, if any, the release of `old` completes.
///
/// Only modifier-only switch and convert bindings fire on release; a binding
/// with a key fires on its key-down instead.
pub fn release_action(state: &ModifierState, old: CgFlags, settings: &Settings) -> ReleaseAction {
    let switch = &settings.switch_hotkey;
    if switch.is_modifier_only()
        && !state.key_pressed_while_switch_modifiers_held
        && switch.matches_exact(old, None)
    {
        return ReleaseAction::SwitchLanguage;
    }
    let convert = &settings.convert_hotkey;
    if convert.is_modifier_only()
        && !state.key_pressed_while_switch_modifiers_held
        && convert.matches_exact(old, None)
    {
        return ReleaseAction::QuickConvert;
    }
    if !state.key_pressed_while_emoji_modifiers_held && settings.emoji_hotkey.matches_release(old) {
        return ReleaseAction::EmojiPicker;
    }
    if settings.temp_off_spelling && !state.has_just_used_hotkey && old.contains(CgFlags::CONTROL) {
        return ReleaseAction::TempOffSpelling;
    }
    if settings.temp_off_engine && !state.has_just_used_hotkey && old.contains(CgFlags::COMMAND) {
        return ReleaseAction::TempOffEngine;
    }
    ReleaseAction::None
}

/// Evaluate the keyed hotkeys for a key-down.
///
/// A key that belongs to no hotkey clears stale modifier state left by a
/// press whose release was never seen.
pub fn on_key_down_hotkey(
    state: ModifierState,
    key: u16,
    flags: CgFlags,
    settings: &Settings,
) -> KeyDownOutcome {
    let switch = &settings.switch_hotkey;
    let convert = &settings.convert_hotkey;
    let emoji = &settings.emoji_hotkey;
    let is_switch_key = switch.key == Some(key);
    let is_convert_key = convert.key == Some(key);
    let is_emoji_key = emoji.enabled && emoji.hotkey.key == Some(key);

    if !is_switch_key && !is_convert_key && !is_emoji_key {
        return KeyDownOutcome {
            state: ModifierState {
                last_flags: CgFlags::empty(),
                has_just_used_hotkey: false,
                ..state
            },
            action: KeyDownAction::None,
        };
    }

    let last = state.last_flags;
    let fired = |hk: &crate::Hotkey| {
        hk.matches_exact(last, Some(key)) || hk.matches_exact(flags, Some(key))
    };
    let action = if is_switch_key && fired(switch) {
        KeyDownAction::SwitchLanguage
    } else if is_convert_key && fired(convert) {
        KeyDownAction::QuickConvert
    } else if is_emoji_key && emoji.matches_key_down(flags, key) {
        KeyDownAction::EmojiPicker
    } else {
        KeyDownAction::None
    };
    KeyDownOutcome {
        state: ModifierState {
            has_just_used_hotkey: !last.is_empty(),
            ..state
        },
        action,
    }
}

/// State after a key-down hotkey was handled and its event swallowed.
pub fn after_key_down_hotkey(state: ModifierState) -> ModifierState {
    ModifierState {
        last_flags: CgFlags::empty(),
        has_just_used_hotkey: true,
        ..state
    }
}

/// A non-modifier key went down: invalidate pending release actions whose
/// modifiers are held.
pub fn on_key_down_tracking(
    state: ModifierState,
    flags: CgFlags,
    settings: &Settings,
) -> ModifierState {
    let mut next = state;
    if settings.restore_on_escape
        && settings.custom_escape_key.is_some()
        && state.restore_modifier_pressed
    {
        next.key_pressed_with_restore_modifier = true;
    }
    let held = |hk: &crate::Hotkey| hk.is_modifier_only() && hk.modifiers_held(flags);
    if held(&settings.switch_hotkey) || held(&settings.convert_hotkey) {
        next.key_pressed_while_switch_modifiers_held = true;
    }
    let emoji = &settings.emoji_hotkey;
    if emoji.is_modifier_only() && emoji.modifiers_held(flags) {
        next.key_pressed_while_emoji_modifiers_held = true;
    }
    next
}

/// While paused, drop the pause modifier from key events so the app sees a
/// plain keystroke. Returns `None` when the flags stay as they are.
pub fn strip_pause_modifier(
    flags: CgFlags,
    pause_pressed: bool,
    settings: &Settings,
) -> Option<CgFlags> {
    if !pause_pressed {
        return None;
    }
    let mask = settings.pause_flag()?;
    let others = flags - CgFlags::NON_COALESCED - mask;
    if others.intersects(SIGNIFICANT) {
        return None;
    }
    Some(flags - mask)
}

#[cfg(test)]
mod tests {
    use mac_keycode::{Key, Modifier};
    use proptest::prelude::*;

    use super::*;
    use crate::{EmojiHotkey, Hotkey};

    fn restore_settings() -> Settings {
        Settings {
            restore_on_escape: true,
            custom_escape_key: Some(Modifier::Option),
            ..Settings::default()
        }
    }

    #[test]
    fn classify_press_and_release() {
        let ctrl = CgFlags::CONTROL;
        let ctrl_shift = CgFlags::CONTROL | CgFlags::SHIFT;
        assert_eq!(classify_flags_change(CgFlags::empty(), ctrl), FlagsChange::Press);
        assert_eq!(classify_flags_change(ctrl, ctrl_shift), FlagsChange::Press);
        assert_eq!(classify_flags_change(ctrl_shift, ctrl), FlagsChange::Release);
        assert_eq!(classify_flags_change(ctrl, ctrl | CgFlags::NON_COALESCED), FlagsChange::Unchanged);
        assert_eq!(
            classify_flags_change(CgFlags::SHIFT, CgFlags::COMMAND),
            FlagsChange::Press
        );
    }

    #[test]
    fn tapping_restore_modifier_attempts_restore() {
        let s = restore_settings();
        let st = ModifierState::fresh();
        let p = on_modifier_press(st, CgFlags::ALTERNATE, &s, Language::Vietnamese);
        assert!(p.state.restore_modifier_pressed);
        let r = on_modifier_release(p.state, CgFlags::ALTERNATE, CgFlags::empty(), &s);
        assert!(r.attempt_restore);
        assert!(!r.state.restore_modifier_pressed);
        assert!(!r.state.has_just_used_hotkey);
    }

    #[test]
    fn key_while_restore_modifier_held_cancels_restore() {
        let s = restore_settings();
        let p = on_modifier_press(ModifierState::fresh(), CgFlags::ALTERNATE, &s, Language::Vietnamese);
        let st = on_key_down_tracking(p.state, CgFlags::ALTERNATE, &s);
        let r = on_modifier_release(st, CgFlags::ALTERNATE, CgFlags::empty(), &s);
        assert!(!r.attempt_restore);
    }

    #[test]
    fn restore_needs_no_hotkey_in_cycle() {
        let s = restore_settings();
        let p = on_modifier_press(ModifierState::fresh(), CgFlags::ALTERNATE, &s, Language::Vietnamese);
        let st = ModifierState {
            has_just_used_hotkey: true,
            ..p.state
        };
        let r = on_modifier_release(st, CgFlags::ALTERNATE, CgFlags::empty(), &s);
        assert!(!r.attempt_restore);
    }

    #[test]
    fn modifier_only_switch_fires_on_release() {
        let s = Settings::default();
        let both = CgFlags::CONTROL | CgFlags::SHIFT;
        let p1 = on_modifier_press(ModifierState::fresh(), CgFlags::CONTROL, &s, Language::English);
        let p2 = on_modifier_press(p1.state, both, &s, Language::English);
        let r = on_modifier_release(p2.state, p2.state.last_flags, CgFlags::CONTROL, &s);
        assert_eq!(r.action, ReleaseAction::SwitchLanguage);
        assert!(r.state.has_just_used_hotkey);
        assert!(r.state.last_flags.is_empty());
    }

    #[test]
    fn key_pressed_with_switch_modifiers_suppresses_switch() {
        let s = Settings::default();
        let both = CgFlags::CONTROL | CgFlags::SHIFT;
        let p = on_modifier_press(ModifierState::fresh(), both, &s, Language::English);
        let st = on_key_down_tracking(p.state, both, &s);
        assert!(st.key_pressed_while_switch_modifiers_held);
        let r = on_modifier_release(st, both, CgFlags::CONTROL, &s);
        assert_eq!(r.action, ReleaseAction::None);
    }

    #[test]
    fn temp_off_actions_follow_released_modifier() {
        let s = Settings {
            switch_hotkey: Hotkey::default(),
            temp_off_spelling: true,
            temp_off_engine: true,
            ..Settings::default()
        };
        let st = ModifierState::fresh();
        assert_eq!(
            release_action(&st, CgFlags::CONTROL, &s),
            ReleaseAction::TempOffSpelling
        );
        assert_eq!(
            release_action(&st, CgFlags::COMMAND, &s),
            ReleaseAction::TempOffEngine
        );
        let used = ModifierState {
            has_just_used_hotkey: true,
            ..st
        };
        assert_eq!(release_action(&used, CgFlags::CONTROL, &s), ReleaseAction::None);
    }

    #[test]
    fn emoji_modifier_only_release() {
        let s = Settings {
            emoji_hotkey: EmojiHotkey {
                enabled: true,
                hotkey: Hotkey::modifiers(CgFlags::COMMAND | CgFlags::ALTERNATE),
            },
            ..Settings::default()
        };
        let st = ModifierState::fresh();
        assert_eq!(
            release_action(&st, CgFlags::COMMAND | CgFlags::ALTERNATE, &s),
            ReleaseAction::EmojiPicker
        );
        let held = on_key_down_tracking(st, CgFlags::COMMAND | CgFlags::ALTERNATE, &s);
        assert_eq!(
            release_action(&held, CgFlags::COMMAND | CgFlags::ALTERNATE, &s),
            ReleaseAction::None
        );
    }

    #[test]
    fn pause_switches_to_english_and_back() {
        let s = Settings {
            pause_key_enabled: true,
            pause_key: Modifier::Option,
            ..Settings::default()
        };
        let p = on_modifier_press(ModifierState::fresh(), CgFlags::ALTERNATE, &s, Language::Vietnamese);
        assert_eq!(p.language, Some(Language::English));
        assert!(p.state.pause_pressed);
        assert_eq!(p.state.saved_language, Language::Vietnamese);

        assert_eq!(
            strip_pause_modifier(CgFlags::ALTERNATE | CgFlags::NON_COALESCED, true, &s),
            Some(CgFlags::NON_COALESCED)
        );
        assert_eq!(
            strip_pause_modifier(CgFlags::ALTERNATE | CgFlags::COMMAND, true, &s),
            None
        );

        let r = on_modifier_release(p.state, CgFlags::ALTERNATE, CgFlags::empty(), &s);
        assert_eq!(r.language, Some(Language::Vietnamese));
        assert!(!r.state.pause_pressed);
    }

    #[test]
    fn pause_in_english_keeps_language() {
        let s = Settings {
            pause_key_enabled: true,
            pause_key: Modifier::Control,
            ..Settings::default()
        };
        let p = on_modifier_press(ModifierState::fresh(), CgFlags::CONTROL, &s, Language::English);
        assert_eq!(p.language, None);
        assert!(p.state.pause_pressed);
    }

    #[test]
    fn unrelated_key_clears_stale_modifiers() {
        let s = Settings::default();
        let st = ModifierState {
            last_flags: CgFlags::CONTROL,
            has_just_used_hotkey: true,
            ..ModifierState::fresh()
        };
        let out = on_key_down_hotkey(st, Key::A.scancode(), CgFlags::empty(), &s);
        assert_eq!(out.action, KeyDownAction::None);
        assert!(out.state.last_flags.is_empty());
        assert!(!out.state.has_just_used_hotkey);
    }

    #[test]
    fn keyed_switch_matches_current_or_last_flags() {
        let s = Settings {
            switch_hotkey: Hotkey::chord(CgFlags::COMMAND, Key::Space),
            ..Settings::default()
        };
        let key = Key::Space.scancode();
        let out = on_key_down_hotkey(ModifierState::fresh(), key, CgFlags::COMMAND, &s);
        assert_eq!(out.action, KeyDownAction::SwitchLanguage);
        assert!(!out.state.has_just_used_hotkey);

        let st = ModifierState {
            last_flags: CgFlags::COMMAND,
            ..ModifierState::fresh()
        };
        let out = on_key_down_hotkey(st, key, CgFlags::empty(), &s);
        assert_eq!(out.action, KeyDownAction::SwitchLanguage);
        assert!(out.state.has_just_used_hotkey);

        let handled = after_key_down_hotkey(out.state);
        assert!(handled.last_flags.is_empty());
        assert!(handled.has_just_used_hotkey);
    }

    #[test]
    fn session_reset_arms_prime_and_clears_cycle() {
        let st = ModifierState {
            last_flags: CgFlags::SHIFT,
            has_just_used_hotkey: true,
            pause_pressed: true,
            ..ModifierState::default()
        };
        let r = st.reset_session();
        assert!(r.pending_uppercase_prime_check);
        assert!(r.last_flags.is_empty());
        assert!(!r.has_just_used_hotkey);
        assert!(r.pause_pressed);
    }

    fn modifier_flag() -> impl Strategy<Value = CgFlags> {
        prop_oneof![
            Just(CgFlags::CONTROL),
            Just(CgFlags::ALTERNATE),
            Just(CgFlags::COMMAND),
            Just(CgFlags::SHIFT),
            Just(CgFlags::SECONDARY_FN),
        ]
    }

    proptest! {
        #[test]
        fn press_then_release_clears_hotkey_flag(flag in modifier_flag(), restore in any::<bool>()) {
            let s = Settings {
                switch_hotkey: Hotkey::default(),
                restore_on_escape: restore,
                custom_escape_key: Some(Modifier::Option),
                ..Settings::default()
            };
            let st = ModifierState {
                has_just_used_hotkey: false,
                ..ModifierState::fresh()
            };
            let p = on_modifier_press(st, flag, &s, Language::Vietnamese);
            let r = on_modifier_release(p.state, flag, CgFlags::empty(), &s);
            prop_assert!(!r.state.has_just_used_hotkey);
            prop_assert_eq!(r.attempt_restore, restore && flag == CgFlags::ALTERNATE);
        }
    }
}
