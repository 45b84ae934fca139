//! Settings snapshot read by the callback thread.
//!
//! Settings are plain data loaded from JSON. The UI side publishes a whole new
//! [`Settings`] through [`SettingsHandle::replace`]; the callback thread takes
//! one `Arc` per event and never sees a half-applied change.

use std::{fs, path::Path, sync::Arc, time::Duration};

use mac_keycode::{CgFlags, Key, Modifier};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// Packed form: key code bits.
const PACKED_KEY: u32 = 0x00FF;
/// Packed form: Control.
const PACKED_CONTROL: u32 = 0x0100;
/// Packed form: Option.
const PACKED_OPTION: u32 = 0x0200;
/// Packed form: Command.
const PACKED_COMMAND: u32 = 0x0400;
/// Packed form: Shift.
const PACKED_SHIFT: u32 = 0x0800;
/// Packed form: Fn.
const PACKED_FN: u32 = 0x1000;
/// Packed form: beep on toggle.
const PACKED_BEEP: u32 = 0x8000;
/// Packed key value meaning "modifier-only".
const PACKED_NO_KEY: u32 = 0x00FE;
/// Packed value of an unset hotkey.
pub const PACKED_EMPTY: u32 = 0xFE00_00FE;

/// A hotkey: a modifier combination, optionally with a key.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Hotkey {
    /// Control held.
    pub control: bool,
    /// Option held.
    pub option: bool,
    /// Command held.
    pub command: bool,
    /// Shift held.
    pub shift: bool,
    /// Fn held.
    #[serde(rename = "fn")]
    pub function: bool,
    /// Key code; `None` fires on modifier release.
    pub key: Option<u16>,
    /// Beep when fired.
    pub beep: bool,
}

impl Hotkey {
    /// A modifier-only hotkey.
    pub fn modifiers(flags: CgFlags) -> Self {
        Self {
            control: flags.contains(CgFlags::CONTROL),
            option: flags.contains(CgFlags::ALTERNATE),
            command: flags.contains(CgFlags::COMMAND),
            shift: flags.contains(CgFlags::SHIFT),
            function: flags.contains(CgFlags::SECONDARY_FN),
            key: None,
            beep: false,
        }
    }

    /// A modifier combination plus a key.
    pub fn chord(flags: CgFlags, key: Key) -> Self {
        Self {
            key: Some(key.scancode()),
            ..Self::modifiers(flags)
        }
    }

    /// Decode the packed `u32` interchange form.
    pub fn from_packed(packed: u32) -> Self {
        if packed & !PACKED_BEEP == PACKED_EMPTY {
            return Self {
                beep: packed & PACKED_BEEP != 0,
                ..Self::default()
            };
        }
        let key = packed & PACKED_KEY;
        Self {
            control: packed & PACKED_CONTROL != 0,
            option: packed & PACKED_OPTION != 0,
            command: packed & PACKED_COMMAND != 0,
            shift: packed & PACKED_SHIFT != 0,
            function: packed & PACKED_FN != 0,
            key: (key != PACKED_NO_KEY).then_some(key as u16),
            beep: packed & PACKED_BEEP != 0,
        }
    }

    /// Encode to the packed `u32` interchange form.
    pub fn to_packed(&self) -> u32 {
        let beep = if self.beep { PACKED_BEEP } else { 0 };
        if self.is_empty() {
            return PACKED_EMPTY | beep;
        }
        let mut packed = self
            .key
            .map_or(PACKED_NO_KEY, |k| u32::from(k) & PACKED_KEY);
        for (on, bit) in [
            (self.control, PACKED_CONTROL),
            (self.option, PACKED_OPTION),
            (self.command, PACKED_COMMAND),
            (self.shift, PACKED_SHIFT),
            (self.function, PACKED_FN),
        ] {
            if on {
                packed |= bit;
            }
        }
        packed | beep
    }

    /// No modifiers and no key.
    pub fn is_empty(&self) -> bool {
        self.flags().is_empty() && self.key.is_none()
    }

    /// Fires on modifier release rather than on a key-down.
    pub fn is_modifier_only(&self) -> bool {
        self.key.is_none()
    }

    /// The modifier bits this hotkey requires.
    pub fn flags(&self) -> CgFlags {
        let mut f = CgFlags::empty();
        f.set(CgFlags::CONTROL, self.control);
        f.set(CgFlags::ALTERNATE, self.option);
        f.set(CgFlags::COMMAND, self.command);
        f.set(CgFlags::SHIFT, self.shift);
        f.set(CgFlags::SECONDARY_FN, self.function);
        f
    }

    /// Exactly these modifiers are held and, when `key` is given, it is the
    /// configured key.
    pub fn matches_exact(&self, flags: CgFlags, key: Option<u16>) -> bool {
        if self.is_empty() || flags.hotkey_bits() != self.flags() {
            return false;
        }
        match key {
            Some(k) => self.key == Some(k),
            None => true,
        }
    }

    /// At least these modifiers are held.
    pub fn modifiers_held(&self, flags: CgFlags) -> bool {
        !self.is_empty() && flags.contains(self.flags())
    }
}

/// The emoji picker hotkey.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EmojiHotkey {
    /// Hotkey active.
    pub enabled: bool,
    /// Combination; needs at least one modifier.
    #[serde(flatten)]
    pub hotkey: Hotkey,
}

impl EmojiHotkey {
    /// Enabled, has modifiers, and fires on release.
    pub fn is_modifier_only(&self) -> bool {
        self.enabled && self.hotkey.is_modifier_only()
    }

    /// Key-down check: the configured key with exactly the configured modifiers.
    pub fn matches_key_down(&self, flags: CgFlags, key: u16) -> bool {
        self.enabled
            && self.hotkey.key == Some(key)
            && !self.hotkey.flags().is_empty()
            && flags.hotkey_bits() == self.hotkey.flags()
    }

    /// All configured modifiers are held.
    pub fn modifiers_held(&self, flags: CgFlags) -> bool {
        let expected = self.hotkey.flags();
        !expected.is_empty() && flags.contains(expected)
    }

    /// Release check against the flags held before the release.
    pub fn matches_release(&self, old_flags: CgFlags) -> bool {
        let expected = self.hotkey.flags();
        self.is_modifier_only() && !expected.is_empty() && old_flags.hotkey_bits() == expected
    }
}

/// Everything the pipeline reads from the user's configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Toggle between English and Vietnamese.
    pub switch_hotkey: Hotkey,
    /// Quick-convert the selection.
    pub convert_hotkey: Hotkey,
    /// Open the emoji picker.
    pub emoji_hotkey: EmojiHotkey,

    /// Restore the raw keys when the escape modifier is tapped alone.
    pub restore_on_escape: bool,
    /// Modifier used as the restore key (Option or Control sides).
    pub custom_escape_key: Option<Modifier>,
    /// Holding the pause modifier temporarily types English.
    pub pause_key_enabled: bool,
    /// Modifier used as the pause key.
    pub pause_key: Modifier,

    /// Capitalise the first letter of a sentence.
    pub upper_case_first_char: bool,
    /// Bundle ids where capitalisation is skipped.
    pub upper_case_excluded_apps: Vec<String>,
    /// Releasing Control toggles spell-check suspension.
    pub temp_off_spelling: bool,
    /// Releasing Command toggles a temporary engine bypass.
    pub temp_off_engine: bool,
    /// Apply the browser autocomplete fixes.
    pub fix_recommend_browser: bool,
    /// Always send output one key at a time.
    pub send_key_step_by_step: bool,
    /// Map keys of non-US layouts back to US key codes.
    pub layout_compat: bool,
    /// Skip every accessibility query.
    pub safe_mode: bool,
    /// Remember the language per application.
    pub smart_switch: bool,
    /// Also remember the code table per application.
    pub remember_code: bool,
    /// Expand macros.
    pub use_macro: bool,
    /// Expand macros while typing English.
    pub use_macro_in_english_mode: bool,
    /// Bundle ids where Vietnamese is never applied.
    pub excluded_apps: Vec<String>,

    /// TTL of the Spotlight-like detection cache.
    pub spotlight_cache_ms: u64,
    /// TTL of the per-process "Vietnamese disabled" answer.
    pub app_switch_cache_ms: u64,
    /// Maximum age of cached per-bundle characteristics.
    pub app_characteristics_max_age_ms: u64,
    /// How long an external Delete counts toward text-replacement detection.
    pub text_replacement_window_ms: u64,
    /// Hard ceiling on backspaces sent for one keystroke.
    pub backspace_safety_limit: u8,
    /// Healthy checks before the tap health cadence slows down.
    pub health_ramp_threshold: u32,
    /// Accessibility permission poll interval.
    pub permission_poll_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            switch_hotkey: Hotkey::modifiers(CgFlags::CONTROL | CgFlags::SHIFT),
            convert_hotkey: Hotkey::default(),
            emoji_hotkey: EmojiHotkey {
                enabled: false,
                hotkey: Hotkey::chord(CgFlags::COMMAND | CgFlags::CONTROL, Key::E),
            },
            restore_on_escape: true,
            custom_escape_key: None,
            pause_key_enabled: false,
            pause_key: Modifier::Option,
            upper_case_first_char: false,
            upper_case_excluded_apps: Vec::new(),
            temp_off_spelling: false,
            temp_off_engine: false,
            fix_recommend_browser: true,
            send_key_step_by_step: false,
            layout_compat: false,
            safe_mode: false,
            smart_switch: true,
            remember_code: true,
            use_macro: true,
            use_macro_in_english_mode: false,
            excluded_apps: Vec::new(),
            spotlight_cache_ms: 150,
            app_switch_cache_ms: 100,
            app_characteristics_max_age_ms: 10_000,
            text_replacement_window_ms: 30_000,
            backspace_safety_limit: 15,
            health_ramp_threshold: 2_000,
            permission_poll_ms: 1_000,
        }
    }
}

impl Settings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let settings = Self::from_json(&text)?;
        debug!(path = %path.display(), "settings_loaded");
        Ok(settings)
    }

    /// Normalized JSON form.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The flag bit of the restore modifier, if one is configured and usable.
    pub fn restore_modifier_flag(&self) -> Option<CgFlags> {
        match self.custom_escape_key? {
            Modifier::Option | Modifier::RightOption => Some(CgFlags::ALTERNATE),
            Modifier::Control | Modifier::RightControl => Some(CgFlags::CONTROL),
            _ => None,
        }
    }

    /// The flag bit of the pause modifier, if the pause key is enabled.
    pub fn pause_flag(&self) -> Option<CgFlags> {
        if !self.pause_key_enabled {
            return None;
        }
        match self.pause_key {
            Modifier::CapsLock => None,
            m => Some(m.flag()),
        }
    }

    /// Whether `bundle_id` skips first-letter capitalisation.
    pub fn upper_case_excluded(&self, bundle_id: Option<&str>) -> bool {
        bundle_id.is_some_and(|b| self.upper_case_excluded_apps.iter().any(|e| e == b))
    }

    /// Spotlight cache TTL.
    pub fn spotlight_ttl(&self) -> Duration {
        Duration::from_millis(self.spotlight_cache_ms)
    }

    /// App-switch cache TTL.
    pub fn app_switch_ttl(&self) -> Duration {
        Duration::from_millis(self.app_switch_cache_ms)
    }

    /// Maximum age of cached app characteristics.
    pub fn app_characteristics_max_age(&self) -> Duration {
        Duration::from_millis(self.app_characteristics_max_age_ms)
    }

    /// Text-replacement external-delete window.
    pub fn text_replacement_window(&self) -> Duration {
        Duration::from_millis(self.text_replacement_window_ms)
    }
}

/// Shared, atomically replaced settings snapshot.
#[derive(Debug, Default)]
pub struct SettingsHandle {
    /// Current snapshot.
    current: RwLock<Arc<Settings>>,
}

impl SettingsHandle {
    /// Publish an initial snapshot.
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    /// The current snapshot. Cheap; take it once per event.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.read().clone()
    }

    /// Replace the snapshot wholesale.
    pub fn replace(&self, settings: Settings) {
        *self.current.write() = Arc::new(settings);
        debug!("settings_replaced");
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn packed_layout_matches_interchange_form() {
        let hk = Hotkey::from_packed(0x0100 | 0x0800 | 0x00FE);
        assert!(hk.control && hk.shift && !hk.command);
        assert!(hk.is_modifier_only());
        assert_eq!(hk.to_packed(), 0x09FE);

        let hk = Hotkey::from_packed(0x0400 | 0x8000 | 0x31);
        assert_eq!(hk.key, Some(Key::Space.scancode()));
        assert!(hk.command && hk.beep);
    }

    #[test]
    fn empty_hotkey_never_matches() {
        let hk = Hotkey::from_packed(PACKED_EMPTY);
        assert!(hk.is_empty());
        assert!(!hk.matches_exact(CgFlags::empty(), None));
        assert!(!hk.modifiers_held(CgFlags::all()));
        assert_eq!(hk.to_packed(), PACKED_EMPTY);
    }

    #[test]
    fn exact_match_ignores_caps_lock_but_not_extra_modifiers() {
        let hk = Hotkey::modifiers(CgFlags::CONTROL | CgFlags::SHIFT);
        assert!(hk.matches_exact(CgFlags::CONTROL | CgFlags::SHIFT | CgFlags::ALPHA_SHIFT, None));
        assert!(!hk.matches_exact(CgFlags::CONTROL | CgFlags::SHIFT | CgFlags::COMMAND, None));
        assert!(hk.modifiers_held(CgFlags::CONTROL | CgFlags::SHIFT | CgFlags::COMMAND));
    }

    #[test]
    fn keyed_match_requires_the_key() {
        let hk = Hotkey::chord(CgFlags::COMMAND, Key::Space);
        assert!(hk.matches_exact(CgFlags::COMMAND, Some(Key::Space.scancode())));
        assert!(!hk.matches_exact(CgFlags::COMMAND, Some(Key::A.scancode())));
    }

    #[test]
    fn emoji_release_needs_modifier_only_binding() {
        let mut emoji = EmojiHotkey {
            enabled: true,
            hotkey: Hotkey::modifiers(CgFlags::COMMAND | CgFlags::ALTERNATE),
        };
        assert!(emoji.matches_release(CgFlags::COMMAND | CgFlags::ALTERNATE));
        assert!(!emoji.matches_release(CgFlags::COMMAND));
        emoji.hotkey.key = Some(Key::E.scancode());
        assert!(!emoji.matches_release(CgFlags::COMMAND | CgFlags::ALTERNATE));
        assert!(emoji.matches_key_down(CgFlags::COMMAND | CgFlags::ALTERNATE, Key::E.scancode()));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s = Settings::from_json(r#"{ "restore_on_escape": false, "custom_escape_key": "right_option" }"#)
            .unwrap();
        assert!(!s.restore_on_escape);
        assert_eq!(s.restore_modifier_flag(), Some(CgFlags::ALTERNATE));
        assert_eq!(s.backspace_safety_limit, 15);
        assert_eq!(s.health_ramp_threshold, 2_000);
    }

    #[test]
    fn only_option_and_control_restore() {
        let s = Settings {
            custom_escape_key: Some(Modifier::Command),
            ..Settings::default()
        };
        assert_eq!(s.restore_modifier_flag(), None);
    }

    #[test]
    fn snapshot_replacement_is_whole() {
        let h = SettingsHandle::new(Settings::default());
        let before = h.snapshot();
        h.replace(Settings {
            safe_mode: true,
            ..Settings::default()
        });
        assert!(!before.safe_mode);
        assert!(h.snapshot().safe_mode);
    }

    proptest! {
        #[test]
        fn packed_round_trip(
            mods in 0u32..32,
            key in prop_oneof![Just(None), (0u16..0xFE).prop_map(Some)],
            beep in any::<bool>(),
        ) {
            let hk = Hotkey {
                control: mods & 1 != 0,
                option: mods & 2 != 0,
                command: mods & 4 != 0,
                shift: mods & 8 != 0,
                function: mods & 16 != 0,
                key,
                beep,
            };
            prop_assert_eq!(Hotkey::from_packed(hk.to_packed()), hk);
        }
    }
}
