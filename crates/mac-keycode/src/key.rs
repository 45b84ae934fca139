//! Scancodes (macOS hardware virtual keycodes).
//!
//! A "scancode" is the integer reported by CoreGraphics in the
//! `kCGKeyboardEventKeycode` field, i.e. the `kVK_*` constants from
//! `HIToolbox/Events.h`. It is positional: it names a physical key, not a
//! character.

/// macOS hardware virtual keycode (`kVK_*`, `NSEvent.keyCode`).
pub type Scancode = u16;

/// Virtual keycodes used by the input pipeline.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum Key {
    A = 0x00,
    S = 0x01,
    D = 0x02,
    F = 0x03,
    H = 0x04,
    G = 0x05,
    Z = 0x06,
    X = 0x07,
    C = 0x08,
    V = 0x09,
    B = 0x0B,
    Q = 0x0C,
    W = 0x0D,
    E = 0x0E,
    R = 0x0F,
    Y = 0x10,
    T = 0x11,
    Digit1 = 0x12,
    Digit2 = 0x13,
    Digit3 = 0x14,
    Digit4 = 0x15,
    Digit6 = 0x16,
    Digit5 = 0x17,
    Equal = 0x18,
    Digit9 = 0x19,
    Digit7 = 0x1A,
    Minus = 0x1B,
    Digit8 = 0x1C,
    Digit0 = 0x1D,
    RightBracket = 0x1E,
    O = 0x1F,
    U = 0x20,
    LeftBracket = 0x21,
    I = 0x22,
    P = 0x23,
    Return = 0x24,
    L = 0x25,
    J = 0x26,
    Quote = 0x27,
    K = 0x28,
    Semicolon = 0x29,
    Backslash = 0x2A,
    Comma = 0x2B,
    Slash = 0x2C,
    N = 0x2D,
    M = 0x2E,
    Period = 0x2F,
    Tab = 0x30,
    Space = 0x31,
    Grave = 0x32,
    Delete = 0x33,
    Escape = 0x35,
    RightCommand = 0x36,
    Command = 0x37,
    Shift = 0x38,
    CapsLock = 0x39,
    Option = 0x3A,
    Control = 0x3B,
    RightShift = 0x3C,
    RightOption = 0x3D,
    RightControl = 0x3E,
    Function = 0x3F,
    KeypadEnter = 0x4C,
    Home = 0x73,
    PageUp = 0x74,
    ForwardDelete = 0x75,
    End = 0x77,
    PageDown = 0x79,
    LeftArrow = 0x7B,
    RightArrow = 0x7C,
    DownArrow = 0x7D,
    UpArrow = 0x7E,
}

/// Every variant, in scancode order.
const ALL: &[Key] = &[
    Key::A,
    Key::S,
    Key::D,
    Key::F,
    Key::H,
    Key::G,
    Key::Z,
    Key::X,
    Key::C,
    Key::V,
    Key::B,
    Key::Q,
    Key::W,
    Key::E,
    Key::R,
    Key::Y,
    Key::T,
    Key::Digit1,
    Key::Digit2,
    Key::Digit3,
    Key::Digit4,
    Key::Digit6,
    Key::Digit5,
    Key::Equal,
    Key::Digit9,
    Key::Digit7,
    Key::Minus,
    Key::Digit8,
    Key::Digit0,
    Key::RightBracket,
    Key::O,
    Key::U,
    Key::LeftBracket,
    Key::I,
    Key::P,
    Key::Return,
    Key::L,
    Key::J,
    Key::Quote,
    Key::K,
    Key::Semicolon,
    Key::Backslash,
    Key::Comma,
    Key::Slash,
    Key::N,
    Key::M,
    Key::Period,
    Key::Tab,
    Key::Space,
    Key::Grave,
    Key::Delete,
    Key::Escape,
    Key::RightCommand,
    Key::Command,
    Key::Shift,
    Key::CapsLock,
    Key::Option,
    Key::Control,
    Key::RightShift,
    Key::RightOption,
    Key::RightControl,
    Key::Function,
    Key::KeypadEnter,
    Key::Home,
    Key::PageUp,
    Key::ForwardDelete,
    Key::End,
    Key::PageDown,
    Key::LeftArrow,
    Key::RightArrow,
    Key::DownArrow,
    Key::UpArrow,
];

impl Key {
    /// Looks up a `Key` from a macOS scancode (hardware virtual keycode).
    pub fn from_scancode(sc: Scancode) -> Option<Self> {
        ALL.binary_search_by_key(&sc, |k| *k as u16)
            .ok()
            .map(|i| ALL[i])
    }

    /// The hardware scancode for this key.
    pub fn scancode(self) -> Scancode {
        self as u16
    }

    /// True for the 26 Latin letter keys.
    pub fn is_letter(self) -> bool {
        self.to_char(false).is_some_and(|c| c.is_ascii_lowercase())
    }

    /// True for the ten digit keys on the main block.
    pub fn is_digit(self) -> bool {
        self.to_char(false).is_some_and(|c| c.is_ascii_digit())
    }

    /// Arrow keys.
    pub fn is_arrow(self) -> bool {
        matches!(
            self,
            Self::LeftArrow | Self::RightArrow | Self::UpArrow | Self::DownArrow
        )
    }

    /// Keys that move the caret without editing: arrows, Home/End, PageUp/PageDown.
    pub fn is_navigation(self) -> bool {
        self.is_arrow() || matches!(self, Self::Home | Self::End | Self::PageUp | Self::PageDown)
    }

    /// Return or keypad Enter.
    pub fn is_enter(self) -> bool {
        matches!(self, Self::Return | Self::KeypadEnter)
    }

    /// True for keys that only produce a modifier-flags-changed event.
    pub fn is_modifier(self) -> bool {
        crate::Modifier::from_key(self).is_some()
    }
}

impl TryFrom<Scancode> for Key {
    type Error = ();
    fn try_from(value: Scancode) -> Result<Self, Self::Error> {
        Self::from_scancode(value).ok_or(())
    }
}

impl From<Key> for Scancode {
    fn from(k: Key) -> Self {
        k as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_for_lookup() {
        assert!(ALL.windows(2).all(|w| (w[0] as u16) < (w[1] as u16)));
    }

    #[test]
    fn scancode_roundtrip() {
        for k in ALL {
            assert_eq!(Key::from_scancode(k.scancode()), Some(*k));
        }
        assert_eq!(Key::from_scancode(0x0A), None);
        assert_eq!(Key::from_scancode(0xFFFF), None);
    }

    #[test]
    fn classification() {
        assert!(Key::Q.is_letter());
        assert!(!Key::Digit1.is_letter());
        assert!(Key::Digit0.is_digit());
        assert!(Key::Home.is_navigation());
        assert!(!Key::Tab.is_navigation());
        assert!(Key::KeypadEnter.is_enter());
        assert!(Key::RightOption.is_modifier());
        assert!(!Key::Space.is_modifier());
    }
}
