//! Values exchanged with the typing engine.
//!
//! The engine itself lives outside this crate; these types describe what it
//! is fed for each keystroke and the verdict it leaves behind.

use serde::{Deserialize, Serialize};

/// Largest number of characters the engine keeps in one word buffer.
pub const MAX_BUFF: usize = 32;

/// Set on a raw key-code word when the key was typed with Shift or Caps Lock.
pub const CAPS_MASK: u32 = 0x0001_0000;
/// Set on a word that carries a code-table character rather than a key code.
pub const CHAR_CODE_MASK: u32 = 0x0200_0000;
/// Set on a word whose low 16 bits are a literal UTF-16 unit.
pub const PURE_CHARACTER_MASK: u32 = 0x8000_0000;

/// What the engine wants done for the last keystroke.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum SignalCode {
    /// Let the key through.
    #[default]
    DoNothing,
    /// Delete and insert.
    WillProcess,
    /// The key ended a word.
    BreakWord,
    /// Undo the word back to the raw keys typed.
    Restore,
    /// Replace the word with a macro expansion.
    ReplaceMacro,
    /// Restore, then begin a fresh word.
    RestoreAndStartNewSession,
}

impl SignalCode {
    /// Decode the engine's numeric code. Unknown values mean "do nothing".
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::WillProcess,
            2 => Self::BreakWord,
            3 => Self::Restore,
            4 => Self::ReplaceMacro,
            5 => Self::RestoreAndStartNewSession,
            _ => Self::DoNothing,
        }
    }

    /// True for both restore variants.
    pub fn is_restore(self) -> bool {
        matches!(self, Self::Restore | Self::RestoreAndStartNewSession)
    }
}

/// Secondary detail attached to a signal.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum ExtCode {
    /// No detail.
    #[default]
    None,
    /// The key was a word break.
    WordBreak,
    /// The key was Delete.
    Delete,
    /// An ordinary key inside a word.
    Normal,
    /// Never precede the edit with an empty-character probe.
    NoEmptyChar,
    /// The word was reverted because it looked English.
    AutoEnglish,
}

impl ExtCode {
    /// Decode the engine's numeric ext code.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::WordBreak,
            2 => Self::Delete,
            3 => Self::Normal,
            4 => Self::NoEmptyChar,
            5 => Self::AutoEnglish,
            _ => Self::None,
        }
    }
}

/// The engine's per-keystroke verdict.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EngineSignal {
    /// Primary verdict.
    pub code: SignalCode,
    /// Secondary detail.
    pub ext: ExtCode,
    /// Characters to delete before inserting.
    pub backspace_count: u8,
    /// Characters to insert, in typing order. At most [`MAX_BUFF`].
    pub chars: Vec<u32>,
    /// Macro expansion words, valid for [`SignalCode::ReplaceMacro`].
    pub macro_data: Vec<u32>,
}

impl EngineSignal {
    /// Number of characters to insert.
    pub fn new_char_count(&self) -> usize {
        self.chars.len()
    }
}

/// Input language.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Keys pass through.
    English,
    /// Keys go through the engine.
    #[default]
    Vietnamese,
}

impl Language {
    /// Numeric form used by persisted state.
    pub fn raw(self) -> u8 {
        match self {
            Self::English => 0,
            Self::Vietnamese => 1,
        }
    }

    /// Decode the numeric form; anything non-zero is Vietnamese.
    pub fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Self::English
        } else {
            Self::Vietnamese
        }
    }

    /// The other language.
    pub fn toggled(self) -> Self {
        match self {
            Self::English => Self::Vietnamese,
            Self::Vietnamese => Self::English,
        }
    }
}

/// Output encoding for Vietnamese characters.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeTable {
    /// Precomposed Unicode.
    #[default]
    Unicode,
    /// TCVN3 (ABC), one byte per character.
    Tcvn3,
    /// VNI Windows, one or two bytes per character.
    VniWindows,
    /// Base letter plus combining marks.
    UnicodeCompound,
    /// Vietnamese locale CP 1258.
    Cp1258,
}

impl CodeTable {
    /// Numeric form used by the engine and persisted state.
    pub fn raw(self) -> u8 {
        match self {
            Self::Unicode => 0,
            Self::Tcvn3 => 1,
            Self::VniWindows => 2,
            Self::UnicodeCompound => 3,
            Self::Cp1258 => 4,
        }
    }

    /// Decode the numeric form. Unknown values fall back to Unicode.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Tcvn3,
            2 => Self::VniWindows,
            3 => Self::UnicodeCompound,
            4 => Self::Cp1258,
            _ => Self::Unicode,
        }
    }

    /// Tables where one engine character can become two inserted units.
    pub fn is_double_code(self) -> bool {
        matches!(self, Self::VniWindows | Self::UnicodeCompound)
    }
}

/// How the key's case reaches the engine.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum CapsStatus {
    /// Neither Shift nor Caps Lock.
    #[default]
    None,
    /// Shift held.
    Shift,
    /// Caps Lock on, Shift not held.
    CapsLock,
}

/// Kind of event handed to the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InputKind {
    /// A keyboard key-down.
    Keyboard,
    /// A mouse button press.
    Mouse,
}

/// One keystroke as the engine sees it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EngineInput {
    /// Keyboard or mouse.
    pub kind: InputKind,
    /// Virtual key code.
    pub key: u16,
    /// Case state.
    pub caps: CapsStatus,
    /// Command, Control, Option, Fn, keypad or Help held.
    pub other_modifier: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_signal_is_do_nothing() {
        assert_eq!(SignalCode::from_raw(9), SignalCode::DoNothing);
        assert!(SignalCode::from_raw(5).is_restore());
        assert!(!SignalCode::from_raw(1).is_restore());
    }

    #[test]
    fn code_tables_round_trip_through_raw() {
        for raw in 0..5 {
            assert_eq!(CodeTable::from_raw(raw).raw(), raw);
        }
        assert!(CodeTable::VniWindows.is_double_code());
        assert!(!CodeTable::Tcvn3.is_double_code());
    }
}
