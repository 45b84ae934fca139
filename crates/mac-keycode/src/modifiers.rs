use serde::{Deserialize, Serialize};

use crate::{CgFlags, Key};

/// Modifier keys available on macOS keyboards.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Modifier {
    Command,
    Shift,
    Option,
    Control,
    CapsLock,
    Function,
    RightCommand,
    RightShift,
    RightOption,
    RightControl,
}

impl From<Modifier> for Key {
    fn from(m: Modifier) -> Self {
        match m {
            Modifier::Command => Self::Command,
            Modifier::Shift => Self::Shift,
            Modifier::Option => Self::Option,
            Modifier::Control => Self::Control,
            Modifier::CapsLock => Self::CapsLock,
            Modifier::Function => Self::Function,
            Modifier::RightCommand => Self::RightCommand,
            Modifier::RightShift => Self::RightShift,
            Modifier::RightOption => Self::RightOption,
            Modifier::RightControl => Self::RightControl,
        }
    }
}

impl Modifier {
    /// The modifier a key represents, if any.
    pub fn from_key(k: Key) -> Option<Self> {
        Some(match k {
            Key::Command => Self::Command,
            Key::Shift => Self::Shift,
            Key::Option => Self::Option,
            Key::Control => Self::Control,
            Key::CapsLock => Self::CapsLock,
            Key::Function => Self::Function,
            Key::RightCommand => Self::RightCommand,
            Key::RightShift => Self::RightShift,
            Key::RightOption => Self::RightOption,
            Key::RightControl => Self::RightControl,
            _ => return None,
        })
    }

    /// The flag bit this modifier sets while held. Left and right variants
    /// share a bit.
    pub fn flag(self) -> CgFlags {
        match self {
            Self::Command | Self::RightCommand => CgFlags::COMMAND,
            Self::Shift | Self::RightShift => CgFlags::SHIFT,
            Self::Option | Self::RightOption => CgFlags::ALTERNATE,
            Self::Control | Self::RightControl => CgFlags::CONTROL,
            Self::CapsLock => CgFlags::ALPHA_SHIFT,
            Self::Function => CgFlags::SECONDARY_FN,
        }
    }

    /// Canonical lowercase name.
    pub fn to_spec(self) -> &'static str {
        match self {
            Self::Command => "cmd",
            Self::Shift => "shift",
            Self::Option => "opt",
            Self::Control => "ctrl",
            Self::CapsLock => "capslock",
            Self::Function => "fn",
            Self::RightCommand => "rcmd",
            Self::RightShift => "rshift",
            Self::RightOption => "ropt",
            Self::RightControl => "rctrl",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_modifiers() {
        let mods = [
            Modifier::Command,
            Modifier::Shift,
            Modifier::Option,
            Modifier::Control,
            Modifier::CapsLock,
            Modifier::Function,
            Modifier::RightCommand,
            Modifier::RightShift,
            Modifier::RightOption,
            Modifier::RightControl,
        ];
        for m in mods {
            let k: Key = m.into();
            assert_eq!(Modifier::from_key(k), Some(m));
        }
        assert_eq!(Modifier::from_key(Key::A), None);
    }

    #[test]
    fn sides_share_flags() {
        assert_eq!(Modifier::RightOption.flag(), Modifier::Option.flag());
        assert_eq!(Modifier::RightControl.flag(), CgFlags::CONTROL);
    }
}
