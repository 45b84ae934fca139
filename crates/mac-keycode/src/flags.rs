//! CoreGraphics event flags (`CGEventFlags`).

use bitflags::bitflags;

bitflags! {
    /// Modifier and state bits carried by every CoreGraphics keyboard event.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
    pub struct CgFlags: u64 {
        /// Event was not coalesced.
        const NON_COALESCED = 1 << 8;
        /// Caps Lock is engaged.
        const ALPHA_SHIFT = 1 << 16;
        /// Either Shift key.
        const SHIFT = 1 << 17;
        /// Either Control key.
        const CONTROL = 1 << 18;
        /// Either Option key.
        const ALTERNATE = 1 << 19;
        /// Either Command key.
        const COMMAND = 1 << 20;
        /// Key is on the numeric keypad (also set for arrows).
        const NUMERIC_PAD = 1 << 21;
        /// Help key.
        const HELP = 1 << 22;
        /// Fn key.
        const SECONDARY_FN = 1 << 23;
    }
}

impl CgFlags {
    /// Modifiers that turn a keystroke into a shortcut rather than text.
    pub const SHORTCUT: Self = Self::COMMAND
        .union(Self::CONTROL)
        .union(Self::ALTERNATE)
        .union(Self::SECONDARY_FN)
        .union(Self::NUMERIC_PAD)
        .union(Self::HELP);

    /// The five bits a hotkey can be bound to.
    pub const HOTKEY: Self = Self::CONTROL
        .union(Self::ALTERNATE)
        .union(Self::COMMAND)
        .union(Self::SHIFT)
        .union(Self::SECONDARY_FN);

    /// Shift or Caps Lock.
    pub const CASE: Self = Self::SHIFT.union(Self::ALPHA_SHIFT);

    /// Build from raw event bits, keeping unknown bits so they can be
    /// written back unchanged.
    pub fn from_raw(bits: u64) -> Self {
        Self::from_bits_retain(bits)
    }

    /// True when Shift or Caps Lock is active.
    pub fn has_case(self) -> bool {
        self.intersects(Self::CASE)
    }

    /// True when a modifier that blocks text entry is held.
    pub fn has_shortcut_modifier(self) -> bool {
        self.intersects(Self::SHORTCUT)
    }

    /// Only the bits a hotkey can be bound to.
    pub fn hotkey_bits(self) -> Self {
        self & Self::HOTKEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions() {
        assert_eq!(CgFlags::SHIFT.bits(), 0x2_0000);
        assert_eq!(CgFlags::COMMAND.bits(), 0x10_0000);
        assert_eq!(CgFlags::SECONDARY_FN.bits(), 0x80_0000);
    }

    #[test]
    fn unknown_bits_survive() {
        let f = CgFlags::from_raw(0x100 | 0x4 | (1 << 17));
        assert!(f.contains(CgFlags::SHIFT));
        assert_eq!(f.bits() & 0x4, 0x4);
    }

    #[test]
    fn shortcut_excludes_case() {
        assert!(!CgFlags::SHIFT.has_shortcut_modifier());
        assert!(!CgFlags::ALPHA_SHIFT.has_shortcut_modifier());
        assert!(CgFlags::NUMERIC_PAD.has_shortcut_modifier());
        assert!((CgFlags::SHIFT | CgFlags::ALPHA_SHIFT).has_case());
    }
}
