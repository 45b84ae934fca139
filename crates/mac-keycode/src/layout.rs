//! US ANSI layout: the character each key produces.

use crate::Key;

impl Key {
    /// Character produced by this key on a US ANSI layout, with or without
    /// Shift. Non-printing keys (including Space) return `None`.
    pub fn to_char(self, shifted: bool) -> Option<char> {
        let (lower, upper) = match self {
            Self::A => ('a', 'A'),
            Self::B => ('b', 'B'),
            Self::C => ('c', 'C'),
            Self::D => ('d', 'D'),
            Self::E => ('e', 'E'),
            Self::F => ('f', 'F'),
            Self::G => ('g', 'G'),
            Self::H => ('h', 'H'),
            Self::I => ('i', 'I'),
            Self::J => ('j', 'J'),
            Self::K => ('k', 'K'),
            Self::L => ('l', 'L'),
            Self::M => ('m', 'M'),
            Self::N => ('n', 'N'),
            Self::O => ('o', 'O'),
            Self::P => ('p', 'P'),
            Self::Q => ('q', 'Q'),
            Self::R => ('r', 'R'),
            Self::S => ('s', 'S'),
            Self::T => ('t', 'T'),
            Self::U => ('u', 'U'),
            Self::V => ('v', 'V'),
            Self::W => ('w', 'W'),
            Self::X => ('x', 'X'),
            Self::Y => ('y', 'Y'),
            Self::Z => ('z', 'Z'),
            Self::Digit1 => ('1', '!'),
            Self::Digit2 => ('2', '@'),
            Self::Digit3 => ('3', '#'),
            Self::Digit4 => ('4', '$'),
            Self::Digit5 => ('5', '%'),
            Self::Digit6 => ('6', '^'),
            Self::Digit7 => ('7', '&'),
            Self::Digit8 => ('8', '*'),
            Self::Digit9 => ('9', '('),
            Self::Digit0 => ('0', ')'),
            Self::Minus => ('-', '_'),
            Self::Equal => ('=', '+'),
            Self::LeftBracket => ('[', '{'),
            Self::RightBracket => (']', '}'),
            Self::Backslash => ('\\', '|'),
            Self::Semicolon => (';', ':'),
            Self::Quote => ('\'', '"'),
            Self::Comma => (',', '<'),
            Self::Period => ('.', '>'),
            Self::Slash => ('/', '?'),
            Self::Grave => ('`', '~'),
            _ => return None,
        };
        Some(if shifted { upper } else { lower })
    }
}
