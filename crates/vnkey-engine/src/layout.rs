//! Keyboard-layout compatibility.
//!
//! The engine thinks in US key positions. With a non-US layout active the
//! character a key produces is mapped back to the US key that produces the
//! same character, so typing rules follow what the user sees.

use std::collections::HashMap;

use parking_lot::Mutex;

/// US key code producing `c` (either case or shift level).
fn us_key_code(c: char) -> Option<u16> {
    let code = match c {
        '`' | '~' | '²' | '¬' | 'º' | 'ª' | '§' | '½' => 50,
        '1' | '!' => 18,
        '2' | '@' | 'é' | 'ě' => 19,
        '3' | '#' | 'š' | '£' => 20,
        '4' | '$' | 'č' | '¤' => 21,
        '5' | '%' | 'ř' | '∞' => 23,
        '6' | '^' | 'ž' => 22,
        '7' | '&' | 'è' | 'ý' => 26,
        '8' | '*' | 'á' | '°' => 28,
        '9' | '(' | 'í' => 25,
        '0' | ')' | 'à' => 29,
        '-' | '_' | 'ß' | '¿' | 'ő' | '–' | '—' => 27,
        '=' | '+' | '¡' | 'ì' | '´' | '±' | '≠' => 24,
        'q' => 12,
        'w' => 13,
        'e' | 'ę' | '€' => 14,
        'r' | '®' => 15,
        't' | '™' => 17,
        'y' | '¥' => 16,
        'u' => 32,
        'i' | 'ı' => 34,
        'o' | 'ó' => 31,
        'p' => 35,
        '[' | '{' | 'ü' | 'å' | 'ů' | 'ğ' | '¨' => 33,
        ']' | '}' | '«' | 'ď' => 30,
        '\\' | '|' | '»' | 'µ' | 'ň' | 'ű' => 42,
        'a' | 'ą' => 0,
        's' | 'ś' => 1,
        'd' => 2,
        'f' => 3,
        'g' => 5,
        'h' => 4,
        'j' => 38,
        'k' => 40,
        'l' | 'ł' => 37,
        ';' | ':' | 'ö' | 'ñ' | 'ò' | 'ç' | 'ø' | 'ú' | 'ş' | '…' => 41,
        '\'' | '"' | 'ä' | 'ù' | 'æ' | 'ť' | '‘' | '’' | '“' | '”' => 39,
        'z' | 'ż' => 6,
        'x' | 'ź' | '×' => 7,
        'c' | 'ć' | '¢' | '©' => 8,
        'v' => 9,
        'b' => 11,
        'n' | 'ń' => 45,
        'm' => 46,
        ',' | '<' | '≤' => 43,
        '.' | '>' | '≥' => 47,
        '/' | '?' | '÷' => 44,
        _ => return None,
    };
    Some(code)
}

/// AZERTY number-row characters typed without Shift.
fn azerty_digit(c: char) -> Option<u16> {
    let code = match c {
        '&' => 18,
        'é' => 19,
        '"' => 20,
        '\'' => 21,
        '(' => 23,
        '-' => 22,
        'è' => 26,
        '_' => 28,
        'ç' => 25,
        'à' => 29,
        _ => return None,
    };
    Some(code)
}

/// US key code for a key that typed `base` (its character ignoring
/// modifiers) and `actual`. Falls back to `raw`.
pub fn compat_key_code(raw: u16, base: Option<char>, actual: Option<char>) -> u16 {
    let lookup = |c: char| us_key_code(c).or_else(|| c.to_lowercase().next().and_then(us_key_code));
    if let Some(code) = base.and_then(lookup) {
        return code;
    }
    if let Some(code) = actual.filter(|a| Some(*a) != base).and_then(lookup) {
        return code;
    }
    base.and_then(azerty_digit).unwrap_or(raw)
}

/// Per-key memo of [`compat_key_code`], cleared when the input source
/// changes.
#[derive(Debug, Default)]
pub struct LayoutCache {
    /// Raw key code to converted key code.
    map: Mutex<HashMap<u16, u16>>,
}

impl LayoutCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Converted key code for `raw`, computed once per layout.
    pub fn convert(&self, raw: u16, base: Option<char>, actual: Option<char>) -> u16 {
        if let Some(code) = self.map.lock().get(&raw) {
            return *code;
        }
        let code = compat_key_code(raw, base, actual);
        self.map.lock().insert(raw, code);
        code
    }

    /// Forget every conversion.
    pub fn invalidate(&self) {
        self.map.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_international_characters_to_us_positions() {
        // German Z sits where US Y is.
        assert_eq!(compat_key_code(16, Some('z'), None), 6);
        assert_eq!(compat_key_code(12, Some('A'), None), 0);
        assert_eq!(compat_key_code(27, Some('ß'), None), 27);
    }

    #[test]
    fn falls_back_to_actual_then_raw() {
        assert_eq!(compat_key_code(99, Some('\u{F700}'), Some('q')), 12);
        assert_eq!(compat_key_code(99, None, None), 99);
    }

    #[test]
    fn cache_remembers_until_invalidated() {
        let c = LayoutCache::new();
        assert_eq!(c.convert(16, Some('z'), None), 6);
        assert_eq!(c.convert(16, Some('y'), None), 6);
        c.invalidate();
        assert_eq!(c.convert(16, Some('y'), None), 16);
    }
}
