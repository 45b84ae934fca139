//! A typing engine that never edits text.
//!
//! `monitor` runs the full pipeline against it so every gate, hotkey and
//! context decision can be watched in the logs without touching what the
//! user types.

use tracing::trace;
use vnkey_engine::{CodeTable, EngineInput, EngineSignal, Language, TypingEngine};

/// Tracks language and code table; every signal says "do nothing".
#[derive(Debug, Default)]
pub struct PassThroughEngine {
    /// Current language.
    language: Language,
    /// Current code table.
    table: CodeTable,
    /// Spell-check suspension toggle.
    spell_check_suspended: bool,
    /// Temporary bypass toggle.
    bypassed: bool,
}

impl TypingEngine for PassThroughEngine {
    fn handle_event(&mut self, input: EngineInput) {
        trace!(
            key = input.key,
            caps = ?input.caps,
            shortcut = input.other_modifier,
            "pass_through_key"
        );
    }

    fn handle_english_event(&mut self, input: EngineInput) {
        trace!(key = input.key, "pass_through_english_key");
    }

    fn signal(&self) -> EngineSignal {
        EngineSignal::default()
    }

    fn language(&self) -> Language {
        self.language
    }

    fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    fn code_table(&self) -> CodeTable {
        self.table
    }

    fn set_code_table(&mut self, table: CodeTable) {
        self.table = table;
    }

    fn start_new_session(&mut self) {
        trace!("pass_through_new_session");
    }

    fn request_new_session(&mut self, allow_prime: bool) {
        trace!(allow_prime, "pass_through_new_session_requested");
    }

    fn prime_uppercase(&mut self) {}

    fn restore_to_raw_keys(&mut self) -> bool {
        false
    }

    fn precompose(&self, units: &[u16]) -> Vec<u16> {
        units.to_vec()
    }

    fn toggle_spell_check_suspension(&mut self) {
        self.spell_check_suspended = !self.spell_check_suspended;
        trace!(suspended = self.spell_check_suspended, "spell_check_toggled");
    }

    fn toggle_engine_bypass(&mut self) {
        self.bypassed = !self.bypassed;
        trace!(bypassed = self.bypassed, "engine_bypass_toggled");
    }
}

#[cfg(test)]
mod tests {
    use vnkey_engine::{CapsStatus, InputKind, SignalCode};

    use super::*;

    #[test]
    fn never_asks_for_an_edit() {
        let mut e = PassThroughEngine::default();
        e.handle_event(EngineInput {
            kind: InputKind::Keyboard,
            key: 0,
            caps: CapsStatus::None,
            other_modifier: false,
        });
        assert_eq!(e.signal().code, SignalCode::DoNothing);
        assert!(!e.restore_to_raw_keys());
        e.set_language(Language::English);
        assert_eq!(e.language(), Language::English);
    }
}
