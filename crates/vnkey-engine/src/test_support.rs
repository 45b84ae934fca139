//! Scriptable collaborators for unit and integration tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    Accessibility, CodeTable, EngineInput, EngineSignal, Language, Persistence, Result,
    TypingEngine,
};

/// Something the pipeline asked of a [`FakeEngine`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineCall {
    /// Vietnamese key.
    Key(EngineInput),
    /// English-mode key.
    EnglishKey(EngineInput),
    /// Fresh word.
    StartNewSession,
    /// Fresh word after a focus change or click.
    RequestNewSession,
    /// Sentence-start capitalisation.
    PrimeUppercase,
    /// Restore to raw keys.
    Restore,
    /// Spell check toggled.
    ToggleSpellCheck,
    /// Engine bypass toggled.
    ToggleBypass,
}

/// Shared state behind a [`FakeEngine`].
#[derive(Debug, Default)]
struct EngineState {
    /// Current language.
    language: Language,
    /// Current table.
    table: CodeTable,
    /// Last signal.
    signal: EngineSignal,
    /// Signals handed out by successive key events.
    queued: VecDeque<EngineSignal>,
    /// Signal for the next restore; `None` means nothing to restore.
    restore: Option<EngineSignal>,
    /// Every call, in order.
    calls: Vec<EngineCall>,
}

/// A typing engine that replays scripted signals. Clones share state, so a
/// test keeps one clone after boxing the other into the pipeline.
#[derive(Clone, Debug, Default)]
pub struct FakeEngine {
    /// Shared state.
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    /// Engine starting in `language`.
    pub fn new(language: Language) -> Self {
        let e = Self::default();
        e.state.lock().language = language;
        e
    }

    /// Hand out `signal` for the next key event.
    pub fn queue(&self, signal: EngineSignal) {
        self.state.lock().queued.push_back(signal);
    }

    /// Make the next restore succeed with `signal`.
    pub fn set_restore(&self, signal: EngineSignal) {
        self.state.lock().restore = Some(signal);
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Current language.
    pub fn current_language(&self) -> Language {
        self.state.lock().language
    }

    /// Current table.
    pub fn current_table(&self) -> CodeTable {
        self.state.lock().table
    }

    /// Record `call` and move to the next queued signal.
    fn step(&self, call: EngineCall) {
        let mut st = self.state.lock();
        st.calls.push(call);
        st.signal = st.queued.pop_front().unwrap_or_default();
    }

    /// Record `call`.
    fn record(&self, call: EngineCall) {
        self.state.lock().calls.push(call);
    }
}

impl TypingEngine for FakeEngine {
    fn handle_event(&mut self, input: EngineInput) {
        self.step(EngineCall::Key(input));
    }

    fn handle_english_event(&mut self, input: EngineInput) {
        self.step(EngineCall::EnglishKey(input));
    }

    fn signal(&self) -> EngineSignal {
        self.state.lock().signal.clone()
    }

    fn language(&self) -> Language {
        self.state.lock().language
    }

    fn set_language(&mut self, language: Language) {
        self.state.lock().language = language;
    }

    fn code_table(&self) -> CodeTable {
        self.state.lock().table
    }

    fn set_code_table(&mut self, table: CodeTable) {
        self.state.lock().table = table;
    }

    fn start_new_session(&mut self) {
        self.record(EngineCall::StartNewSession);
    }

    fn request_new_session(&mut self, _allow_prime: bool) {
        self.record(EngineCall::RequestNewSession);
    }

    fn prime_uppercase(&mut self) {
        self.record(EngineCall::PrimeUppercase);
    }

    fn restore_to_raw_keys(&mut self) -> bool {
        let mut st = self.state.lock();
        st.calls.push(EngineCall::Restore);
        match st.restore.take() {
            Some(signal) => {
                st.signal = signal;
                true
            }
            None => false,
        }
    }

    fn precompose(&self, units: &[u16]) -> Vec<u16> {
        units.to_vec()
    }

    fn toggle_spell_check_suspension(&mut self) {
        self.record(EngineCall::ToggleSpellCheck);
    }

    fn toggle_engine_bypass(&mut self) {
        self.record(EngineCall::ToggleBypass);
    }
}

/// Answers given by a [`FakeAccessibility`].
#[derive(Debug, Default)]
struct AxState {
    /// Bundle id for every pid.
    target: Option<String>,
    /// Focused bundle while a launcher is up.
    spotlight: Option<String>,
    /// Editor terminal panel focused.
    terminal_panel: bool,
    /// Browser address bar focused.
    address_bar: bool,
    /// Caret at a sentence start.
    sentence_start: bool,
    /// Replacements succeed.
    replace_ok: bool,
    /// Replacements requested.
    replacements: Vec<(usize, Vec<u16>)>,
    /// Invalidation count.
    invalidations: usize,
}

/// Accessibility with canned answers.
#[derive(Debug, Default)]
pub struct FakeAccessibility {
    /// Canned answers.
    state: Mutex<AxState>,
}

impl FakeAccessibility {
    /// Every pid belongs to `bundle`.
    pub fn with_target(bundle: &str) -> Self {
        let ax = Self::default();
        ax.set_target(bundle);
        ax
    }

    /// Change the bundle every pid belongs to.
    pub fn set_target(&self, bundle: &str) {
        self.state.lock().target = Some(bundle.to_string());
    }

    /// Put a launcher up with `bundle` focused.
    pub fn set_spotlight(&self, bundle: &str) {
        self.state.lock().spotlight = Some(bundle.to_string());
    }

    /// Focus an editor's terminal panel.
    pub fn set_terminal_panel(&self, focused: bool) {
        self.state.lock().terminal_panel = focused;
    }

    /// Focus a browser address bar.
    pub fn set_address_bar(&self, focused: bool) {
        self.state.lock().address_bar = focused;
    }

    /// Put the caret at a sentence start.
    pub fn set_sentence_start(&self, at_start: bool) {
        self.state.lock().sentence_start = at_start;
    }

    /// Let replacements succeed.
    pub fn set_replace_ok(&self, ok: bool) {
        self.state.lock().replace_ok = ok;
    }

    /// Replacements requested so far.
    pub fn replacements(&self) -> Vec<(usize, Vec<u16>)> {
        self.state.lock().replacements.clone()
    }

    /// How often caches were invalidated.
    pub fn invalidations(&self) -> usize {
        self.state.lock().invalidations
    }
}

impl Accessibility for FakeAccessibility {
    fn bundle_id_for_pid(&self, _pid: i32) -> Option<String> {
        self.state.lock().target.clone()
    }

    fn focused_bundle_id(&self) -> Option<String> {
        self.state.lock().spotlight.clone()
    }

    fn frontmost_bundle_id(&self) -> Option<String> {
        self.state.lock().target.clone()
    }

    fn is_spotlight_active(&self) -> bool {
        self.state.lock().spotlight.is_some()
    }

    fn is_terminal_panel_focused(&self) -> bool {
        self.state.lock().terminal_panel
    }

    fn is_address_bar_focused(&self) -> bool {
        self.state.lock().address_bar
    }

    fn is_notion_code_block(&self) -> bool {
        false
    }

    fn is_at_sentence_start(&self) -> bool {
        self.state.lock().sentence_start
    }

    fn replace_focused_text(&self, backspaces: usize, units: &[u16], _verify: bool) -> bool {
        let mut st = self.state.lock();
        st.replacements.push((backspaces, units.to_vec()));
        st.replace_ok
    }

    fn invalidate(&self) {
        self.state.lock().invalidations += 1;
    }
}

/// Persistence in a map.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    /// Stored blobs.
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl Persistence for MemoryPersistence {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
