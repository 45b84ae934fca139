//! The per-event flow.
//!
//! [`Pipeline`] is the tap's [`EventHandler`]. Each event runs through the
//! fast-exit gates first (permission lost, tap disabled by the OS,
//! self-injected), then the modifier state machine, the runtime context,
//! the typing engine and finally the planner, whose plans are posted
//! through [`Output`].
//!
//! Typing state is checked out of its lock at the start of an event and
//! stored back at the end. The engine is locked only around each call into
//! it, so no lock is held while accessibility, the key poster or CLI pacing
//! runs.

use std::{
    mem, process,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use keysynth::KeySynth;
use mac_eventtap::{EventHandler, EventKind, TapControl, TapEvent, TapObserver, Verdict};
use mac_keycode::{CgFlags, Key};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{
    Accessibility, CAPS_MASK, CapsStatus, CodeTable, EngineInput, EngineSignal, InputKind,
    Language, MAX_BUFF, Settings, SettingsHandle, SignalCode, TypingEngine,
    cli::{CliProfileKind, CliRuntime},
    context::{ContextCache, RuntimeContext},
    layout::LayoutCache,
    modifier::{
        self, FlagsChange, KeyDownAction, ModifierState, ReleaseAction, classify_flags_change,
    },
    notification::{Notice, Notifier},
    output::{self, Output},
    planner::{self, BackspaceAdjustment, BackspacePlan, ProcessPlan, SignalAction},
    smart_switch::SmartSwitchStore,
    sync_key::{SyncKeyStack, sync_key_action},
    text_replacement::{self, ExternalDeleteTracker},
    uppercase::{self, EnglishUppercaseState, PrimedKey},
};

/// Typing state owned by the callback thread.
#[derive(Clone, Debug, Default)]
struct TypingState {
    /// Modifier and hotkey tracking.
    modifiers: ModifierState,
    /// English-mode capitalisation.
    english: EnglishUppercaseState,
    /// Rollback ledger for double-code tables.
    sync: SyncKeyStack,
    /// CLI timing.
    cli: CliRuntime,
    /// External Delete presses, for the text-replacement check.
    deletes: ExternalDeleteTracker,
    /// Effective bundle of the previous key-down.
    last_bundle: Option<String>,
}

/// One key-down, resolved.
struct Stroke<'a> {
    /// Key code after layout compatibility.
    key: u16,
    /// Flags after pause stripping.
    flags: CgFlags,
    /// Where the key is going.
    ctx: RuntimeContext,
    /// Settings snapshot for this event.
    settings: &'a Settings,
    /// When the event arrived.
    now: Instant,
}

impl Stroke<'_> {
    /// What the engine is fed for this key.
    fn input(&self) -> EngineInput {
        EngineInput {
            kind: InputKind::Keyboard,
            key: self.key,
            caps: caps_status(self.flags),
            other_modifier: self.flags.intersects(CgFlags::SHORTCUT),
        }
    }

    /// The key as an engine word carrying its case.
    fn key_word(&self) -> u32 {
        let caps = if self.flags.has_case() { CAPS_MASK } else { 0 };
        u32::from(self.key) | caps
    }
}

/// Shift wins over Caps Lock.
fn caps_status(flags: CgFlags) -> CapsStatus {
    if flags.contains(CgFlags::SHIFT) {
        CapsStatus::Shift
    } else if flags.contains(CgFlags::ALPHA_SHIFT) {
        CapsStatus::CapsLock
    } else {
        CapsStatus::None
    }
}

/// Input pipeline: tap callback plus lifecycle observer.
pub struct Pipeline {
    /// Settings published by the UI.
    settings: Arc<SettingsHandle>,
    /// The typing engine.
    engine: Mutex<Box<dyn TypingEngine>>,
    /// Focus inspection.
    ax: Arc<dyn Accessibility>,
    /// Synthesized output.
    synth: KeySynth,
    /// Runtime context cache.
    cache: ContextCache,
    /// Layout compatibility memo.
    layout: LayoutCache,
    /// Per-app language memory.
    smart_switch: Arc<SmartSwitchStore>,
    /// UI notices.
    notifier: Option<Notifier>,
    /// Tap lifecycle, attached once the tap exists.
    control: OnceLock<Arc<dyn TapControl>>,
    /// Typing state between events.
    state: Mutex<TypingState>,
    /// A new typing session must start before the next event.
    reset_pending: AtomicBool,
    /// This process, for the self-filter.
    own_pid: u32,
}

impl Pipeline {
    /// Build a pipeline around an engine and its collaborators.
    pub fn new(
        settings: Arc<SettingsHandle>,
        engine: Box<dyn TypingEngine>,
        ax: Arc<dyn Accessibility>,
        synth: KeySynth,
    ) -> Self {
        Self {
            settings,
            engine: Mutex::new(engine),
            ax,
            synth,
            cache: ContextCache::new(),
            layout: LayoutCache::new(),
            smart_switch: Arc::new(SmartSwitchStore::new()),
            notifier: None,
            control: OnceLock::new(),
            state: Mutex::new(TypingState {
                modifiers: ModifierState::fresh(),
                ..TypingState::default()
            }),
            reset_pending: AtomicBool::new(false),
            own_pid: process::id(),
        }
    }

    /// Send notices to the UI.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Share a smart switch table, usually one loaded from disk.
    pub fn with_smart_switch(mut self, store: Arc<SmartSwitchStore>) -> Self {
        self.smart_switch = store;
        self
    }

    /// Attach the tap lifecycle. Only the first call has an effect.
    pub fn attach_control(&self, control: Arc<dyn TapControl>) {
        if self.control.set(control).is_err() {
            debug!("tap_control_already_attached");
        }
    }

    /// The smart switch table.
    pub fn smart_switch(&self) -> &Arc<SmartSwitchStore> {
        &self.smart_switch
    }

    /// The settings handle.
    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Current input language.
    pub fn language(&self) -> Language {
        self.engine.lock().language()
    }

    /// Set the input language from the UI.
    pub fn set_language(&self, language: Language) {
        let mut engine = self.engine.lock();
        engine.set_language(language);
        engine.start_new_session();
    }

    /// Start a new typing session before the next event.
    pub fn request_session_reset(&self) {
        self.reset_pending.store(true, Ordering::SeqCst);
    }

    /// Fail-open gate.
    fn permission_lost(&self) -> bool {
        self.control.get().is_some_and(|c| c.has_permission_lost())
    }

    /// Queue a UI notice.
    fn notify(&self, notice: Notice) {
        if let Some(n) = &self.notifier {
            n.post(notice);
        }
    }

    /// The output view for one event.
    fn output<'a>(
        &'a self,
        ctx: &'a RuntimeContext,
        table: CodeTable,
        sync: &'a mut SyncKeyStack,
        cli: &'a mut CliRuntime,
    ) -> Output<'a> {
        Output {
            synth: &self.synth,
            ctx,
            table,
            sync,
            cli,
            ax: self.ax.as_ref(),
        }
    }

    /// Run `f` against the engine. The lock is held for this call only.
    fn with_engine<R>(&self, f: impl FnOnce(&mut dyn TypingEngine) -> R) -> R {
        f(self.engine.lock().as_mut())
    }

    /// Clear per-session typing state and drop the engine's word.
    fn reset_session(&self, st: &mut TypingState) {
        st.modifiers = st.modifiers.reset_session();
        st.english = EnglishUppercaseState::IDLE;
        let double_code = self.with_engine(|e| {
            e.request_new_session(true);
            e.code_table().is_double_code()
        });
        if double_code {
            st.sync.clear();
        }
        trace!("session_reset");
    }

    /// Route one admitted event.
    fn dispatch(&self, st: &mut TypingState, ev: &mut TapEvent, settings: &Settings) -> Verdict {
        if self.reset_pending.swap(false, Ordering::SeqCst) {
            st.modifiers = ModifierState::fresh();
            self.reset_session(st);
        }
        if self.language() == Language::Vietnamese {
            st.english = EnglishUppercaseState::IDLE;
        }
        match ev.kind {
            EventKind::KeyDown => self.on_key_down(st, ev, settings),
            EventKind::KeyUp => {
                strip_pause(st, ev, settings);
                Verdict::Pass
            }
            EventKind::FlagsChanged => self.on_flags_changed(st, ev, settings),
            EventKind::LeftMouseDown | EventKind::RightMouseDown => {
                self.reset_session(st);
                Verdict::Pass
            }
            _ => Verdict::Pass,
        }
    }

    // ---- Key-down ----

    /// A key went down.
    fn on_key_down(&self, st: &mut TypingState, ev: &mut TapEvent, settings: &Settings) -> Verdict {
        let now = Instant::now();
        let quiet = st.cli.remaining_block(now);
        if !quiet.is_zero() {
            trace!(?quiet, "cli_block_wait");
            thread::sleep(quiet);
        }
        if ev.key == Key::Delete.scancode() {
            st.deletes.record(now, settings.text_replacement_window());
        }
        if ev.key == Key::Space.scancode() && ev.flags.contains(CgFlags::COMMAND) {
            self.cache.invalidate();
        }
        strip_pause(st, ev, settings);
        let key = if settings.layout_compat {
            self.layout.convert(ev.key, ev.typed, None)
        } else {
            ev.key
        };

        if self.key_down_hotkey(st, key, ev.flags, settings) {
            return Verdict::Swallow;
        }

        let ctx = self
            .cache
            .prepare(ev.target_pid, ev.proxy, settings, self.ax.as_ref(), now);
        self.observe_target(st, &ctx, settings);
        st.cli.apply_profile(ctx.cli_profile.map(CliProfileKind::profile));
        if ctx.is_cli() {
            st.cli.record_key_down(now);
        }
        st.modifiers = modifier::on_key_down_tracking(st.modifiers, ev.flags, settings);

        if ctx.vietnamese_disabled {
            trace!(bundle = ?ctx.target_bundle, "vietnamese_disabled_for_target");
            return Verdict::Pass;
        }
        let stroke = Stroke {
            key,
            flags: ev.flags,
            ctx,
            settings,
            now,
        };
        let language = self.language();
        let at_sentence_start = self.prime_uppercase(st, &stroke, language);
        match language {
            Language::English => self.english_key_down(st, ev, &stroke, at_sentence_start),
            Language::Vietnamese => {
                st.english = EnglishUppercaseState::IDLE;
                self.vietnamese_key_down(st, &stroke)
            }
        }
    }

    /// Keyed hotkeys. Returns true when one fired and the key is consumed.
    fn key_down_hotkey(
        &self,
        st: &mut TypingState,
        key: u16,
        flags: CgFlags,
        settings: &Settings,
    ) -> bool {
        let out = modifier::on_key_down_hotkey(st.modifiers, key, flags, settings);
        st.modifiers = out.state;
        let action = match out.action {
            KeyDownAction::None => return false,
            KeyDownAction::SwitchLanguage => ReleaseAction::SwitchLanguage,
            KeyDownAction::QuickConvert => ReleaseAction::QuickConvert,
            KeyDownAction::EmojiPicker => ReleaseAction::EmojiPicker,
        };
        self.fire_hotkey(st, action, settings);
        st.modifiers = modifier::after_key_down_hotkey(st.modifiers);
        true
    }

    /// Carry out a hotkey.
    fn fire_hotkey(&self, st: &mut TypingState, action: ReleaseAction, settings: &Settings) {
        info!(?action, "hotkey_fired");
        if action == ReleaseAction::SwitchLanguage {
            let (language, table) = self.with_engine(|e| {
                let language = e.language().toggled();
                e.set_language(language);
                e.start_new_session();
                (language, e.code_table())
            });
            st.english = EnglishUppercaseState::IDLE;
            if settings.smart_switch
                && let Some(bundle) = &st.last_bundle
            {
                self.smart_switch.update(bundle, language, table);
            }
            self.notify(Notice::LanguageChanged { language });
        }
        self.notify(Notice::HotkeyFired { action });
    }

    /// On an app switch: start a new session and apply the app's remembered
    /// language and code table.
    fn observe_target(&self, st: &mut TypingState, ctx: &RuntimeContext, settings: &Settings) {
        if ctx.effective_bundle == st.last_bundle {
            return;
        }
        st.last_bundle.clone_from(&ctx.effective_bundle);
        debug!(bundle = ?st.last_bundle, "target_app_changed");
        self.reset_session(st);
        if !settings.smart_switch {
            return;
        }
        let Some(bundle) = st.last_bundle.as_deref() else {
            return;
        };
        let (language, table) = self.with_engine(|e| (e.language(), e.code_table()));
        let Some((want_language, want_table)) =
            self.smart_switch.lookup(bundle, language, table).decoded()
        else {
            return;
        };
        let switch_language = want_language != language;
        let switch_table = settings.remember_code && want_table != table;
        self.with_engine(|e| {
            if switch_language {
                e.set_language(want_language);
            }
            if switch_table {
                e.set_code_table(want_table);
            }
        });
        if switch_language {
            self.notify(Notice::LanguageChanged {
                language: want_language,
            });
        }
        if switch_table {
            self.notify(Notice::CodeTableChanged {
                code_table: want_table,
            });
        }
        debug!(bundle, ?want_language, ?want_table, "smart_switch_applied");
    }

    /// Sentence-start check after a focus change. Returns true when the
    /// caret was found at a sentence start; in Vietnamese mode the engine is
    /// primed to capitalise.
    fn prime_uppercase(&self, st: &mut TypingState, s: &Stroke<'_>, language: Language) -> bool {
        if !s.settings.upper_case_first_char || s.ctx.upper_case_excluded {
            return false;
        }
        let ch = output::key_code_char(s.key_word());
        let step = uppercase::uppercase_prime_transition(
            st.modifiers.pending_uppercase_prime_check,
            s.flags,
            s.key,
            ch,
        );
        st.modifiers.pending_uppercase_prime_check = step.pending;
        if !step.attempt || s.settings.safe_mode || !self.ax.is_at_sentence_start() {
            return false;
        }
        if language == Language::Vietnamese {
            self.with_engine(|e| e.prime_uppercase());
        }
        trace!(?language, "uppercase_primed");
        true
    }

    /// English mode: capitalisation and macros only.
    fn english_key_down(
        &self,
        st: &mut TypingState,
        ev: &mut TapEvent,
        s: &Stroke<'_>,
        at_sentence_start: bool,
    ) -> Verdict {
        let (mut next, mut force) = uppercase::english_uppercase_transition(
            st.english,
            s.key,
            s.flags,
            s.settings.upper_case_first_char,
            s.ctx.upper_case_excluded,
        );
        if at_sentence_start {
            match uppercase::english_primed_key(s.key, s.flags) {
                PrimedKey::Force => force = true,
                PrimedKey::Carry(primed) => next = primed,
                PrimedKey::Ignore => {}
            }
        }
        if force {
            next = EnglishUppercaseState::IDLE;
        }
        st.english = next;

        if s.settings.use_macro && s.settings.use_macro_in_english_mode {
            let input = s.input();
            let (signal, table) = self.with_engine(|e| {
                e.handle_english_event(input);
                (e.signal(), e.code_table())
            });
            if signal.code == SignalCode::ReplaceMacro {
                let plan = planner::macro_plan(
                    &s.ctx,
                    s.settings.fix_recommend_browser,
                    signal.backspace_count,
                    s.settings.send_key_step_by_step,
                );
                let mut out = self.output(&s.ctx, table, &mut st.sync, &mut st.cli);
                return match out.handle_macro(&plan, &signal, s.key, s.flags) {
                    Ok(()) => Verdict::Swallow,
                    Err(e) => {
                        warn!(error = %e, "macro_send_failed_passing_through");
                        Verdict::Pass
                    }
                };
            }
        }

        if force {
            let (flags, units) = uppercase::force_uppercase(s.key, ev.flags);
            ev.flags = flags;
            ev.unicode = units;
            trace!(key = s.key, "uppercase_forced");
        }
        Verdict::Pass
    }

    /// Vietnamese mode: feed the engine and act on its signal.
    fn vietnamese_key_down(&self, st: &mut TypingState, s: &Stroke<'_>) -> Verdict {
        let input = s.input();
        let (signal, table, saved_table) = self.with_engine(|e| {
            let table = e.code_table();
            let temp_unicode = planner::use_temporary_unicode(table, &s.ctx);
            if temp_unicode {
                e.set_code_table(CodeTable::Unicode);
            }
            e.handle_event(input);
            let effective = if temp_unicode { CodeTable::Unicode } else { table };
            (e.signal(), effective, temp_unicode.then_some(table))
        });
        trace!(
            key = s.key,
            code = ?signal.code,
            ext = ?signal.ext,
            backspaces = signal.backspace_count,
            new_chars = signal.new_char_count(),
            "engine_signal"
        );
        let verdict = self.apply_signal(st, s, signal, table).unwrap_or_else(|e| {
            warn!(error = %e, "edit_failed_passing_through");
            Verdict::Pass
        });
        if let Some(saved) = saved_table {
            self.with_engine(|e| {
                if e.code_table() == CodeTable::Unicode {
                    e.set_code_table(saved);
                }
            });
        }
        verdict
    }

    /// Carry out the engine's verdict.
    fn apply_signal(
        &self,
        st: &mut TypingState,
        s: &Stroke<'_>,
        signal: EngineSignal,
        table: CodeTable,
    ) -> keysynth::Result<Verdict> {
        match planner::signal_action(signal.code) {
            SignalAction::DoNothing => {
                let action =
                    sync_key_action(table, signal.ext, st.sync.back(), s.ctx.app.unicode_compound);
                if st.sync.apply(action) {
                    self.output(&s.ctx, table, &mut st.sync, &mut st.cli)
                        .send_physical_backspace()?;
                }
                Ok(Verdict::Pass)
            }
            SignalAction::Pass => Ok(Verdict::Pass),
            SignalAction::Process => self.process_signal(st, s, signal, table),
            SignalAction::ReplaceMacro => {
                let plan = planner::macro_plan(
                    &s.ctx,
                    s.settings.fix_recommend_browser,
                    signal.backspace_count,
                    s.settings.send_key_step_by_step,
                );
                self.output(&s.ctx, table, &mut st.sync, &mut st.cli)
                    .handle_macro(&plan, &signal, s.key, s.flags)?;
                Ok(Verdict::Swallow)
            }
        }
    }

    /// Delete and insert for a process signal.
    fn process_signal(
        &self,
        st: &mut TypingState,
        s: &Stroke<'_>,
        mut signal: EngineSignal,
        table: CodeTable,
    ) -> keysynth::Result<Verdict> {
        let settings = s.settings;
        let plan = ProcessPlan::new(s.key, &signal, &s.ctx, settings.fix_recommend_browser);
        if plan.bypass_for_figma {
            return Ok(Verdict::Pass);
        }
        let safe = settings.safe_mode;
        let address_bar = plan.try_address_bar_fix && !safe && self.ax.is_address_bar_focused();
        let notion = plan.try_legacy_fix && plan.notion && !safe && self.ax.is_notion_code_block();
        let bs_plan = planner::resolve_backspace_plan(
            &plan,
            address_bar,
            s.ctx.app.unicode_compound,
            notion,
            signal.backspace_count,
            settings.backspace_safety_limit,
        );

        let mut out = self.output(&s.ctx, table, &mut st.sync, &mut st.cli);
        apply_adjustment(&mut out, &bs_plan, s.key)?;
        signal.backspace_count = bs_plan.sanitized;

        let decision = text_replacement::evaluate(
            s.key == Key::Space.scancode(),
            &signal,
            &st.deletes,
            s.now,
            settings.text_replacement_window(),
        );
        if decision.bypass() {
            return Ok(Verdict::Pass);
        }

        let send =
            planner::character_send_plan(&s.ctx, settings.send_key_step_by_step, s.key, signal.code);
        let bs = usize::from(signal.backspace_count);
        if bs > 0 && bs < MAX_BUFF {
            if send.defer_backspace_to_ax {
                self.cache.set_pending_backspaces(bs);
            } else {
                out.send_backspace_sequence(bs)?;
            }
        }

        if send.step_by_step {
            let n = signal.chars.len();
            if n > 0 && n <= MAX_BUFF {
                out.send_step_by_step(&signal.chars)?;
            }
            if send.send_restore_trigger {
                out.send_key_code(s.key_word())?;
            }
            if send.start_new_session {
                self.with_engine(|e| e.start_new_session());
            }
        } else {
            let deferred = self.cache.take_pending_backspaces();
            out.send_new_char_string(
                &signal.chars,
                signal.code,
                s.key,
                s.flags,
                deferred,
                &|units: &[u16]| self.engine.lock().precompose(units),
            )?;
            if signal.code == SignalCode::RestoreAndStartNewSession {
                self.with_engine(|e| e.start_new_session());
            }
        }
        Ok(Verdict::Swallow)
    }

    // ---- Modifiers ----

    /// Modifier flags changed.
    fn on_flags_changed(&self, st: &mut TypingState, ev: &TapEvent, settings: &Settings) -> Verdict {
        match classify_flags_change(st.modifiers.last_flags, ev.flags) {
            FlagsChange::Unchanged => Verdict::Pass,
            FlagsChange::Press => {
                let out = modifier::on_modifier_press(st.modifiers, ev.flags, settings, self.language());
                st.modifiers = out.state;
                if let Some(language) = out.language {
                    self.with_engine(|e| e.set_language(language));
                    debug!(?language, "pause_language_switch");
                }
                Verdict::Pass
            }
            FlagsChange::Release => self.on_modifier_release(st, ev, settings),
        }
    }

    /// A modifier went up: restore, hotkeys, temporary-off toggles.
    fn on_modifier_release(&self, st: &mut TypingState, ev: &TapEvent, settings: &Settings) -> Verdict {
        let old = st.modifiers.last_flags;
        let out = modifier::on_modifier_release(st.modifiers, old, ev.flags, settings);
        st.modifiers = out.state;

        if out.attempt_restore {
            let restored = self.with_engine(|e| {
                e.restore_to_raw_keys()
                    .then(|| (e.signal(), e.code_table()))
            });
            if let Some((signal, table)) = restored {
                let ctx = self.cache.prepare(
                    ev.target_pid,
                    ev.proxy,
                    settings,
                    self.ax.as_ref(),
                    Instant::now(),
                );
                if let Err(e) = self.send_restore(st, &ctx, ev, &signal, table) {
                    warn!(error = %e, "restore_send_failed");
                }
                debug!("word_restored_on_modifier_tap");
                return Verdict::Swallow;
            }
        }

        if let Some(language) = out.language {
            self.with_engine(|e| e.set_language(language));
            debug!(?language, "pause_language_restored");
        }

        match out.action {
            ReleaseAction::SwitchLanguage
            | ReleaseAction::QuickConvert
            | ReleaseAction::EmojiPicker => {
                self.fire_hotkey(st, out.action, settings);
                return Verdict::Swallow;
            }
            ReleaseAction::TempOffSpelling => {
                self.with_engine(|e| e.toggle_spell_check_suspension());
            }
            ReleaseAction::TempOffEngine => self.with_engine(|e| e.toggle_engine_bypass()),
            ReleaseAction::None => {}
        }
        Verdict::Pass
    }

    /// Replace the current word with the keys that were typed.
    fn send_restore(
        &self,
        st: &mut TypingState,
        ctx: &RuntimeContext,
        ev: &TapEvent,
        signal: &EngineSignal,
        table: CodeTable,
    ) -> keysynth::Result<()> {
        let mut out = self.output(ctx, table, &mut st.sync, &mut st.cli);
        let bs = usize::from(signal.backspace_count);
        if bs > 0 && bs < MAX_BUFF {
            out.send_backspace_sequence(bs)?;
        }
        out.send_new_char_string(
            &signal.chars,
            SignalCode::WillProcess,
            ev.key,
            ev.flags,
            0,
            &|units: &[u16]| self.engine.lock().precompose(units),
        )
    }
}

/// Send the pre-edit adjustment and report a clamped count.
fn apply_adjustment(out: &mut Output<'_>, plan: &BackspacePlan, key: u16) -> keysynth::Result<()> {
    match plan.adjustment {
        BackspaceAdjustment::None => {}
        BackspaceAdjustment::EmptyCharacter => out.send_empty_character()?,
        BackspaceAdjustment::ShiftLeftThenBackspace => {
            out.send_shift_left()?;
            out.send_physical_backspace()?;
        }
    }
    if plan.clamped {
        warn!(
            requested = plan.adjusted,
            sanitized = plan.sanitized,
            key,
            "backspace_count_clamped"
        );
    }
    Ok(())
}

/// While paused, take the pause modifier off key events.
fn strip_pause(st: &TypingState, ev: &mut TapEvent, settings: &Settings) {
    if let Some(flags) = modifier::strip_pause_modifier(ev.flags, st.modifiers.pause_pressed, settings)
    {
        ev.flags = flags;
    }
}

impl EventHandler for Pipeline {
    fn handle(&self, ev: &mut TapEvent) -> Verdict {
        if self.permission_lost() {
            return Verdict::Pass;
        }
        if let Some(reason) = ev.kind.disable_reason() {
            if let Some(c) = self.control.get() {
                c.handle_disabled_by_os(reason);
            }
            return Verdict::Pass;
        }
        if let Some(c) = self.control.get() {
            c.health_check(ev.kind);
        }
        if ev.is_self_injected(self.own_pid) {
            return Verdict::Pass;
        }

        let settings = self.settings.snapshot();
        let mut st = mem::take(&mut *self.state.lock());
        let verdict = self.dispatch(&mut st, ev, &settings);
        *self.state.lock() = st;
        verdict
    }
}

impl TapObserver for Pipeline {
    fn on_started(&self) {
        self.cache.invalidate();
        self.layout.invalidate();
        self.ax.invalidate();
        self.request_session_reset();
        debug!("pipeline_reset_for_new_tap");
    }

    fn on_permission_lost(&self) {
        self.notify(Notice::PermissionLost);
    }

    fn on_permission_restored(&self) {
        debug!("pipeline_waiting_for_reinitialize");
    }

    fn on_recovered(&self, reenable_count: u64, recreate_count: u64) {
        self.notify(Notice::TapRecovered {
            reenable_count,
            recreate_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_beats_caps_lock() {
        assert_eq!(caps_status(CgFlags::SHIFT | CgFlags::ALPHA_SHIFT), CapsStatus::Shift);
        assert_eq!(caps_status(CgFlags::ALPHA_SHIFT), CapsStatus::CapsLock);
        assert_eq!(caps_status(CgFlags::COMMAND), CapsStatus::None);
    }
}
