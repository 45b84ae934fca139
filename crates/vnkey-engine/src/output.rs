//! Rendering engine words to UTF-16 and posting the edits.
//!
//! [`render_word`] is the pure half: one engine word becomes one or two
//! UTF-16 units according to the code table. [`Output`] is the effectful
//! half: it owns nothing, borrows the per-event state, and posts through
//! [`KeySynth`] in the order the planner chose.

use std::{
    thread,
    time::{Duration, Instant},
};

use keysynth::{BackspaceTiming, KeySynth, PostTarget, Result};
use mac_keycode::{CgFlags, Key};
use tracing::trace;

use crate::{
    Accessibility, CAPS_MASK, CHAR_CODE_MASK, CodeTable, EngineSignal, PURE_CHARACTER_MASK,
    SignalCode,
    apps,
    cli::{CliRuntime, NON_CLI_TEXT_CHUNK},
    context::RuntimeContext,
    planner::{self, MacroPlan},
    sync_key::SyncKeyStack,
};

/// Combining marks selected by bits 13..15 of a compound word.
const COMPOUND_MARKS: [u16; 5] = [0x0301, 0x0300, 0x0309, 0x0303, 0x0323];
/// Zero-width non-joiner, the probe for apps that show the usual one.
const ZERO_WIDTH_NON_JOINER: u16 = 0x200C;
/// Extra pause before a CLI backspace run when typing fast.
const CLI_FAST_PRE_DELAY_US: u64 = 4_000;

/// One rendered engine word.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Rendered {
    /// UTF-16 units; only the first `len` are valid.
    units: [u16; 2],
    /// Valid units.
    len: usize,
    /// Units to record on the sync-key stack, for double-code tables.
    pub sync_len: Option<u8>,
}

impl Rendered {
    /// The rendered units.
    pub fn units(&self) -> &[u16] {
        &self.units[..self.len]
    }

    /// A single unit.
    fn one(unit: u16, sync_len: Option<u8>) -> Self {
        Self {
            units: [unit, 0],
            len: 1,
            sync_len,
        }
    }

    /// Two units.
    fn two(first: u16, second: u16, sync_len: Option<u8>) -> Self {
        Self {
            units: [first, second],
            len: 2,
            sync_len,
        }
    }
}

/// Character for a raw key-code word, with Space included.
pub fn key_code_char(word: u32) -> Option<char> {
    let key = u16::try_from(word & 0xFFFF).ok().and_then(Key::from_scancode)?;
    if key == Key::Space {
        return Some(' ');
    }
    key.to_char(word & CAPS_MASK != 0)
}

/// Render one engine word for `table`. Raw key codes that print nothing
/// render to no units.
pub fn render_word(word: u32, table: CodeTable) -> Rendered {
    let double = table.is_double_code();
    let low = u16::try_from(word & 0xFFFF).unwrap_or_default();
    if word & PURE_CHARACTER_MASK != 0 {
        return Rendered::one(low, double.then_some(1));
    }
    if word & CHAR_CODE_MASK == 0 {
        let sync = double.then_some(1);
        return match key_code_char(word) {
            Some(c) => {
                let mut buf = [0u16; 2];
                match c.encode_utf16(&mut buf) {
                    [u] => Rendered::one(*u, sync),
                    [a, b] => Rendered::two(*a, *b, sync),
                    _ => Rendered::default(),
                }
            }
            None => Rendered {
                sync_len: sync,
                ..Rendered::default()
            },
        };
    }
    match table {
        CodeTable::Unicode => Rendered::one(low, None),
        CodeTable::Tcvn3 | CodeTable::VniWindows | CodeTable::Cp1258 => {
            let lo = low & 0xFF;
            let hi = (low >> 8) & 0xFF;
            let vni = table == CodeTable::VniWindows;
            if hi > 32 {
                Rendered::two(lo, hi, vni.then_some(2))
            } else {
                Rendered::one(lo, vni.then_some(1))
            }
        }
        CodeTable::UnicodeCompound => {
            let base = low & 0x1FFF;
            let mark = usize::from(low >> 13);
            match mark.checked_sub(1).and_then(|i| COMPOUND_MARKS.get(i)) {
                Some(m) => Rendered::two(base, *m, Some(2)),
                None => Rendered::one(base, Some(1)),
            }
        }
    }
}

/// Render `words` in order, recording sync lengths on `sync`.
pub fn render_words(words: &[u32], table: CodeTable, sync: &mut SyncKeyStack) -> Vec<u16> {
    let mut out = Vec::with_capacity(words.len() * 2);
    for w in words {
        let r = render_word(*w, table);
        if let Some(n) = r.sync_len {
            sync.push(n);
        }
        out.extend_from_slice(r.units());
    }
    out
}

/// Where synthesized events go for `ctx`.
pub fn post_target(ctx: &RuntimeContext) -> PostTarget {
    if ctx.post_to_hid {
        PostTarget::Hid
    } else if ctx.post_to_session() {
        PostTarget::Session
    } else {
        ctx.proxy.map_or(PostTarget::Hid, PostTarget::Proxy)
    }
}

/// The per-event view used to post edits.
pub struct Output<'a> {
    /// Event poster.
    pub synth: &'a KeySynth,
    /// Resolved context of the event.
    pub ctx: &'a RuntimeContext,
    /// Active code table.
    pub table: CodeTable,
    /// Rollback ledger.
    pub sync: &'a mut SyncKeyStack,
    /// CLI timing state.
    pub cli: &'a mut CliRuntime,
    /// Focus inspection, for the launcher replacement path.
    pub ax: &'a dyn Accessibility,
}

impl Output<'_> {
    /// Injection point for this event.
    fn target(&self) -> PostTarget {
        post_target(self.ctx)
    }

    /// One Delete with no bookkeeping.
    pub fn send_physical_backspace(&self) -> Result<()> {
        self.synth.send_backspace(self.target())
    }

    /// Compound apps fix up their own two-unit characters.
    fn needs_extra_unit(&self) -> bool {
        !(self.table == CodeTable::UnicodeCompound && self.ctx.app.unicode_compound)
    }

    /// One Delete, widened to a whole two-unit character when the ledger
    /// says the last character took two.
    pub fn send_backspace(&mut self) -> Result<()> {
        self.send_physical_backspace()?;
        if !self.table.is_double_code() {
            return Ok(());
        }
        if let Some(back) = self.sync.back() {
            if back > 1 && self.needs_extra_unit() {
                self.send_physical_backspace()?;
            }
            self.sync.pop();
        }
        Ok(())
    }

    /// `count` backspaces, paced for CLI targets.
    pub fn send_backspace_sequence(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let Some(profile) = self.cli.profile() else {
            for _ in 0..count {
                self.send_backspace()?;
            }
            return Ok(());
        };
        let between = self.cli.scale(profile.backspace_delay_us);
        let after = self.cli.scale(profile.wait_after_backspace_us);
        let gaps = u32::try_from(count).unwrap_or(u32::MAX);
        let block = self
            .cli
            .scale(profile.post_send_block_us())
            .saturating_add(between.saturating_mul(gaps))
            .saturating_add(after);
        self.cli.schedule_block(block, Instant::now());
        if self.cli.speed_factor() > 1.05 {
            thread::sleep(self.cli.scale(CLI_FAST_PRE_DELAY_US));
        }
        trace!(count, ?between, ?after, "cli_backspace_sequence");
        self.synth.send_backspaces(
            self.target(),
            count,
            BackspaceTiming { between, after },
        )?;
        if self.table.is_double_code() {
            self.sync.consume_backspaces(count);
        }
        self.cli.schedule_block(block, Instant::now());
        Ok(())
    }

    /// Shift+Left, repeated for a two-unit character.
    pub fn send_shift_left(&mut self) -> Result<()> {
        self.synth.send_shift_left(self.target())?;
        if self.table.is_double_code()
            && let Some(back) = self.sync.back()
        {
            if back > 1 && self.needs_extra_unit() {
                self.synth.send_shift_left(self.target())?;
            }
            self.sync.pop();
        }
        Ok(())
    }

    /// The autocomplete-breaking probe character.
    pub fn send_empty_character(&mut self) -> Result<()> {
        if self.table.is_double_code() {
            self.sync.push(1);
        }
        if self.ctx.effective_is(apps::needs_nice_space) {
            self.synth.send_unit(self.target(), ZERO_WIDTH_NON_JOINER)
        } else {
            self.synth.send_empty_character(self.target())
        }
    }

    /// Post one engine word: a raw key tap or its rendered units.
    pub fn send_key_code(&mut self, word: u32) -> Result<()> {
        if word & (CHAR_CODE_MASK | PURE_CHARACTER_MASK) == 0 {
            if self.table.is_double_code() {
                self.sync.push(1);
            }
            let key = u16::try_from(word & 0xFFFF).unwrap_or_default();
            let mut flags = CgFlags::NON_COALESCED;
            if word & CAPS_MASK != 0 {
                flags |= CgFlags::SHIFT;
            }
            return self.synth.send_key(self.target(), key, flags);
        }
        let r = render_word(word, self.table);
        if let Some(n) = r.sync_len {
            self.sync.push(n);
        }
        self.synth.send_units(self.target(), r.units(), 0, Duration::ZERO)
    }

    /// Insert `units` with the pacing of the target.
    fn send_units_paced(&mut self, units: &[u16]) -> Result<()> {
        let (chunk, delay) = self.cli.text_pacing();
        let cli = self.cli.profile();
        let block = cli.map(|p| {
            let gaps = u32::try_from(units.len().saturating_sub(1)).unwrap_or(u32::MAX);
            self.cli
                .scale(p.post_send_block_us())
                .saturating_add(delay.saturating_mul(gaps))
        });
        if let Some(b) = block {
            self.cli.schedule_block(b, Instant::now());
        }
        let chunk = if cli.is_some() { chunk } else { NON_CLI_TEXT_CHUNK };
        self.synth.send_units(self.target(), units, chunk, delay)?;
        if let Some(b) = block {
            self.cli.schedule_block(b, Instant::now());
        }
        Ok(())
    }

    /// Insert a signal's characters as one string.
    ///
    /// For a restore, the trigger key's own character is appended (with its
    /// case); a trigger that prints nothing is re-sent as a key tap instead.
    /// Launchers take the edit through accessibility first, using the
    /// backspaces deferred to it.
    pub fn send_new_char_string(
        &mut self,
        words: &[u32],
        code: SignalCode,
        key: u16,
        flags: CgFlags,
        deferred_backspaces: usize,
        precompose: &dyn Fn(&[u16]) -> Vec<u16>,
    ) -> Result<()> {
        let mut units = render_words(words, self.table, self.sync);
        let mut trailing_key = None;
        if code.is_restore() {
            let caps = if flags.has_case() { CAPS_MASK } else { 0 };
            match key_code_char(u32::from(key) | caps) {
                Some(c) => {
                    let mut buf = [0u16; 2];
                    units.extend_from_slice(c.encode_utf16(&mut buf));
                }
                None => trailing_key = Some(key),
            }
        }

        let spotlight = self.ctx.spotlight_like();
        let batched = self.ctx.app.precomposed_batched;
        let force_precomposed = (self.table == CodeTable::UnicodeCompound && spotlight)
            || (matches!(self.table, CodeTable::Unicode | CodeTable::UnicodeCompound) && batched);
        if force_precomposed && !units.is_empty() {
            units = precompose(&units);
        }

        if spotlight {
            let replaced =
                self.ax.replace_focused_text(deferred_backspaces, &units, deferred_backspaces > 0);
            trace!(replaced, deferred_backspaces, len = units.len(), "ax_replace");
            if !replaced {
                self.send_backspace_sequence(deferred_backspaces)?;
                self.synth.send_units(self.target(), &units, 0, Duration::ZERO)?;
            }
        } else {
            self.send_units_paced(&units)?;
        }

        if let Some(k) = trailing_key {
            self.send_key_code(u32::from(k))?;
        }
        Ok(())
    }

    /// Send `words` one event each, paced for CLI targets.
    pub fn send_step_by_step(&mut self, words: &[u32]) -> Result<()> {
        let (_, delay) = self.cli.text_pacing();
        let post = self
            .cli
            .profile()
            .map_or(Duration::ZERO, |p| self.cli.scale(p.post_send_block_us()));
        let plan = planner::sequence_plan(self.cli.profile().is_some(), words.len(), delay, post);
        for (i, w) in words.iter().enumerate() {
            if w & PURE_CHARACTER_MASK != 0 {
                let unit = u16::try_from(w & 0xFFFF).unwrap_or_default();
                self.synth.send_unit(self.target(), unit)?;
                if self.table.is_double_code() {
                    self.sync.push(1);
                }
            } else {
                self.send_key_code(*w)?;
            }
            if !plan.inter_item_delay.is_zero() && i + 1 < words.len() {
                thread::sleep(plan.inter_item_delay);
            }
        }
        if let Some(b) = plan.block {
            self.cli.schedule_block(b, Instant::now());
        }
        Ok(())
    }

    /// Expand a macro in place of the typed abbreviation.
    pub fn handle_macro(
        &mut self,
        plan: &MacroPlan,
        signal: &EngineSignal,
        key: u16,
        flags: CgFlags,
    ) -> Result<()> {
        let bs = usize::from(signal.backspace_count);
        if plan.try_ax_replacement {
            let mut scratch = SyncKeyStack::default();
            let units = render_words(&signal.macro_data, self.table, &mut scratch);
            if self.ax.replace_focused_text(bs, &units, bs > 0) {
                trace!(len = units.len(), "macro_replaced_via_ax");
                return Ok(());
            }
        }
        let backspaces = if plan.browser_fix {
            self.send_empty_character()?;
            plan.backspaces
        } else {
            bs
        };
        self.send_backspace_sequence(backspaces)?;

        if plan.step_by_step {
            self.send_step_by_step(&signal.macro_data)?;
        } else {
            let units = render_words(&signal.macro_data, self.table, self.sync);
            if plan.spotlight_like {
                self.synth.send_units(self.target(), &units, 0, Duration::ZERO)?;
            } else {
                self.send_units_paced(&units)?;
            }
        }

        if plan.send_trigger_key {
            let caps = if flags.contains(CgFlags::SHIFT) { CAPS_MASK } else { 0 };
            self.send_key_code(u32::from(key) | caps)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use keysynth::{Posted, RecordingPoster};

    use super::*;
    use crate::{apps::AppCharacteristics, cli::CliProfileKind, test_support::FakeAccessibility};

    fn setup() -> (Arc<RecordingPoster>, KeySynth) {
        let rec = Arc::new(RecordingPoster::default());
        (rec.clone(), KeySynth::with_poster(rec))
    }

    #[test]
    fn renders_each_table() {
        let a = u32::from(Key::A.scancode());
        assert_eq!(render_word(a | CAPS_MASK, CodeTable::Unicode).units(), &[0x41]);
        assert_eq!(render_word(PURE_CHARACTER_MASK | 0x1EA1, CodeTable::Unicode).units(), &[0x1EA1]);
        assert_eq!(render_word(CHAR_CODE_MASK | 0x1EA1, CodeTable::Unicode).units(), &[0x1EA1]);

        let vni = render_word(CHAR_CODE_MASK | 0xE961, CodeTable::VniWindows);
        assert_eq!(vni.units(), &[0x61, 0xE9]);
        assert_eq!(vni.sync_len, Some(2));
        let tcvn = render_word(CHAR_CODE_MASK | 0x00B8, CodeTable::Tcvn3);
        assert_eq!(tcvn.units(), &[0xB8]);
        assert_eq!(tcvn.sync_len, None);

        let compound = render_word(CHAR_CODE_MASK | (1 << 13) | 0x61, CodeTable::UnicodeCompound);
        assert_eq!(compound.units(), &[0x61, 0x0301]);
        assert_eq!(compound.sync_len, Some(2));
        let plain = render_word(CHAR_CODE_MASK | 0x61, CodeTable::UnicodeCompound);
        assert_eq!(plain.units(), &[0x61]);
    }

    #[test]
    fn space_key_code_renders() {
        assert_eq!(render_word(u32::from(Key::Space.scancode()), CodeTable::Unicode).units(), &[0x20]);
        assert!(render_word(u32::from(Key::LeftArrow.scancode()), CodeTable::Unicode).units().is_empty());
    }

    #[test]
    fn backspace_widens_for_two_unit_characters() {
        let (rec, synth) = setup();
        let ctx = RuntimeContext::default();
        let mut sync = SyncKeyStack::default();
        sync.push(2);
        let mut cli = CliRuntime::default();
        let ax = FakeAccessibility::default();
        let mut out = Output {
            synth: &synth,
            ctx: &ctx,
            table: CodeTable::VniWindows,
            sync: &mut sync,
            cli: &mut cli,
            ax: &ax,
        };
        assert!(out.send_backspace().is_ok());
        assert_eq!(rec.backspaces(), 2);
        assert!(sync.is_empty());
    }

    #[test]
    fn restore_appends_trigger_character() {
        let (rec, synth) = setup();
        let ctx = RuntimeContext::default();
        let mut sync = SyncKeyStack::default();
        let mut cli = CliRuntime::default();
        let ax = FakeAccessibility::default();
        let mut out = Output {
            synth: &synth,
            ctx: &ctx,
            table: CodeTable::Unicode,
            sync: &mut sync,
            cli: &mut cli,
            ax: &ax,
        };
        let words: Vec<u32> = [Key::T, Key::O, Key::W]
            .iter()
            .map(|k| u32::from(k.scancode()))
            .collect();
        let res = out.send_new_char_string(
            &words,
            SignalCode::Restore,
            Key::Space.scancode(),
            CgFlags::empty(),
            0,
            &|u: &[u16]| u.to_vec(),
        );
        assert!(res.is_ok());
        assert_eq!(rec.text(), "tow ");
    }

    #[test]
    fn launcher_edits_go_through_accessibility() {
        let (rec, synth) = setup();
        let ctx = RuntimeContext {
            post_to_hid: true,
            ..RuntimeContext::default()
        };
        let mut sync = SyncKeyStack::default();
        let mut cli = CliRuntime::default();
        let ax = FakeAccessibility::default();
        let mut out = Output {
            synth: &synth,
            ctx: &ctx,
            table: CodeTable::Unicode,
            sync: &mut sync,
            cli: &mut cli,
            ax: &ax,
        };
        ax.set_replace_ok(true);
        let words = [CHAR_CODE_MASK | 0x1EA1];
        let res = out.send_new_char_string(
            &words,
            SignalCode::WillProcess,
            Key::A.scancode(),
            CgFlags::empty(),
            1,
            &|u: &[u16]| u.to_vec(),
        );
        assert!(res.is_ok());
        assert!(rec.events().is_empty());
        assert_eq!(ax.replacements(), vec![(1, vec![0x1EA1])]);
    }

    #[test]
    fn nice_space_apps_get_zero_width_probe() {
        let (rec, synth) = setup();
        let ctx = RuntimeContext {
            effective_bundle: Some("com.sublimetext.3".into()),
            app: AppCharacteristics::default(),
            ..RuntimeContext::default()
        };
        let mut sync = SyncKeyStack::default();
        let mut cli = CliRuntime::default();
        let ax = FakeAccessibility::default();
        let mut out = Output {
            synth: &synth,
            ctx: &ctx,
            table: CodeTable::Unicode,
            sync: &mut sync,
            cli: &mut cli,
            ax: &ax,
        };
        assert!(out.send_empty_character().is_ok());
        assert!(matches!(
            rec.events().first(),
            Some(Posted::Unicode { units, .. }) if units == &[ZERO_WIDTH_NON_JOINER]
        ));
    }

    #[test]
    fn macro_with_browser_fix_and_trigger() {
        let (rec, synth) = setup();
        let ctx = RuntimeContext::default();
        let mut sync = SyncKeyStack::default();
        let mut cli = CliRuntime::default();
        let ax = FakeAccessibility::default();
        let mut out = Output {
            synth: &synth,
            ctx: &ctx,
            table: CodeTable::Unicode,
            sync: &mut sync,
            cli: &mut cli,
            ax: &ax,
        };
        let signal = EngineSignal {
            code: SignalCode::ReplaceMacro,
            backspace_count: 2,
            macro_data: "ok".chars().map(|c| PURE_CHARACTER_MASK | u32::from(c)).collect(),
            ..EngineSignal::default()
        };
        let plan = planner::macro_plan(&ctx, true, signal.backspace_count, false);
        assert!(out.handle_macro(&plan, &signal, Key::Space.scancode(), CgFlags::empty()).is_ok());
        assert_eq!(rec.backspaces(), 3);
        assert_eq!(rec.key_downs(Key::Space), 1);
        assert!(rec.text().ends_with("ok"));
    }

    #[test]
    fn cli_step_by_step_schedules_block() {
        let (rec, synth) = setup();
        let ctx = RuntimeContext::default();
        let mut sync = SyncKeyStack::default();
        let mut cli = CliRuntime::default();
        let ax = FakeAccessibility::default();
        cli.apply_profile(Some(CliProfileKind::FastTerminal.profile()));
        let mut out = Output {
            synth: &synth,
            ctx: &ctx,
            table: CodeTable::Unicode,
            sync: &mut sync,
            cli: &mut cli,
            ax: &ax,
        };
        let words = [CHAR_CODE_MASK | 0x1EA1, u32::from(Key::B.scancode())];
        assert!(out.send_step_by_step(&words).is_ok());
        assert_eq!(rec.key_downs(Key::B), 1);
        assert!(cli.remaining_block(Instant::now()) > Duration::ZERO);
    }
}
