//! Signal-to-action planning.
//!
//! Pure functions that turn an [`EngineSignal`] plus the [`RuntimeContext`]
//! into plans. Nothing here posts events or asks the accessibility
//! collaborator; the pipeline does that in the order the plans describe.

use std::time::Duration;

use mac_keycode::Key;

use crate::{CodeTable, EngineSignal, ExtCode, MAX_BUFF, SignalCode, context::RuntimeContext};

/// Bundle id of the design tool whose Space must reach the app untouched.
const FIGMA: &str = "com.figma.Desktop";
/// Bundle id of Notion.
const NOTION: &str = "notion.id";

/// What the pipeline does with a signal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SignalAction {
    /// Let the key through, after sync-key bookkeeping.
    DoNothing,
    /// Delete and insert.
    Process,
    /// Expand a macro.
    ReplaceMacro,
    /// Let the key through untouched.
    Pass,
}

/// Classify the engine's verdict.
pub fn signal_action(code: SignalCode) -> SignalAction {
    match code {
        SignalCode::WillProcess | SignalCode::Restore | SignalCode::RestoreAndStartNewSession => {
            SignalAction::Process
        }
        SignalCode::ReplaceMacro => SignalAction::ReplaceMacro,
        SignalCode::DoNothing => SignalAction::DoNothing,
        SignalCode::BreakWord => SignalAction::Pass,
    }
}

/// Which fixes apply to a process signal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ProcessPlan {
    /// Pass the Space through so "hold Space to pan" keeps working.
    pub bypass_for_figma: bool,
    /// Launcher or batched-precomposed app.
    pub special_app: bool,
    /// Slash may start a shortcut in the target app.
    pub potential_shortcut: bool,
    /// Browser fix applies to this target.
    pub browser_fix: bool,
    /// A plain Space with no deletion.
    pub skip_space: bool,
    /// Ask whether the address bar is focused.
    pub try_address_bar_fix: bool,
    /// Apply the non-browser autocomplete fix.
    pub try_legacy_fix: bool,
    /// Target is Notion.
    pub notion: bool,
}

impl ProcessPlan {
    /// Build the plan for `key` and `signal` in `ctx`.
    pub fn new(key: u16, signal: &EngineSignal, ctx: &RuntimeContext, browser_fix_enabled: bool) -> Self {
        let bundle = ctx.effective_bundle.as_deref();
        let is_space = key == Key::Space.scancode();
        let is_slash = key == Key::Slash.scancode();
        let bs = signal.backspace_count;
        let no_empty = signal.ext == ExtCode::NoEmptyChar;

        let special_app = ctx.post_to_hid || ctx.app.precomposed_batched;
        let browser_fix = browser_fix_enabled && ctx.is_browser;
        let skip_space = is_space && bs == 0;
        let notion = bundle == Some(NOTION);

        Self {
            bypass_for_figma: is_space && bs == 0 && signal.new_char_count() == 1 && bundle == Some(FIGMA),
            special_app,
            potential_shortcut: is_slash,
            browser_fix,
            skip_space,
            try_address_bar_fix: browser_fix
                && !no_empty
                && bs > 0
                && !special_app
                && !skip_space
                && !is_slash,
            try_legacy_fix: browser_fix_enabled
                && !no_empty
                && bs > 0
                && (!special_app || notion)
                && !is_space
                && !is_slash
                && !ctx.is_browser,
            notion,
        }
    }
}

/// Keystrokes sent before the backspaces.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum BackspaceAdjustment {
    /// None.
    #[default]
    None,
    /// Insert the empty character so one more backspace removes a suggestion.
    EmptyCharacter,
    /// Select one character left and delete it.
    ShiftLeftThenBackspace,
}

/// Backspace handling for a process signal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct BackspacePlan {
    /// Pre-adjustment keystrokes.
    pub adjustment: BackspaceAdjustment,
    /// Count after the adjustment, before clamping.
    pub adjusted: i32,
    /// Count to actually send.
    pub sanitized: u8,
    /// The safety ceiling cut the count.
    pub clamped: bool,
}

/// Clamp a backspace count into `0..=min(max_buffer, safety_limit)`.
pub fn sanitize_backspace_count(adjusted: i32, max_buffer: usize, safety_limit: u8) -> u8 {
    let ceiling = i32::try_from(max_buffer)
        .unwrap_or(i32::MAX)
        .min(i32::from(safety_limit));
    u8::try_from(adjusted.clamp(0, ceiling.max(0))).unwrap_or(safety_limit)
}

/// Decide the adjustment and final count.
pub fn resolve_backspace_plan(
    plan: &ProcessPlan,
    address_bar: bool,
    unicode_compound_app: bool,
    notion_code_block: bool,
    backspace_count: u8,
    safety_limit: u8,
) -> BackspacePlan {
    let bs = i32::from(backspace_count);
    let (adjustment, adjusted) = if bs == 0 {
        (BackspaceAdjustment::None, 0)
    } else if plan.try_address_bar_fix && address_bar {
        (BackspaceAdjustment::EmptyCharacter, bs + 1)
    } else if plan.try_legacy_fix && !notion_code_block {
        if unicode_compound_app {
            (BackspaceAdjustment::ShiftLeftThenBackspace, bs - 1)
        } else {
            (BackspaceAdjustment::EmptyCharacter, bs + 1)
        }
    } else {
        (BackspaceAdjustment::None, bs)
    };
    let sanitized = sanitize_backspace_count(adjusted, MAX_BUFF, safety_limit);
    BackspacePlan {
        adjustment,
        adjusted,
        sanitized,
        clamped: adjusted > i32::from(sanitized),
    }
}

/// How the new characters go out.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct CharacterSendPlan {
    /// Leave the backspaces to the accessibility replacement.
    pub defer_backspace_to_ax: bool,
    /// One event per character instead of one string.
    pub step_by_step: bool,
    /// Re-send the key that triggered a restore.
    pub send_restore_trigger: bool,
    /// Tell the engine to start a fresh word afterwards.
    pub start_new_session: bool,
}

/// Pick the send strategy.
pub fn character_send_plan(
    ctx: &RuntimeContext,
    global_step_by_step: bool,
    key: u16,
    code: SignalCode,
) -> CharacterSendPlan {
    let auto_english_enter = code == SignalCode::RestoreAndStartNewSession
        && Key::from_scancode(key).is_some_and(Key::is_enter);
    let spotlight = ctx.post_to_hid;
    let step_by_step = !spotlight
        && (ctx.is_cli() || global_step_by_step || ctx.app.step_by_step || auto_english_enter);
    CharacterSendPlan {
        defer_backspace_to_ax: spotlight,
        step_by_step,
        send_restore_trigger: step_by_step && code.is_restore(),
        start_new_session: step_by_step && code == SignalCode::RestoreAndStartNewSession,
    }
}

/// Pacing for a step-by-step send.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SequencePlan {
    /// Pause between characters.
    pub inter_item_delay: Duration,
    /// Quiet window to schedule afterwards, if any.
    pub block: Option<Duration>,
}

/// Pacing for `items` characters. `text_delay` and `post_send_block` are
/// already scaled by the speed factor.
pub fn sequence_plan(
    cli: bool,
    items: usize,
    text_delay: Duration,
    post_send_block: Duration,
) -> SequencePlan {
    if !cli || items == 0 {
        return SequencePlan::default();
    }
    let gaps = u32::try_from(items.saturating_sub(1)).unwrap_or(u32::MAX);
    let block = post_send_block.saturating_add(text_delay.saturating_mul(gaps));
    SequencePlan {
        inter_item_delay: text_delay,
        block: Some(block),
    }
}

/// Steps for expanding a macro.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct MacroPlan {
    /// Launcher target.
    pub spotlight_like: bool,
    /// Try the accessibility replacement first.
    pub try_ax_replacement: bool,
    /// Send the empty character before the backspaces.
    pub browser_fix: bool,
    /// Backspaces to send.
    pub backspaces: usize,
    /// One event per character.
    pub step_by_step: bool,
    /// Re-send the key that triggered the expansion.
    pub send_trigger_key: bool,
}

/// Plan a macro expansion.
pub fn macro_plan(
    ctx: &RuntimeContext,
    browser_fix_enabled: bool,
    backspace_count: u8,
    global_step_by_step: bool,
) -> MacroPlan {
    let spotlight_like = ctx.spotlight_like();
    MacroPlan {
        spotlight_like,
        try_ax_replacement: spotlight_like,
        browser_fix: browser_fix_enabled,
        backspaces: usize::from(backspace_count) + usize::from(browser_fix_enabled),
        step_by_step: ctx.is_cli() || global_step_by_step || ctx.app.step_by_step,
        send_trigger_key: !spotlight_like,
    }
}

/// Compound output breaks launcher search fields; use plain Unicode there.
pub fn use_temporary_unicode(table: CodeTable, ctx: &RuntimeContext) -> bool {
    table == CodeTable::UnicodeCompound && (ctx.spotlight_active || ctx.app.spotlight_like)
}
