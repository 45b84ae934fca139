//! Per-event runtime context.
//!
//! [`ContextCache::prepare`] answers "where is this keystroke going and what
//! does that app need" for every key-down. Accessibility answers are cached
//! with short TTLs so the callback thread rarely waits on them, and the cache
//! lock is never held while the collaborator is being asked.

use std::{
    collections::HashMap,
    mem,
    time::{Duration, Instant},
};

use keysynth::TapProxy;
use parking_lot::Mutex;
use tracing::trace;

use crate::{
    Accessibility, Settings,
    apps::{self, AppCharacteristics},
    cli::CliProfileKind,
};

/// Everything the rest of the pipeline needs to know about the target.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeContext {
    /// Bundle id of the process the event is routed to.
    pub target_bundle: Option<String>,
    /// Bundle id whose quirks apply: the focused one while a launcher is up,
    /// otherwise the target.
    pub effective_bundle: Option<String>,
    /// A Spotlight-like search field has focus.
    pub spotlight_active: bool,
    /// Quirks of the effective bundle.
    pub app: AppCharacteristics,
    /// Target or effective bundle is a browser.
    pub is_browser: bool,
    /// Effective bundle is a terminal emulator.
    pub is_terminal: bool,
    /// Effective bundle is a JetBrains IDE.
    pub is_jetbrains: bool,
    /// A terminal panel inside an editor has focus.
    pub terminal_panel: bool,
    /// Timing profile when the target is a CLI.
    pub cli_profile: Option<CliProfileKind>,
    /// Synthesized events go to the HID tap.
    pub post_to_hid: bool,
    /// Vietnamese input is disabled for the target.
    pub vietnamese_disabled: bool,
    /// Sentence-start capitalisation is off for the target.
    pub upper_case_excluded: bool,
    /// Tap proxy of the event being processed.
    pub proxy: Option<TapProxy>,
}

impl RuntimeContext {
    /// Terminal, JetBrains IDE, or an editor's terminal panel.
    pub fn is_cli(&self) -> bool {
        self.cli_profile.is_some()
    }

    /// CLI targets take their synthesized keys on the session tap.
    pub fn post_to_session(&self) -> bool {
        self.is_cli()
    }

    /// Spotlight-like handling applies: launcher focused or known launcher.
    pub fn spotlight_like(&self) -> bool {
        self.post_to_hid || self.app.spotlight_like
    }

    /// Bundle id matching helper for the effective target.
    pub fn effective_is(&self, f: fn(&str) -> bool) -> bool {
        self.effective_bundle.as_deref().is_some_and(f)
    }
}

/// Cached launcher-focus answer.
#[derive(Clone, Debug)]
struct SpotlightEntry {
    /// When it was fetched.
    at: Instant,
    /// Launcher has focus.
    active: bool,
    /// Focused bundle id.
    focused: Option<String>,
}

/// Cached per-target answer.
#[derive(Clone, Debug)]
struct TargetEntry {
    /// Target pid.
    pid: i32,
    /// When it was fetched.
    at: Instant,
    /// Bundle id of the pid.
    bundle: Option<String>,
    /// Vietnamese disabled for it.
    disabled: bool,
}

/// Mutable cache state.
#[derive(Debug, Default)]
struct CacheState {
    /// Last launcher-focus answer.
    spotlight: Option<SpotlightEntry>,
    /// Last target answer.
    target: Option<TargetEntry>,
    /// Quirks per bundle with the time they were computed.
    characteristics: HashMap<String, (AppCharacteristics, Instant)>,
    /// Edits deferred to the accessibility path.
    pending_backspaces: usize,
}

/// Process-wide context cache.
#[derive(Debug, Default)]
pub struct ContextCache {
    /// Guarded state, held only for lookups and stores.
    state: Mutex<CacheState>,
}

impl ContextCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every cached answer.
    pub fn invalidate(&self) {
        let mut st = self.state.lock();
        st.spotlight = None;
        st.target = None;
        st.characteristics.clear();
    }

    /// Resolve the context for an event routed to `target_pid`.
    pub fn prepare(
        &self,
        target_pid: i32,
        proxy: Option<TapProxy>,
        settings: &Settings,
        ax: &dyn Accessibility,
        now: Instant,
    ) -> RuntimeContext {
        let safe = settings.safe_mode;
        let (spotlight_active, focused) = if safe {
            (false, ax.frontmost_bundle_id())
        } else {
            self.spotlight(ax, settings.spotlight_ttl(), now)
        };
        let (target_bundle, excluded_by_list) = self.target(target_pid, settings, ax, now);

        let effective = if spotlight_active && focused.is_some() {
            focused.clone()
        } else {
            target_bundle.clone().or_else(|| focused.clone())
        };
        let app = effective.as_deref().map_or_else(AppCharacteristics::default, |b| {
            self.characteristics(b, settings.app_characteristics_max_age(), now)
        });

        let is_browser = target_bundle.as_deref().is_some_and(apps::is_browser)
            || effective.as_deref().is_some_and(apps::is_browser);
        let is_terminal = effective.as_deref().is_some_and(apps::is_terminal);
        let is_jetbrains = effective.as_deref().is_some_and(apps::is_jetbrains);
        let terminal_panel = !safe && !is_terminal && !is_jetbrains && ax.is_terminal_panel_focused();
        let cli = is_terminal || is_jetbrains || terminal_panel;
        let cli_profile = cli.then(|| CliProfileKind::for_bundle(effective.as_deref()));

        // Disabled-app exclusion keys on the focused bundle; fall back to the target.
        let focus_key = focused.as_deref().or(target_bundle.as_deref());
        let vietnamese_disabled =
            excluded_by_list || focus_key.is_some_and(|b| disabled_for(b, settings));

        let ctx = RuntimeContext {
            upper_case_excluded: settings.upper_case_excluded(effective.as_deref()),
            target_bundle,
            post_to_hid: (!is_browser && spotlight_active) || app.spotlight_like,
            effective_bundle: effective,
            spotlight_active,
            app,
            is_browser,
            is_terminal,
            is_jetbrains,
            terminal_panel,
            cli_profile,
            vietnamese_disabled,
            proxy,
        };
        trace!(
            target_bundle = ?ctx.target_bundle,
            effective = ?ctx.effective_bundle,
            spotlight = ctx.spotlight_active,
            cli = ctx.is_cli(),
            disabled = ctx.vietnamese_disabled,
            "context_prepared"
        );
        ctx
    }

    /// Launcher focus and focused bundle, refreshed after `ttl`.
    fn spotlight(
        &self,
        ax: &dyn Accessibility,
        ttl: Duration,
        now: Instant,
    ) -> (bool, Option<String>) {
        if let Some(e) = &self.state.lock().spotlight
            && now.saturating_duration_since(e.at) < ttl
        {
            return (e.active, e.focused.clone());
        }
        let active = ax.is_spotlight_active();
        let focused = ax.focused_bundle_id();
        self.state.lock().spotlight = Some(SpotlightEntry {
            at: now,
            active,
            focused: focused.clone(),
        });
        (active, focused)
    }

    /// Bundle id of `pid` and whether the pid's own bundle disables
    /// Vietnamese, refreshed after the app-switch TTL or a pid change.
    fn target(
        &self,
        pid: i32,
        settings: &Settings,
        ax: &dyn Accessibility,
        now: Instant,
    ) -> (Option<String>, bool) {
        if let Some(e) = &self.state.lock().target
            && e.pid == pid
            && now.saturating_duration_since(e.at) < settings.app_switch_ttl()
        {
            return (e.bundle.clone(), e.disabled);
        }
        let bundle = if pid > 0 {
            ax.bundle_id_for_pid(pid)
        } else {
            None
        };
        let disabled = bundle.as_deref().is_some_and(|b| disabled_for(b, settings));
        self.state.lock().target = Some(TargetEntry {
            pid,
            at: now,
            bundle: bundle.clone(),
            disabled,
        });
        (bundle, disabled)
    }

    /// Quirks of `bundle`, recomputed after `max_age`.
    fn characteristics(&self, bundle: &str, max_age: Duration, now: Instant) -> AppCharacteristics {
        let mut st = self.state.lock();
        if let Some((c, at)) = st.characteristics.get(bundle)
            && now.saturating_duration_since(*at) < max_age
        {
            return *c;
        }
        let c = AppCharacteristics::for_bundle(bundle);
        st.characteristics.insert(bundle.to_string(), (c, now));
        c
    }

    /// Remember backspaces an accessibility replacement will perform.
    pub fn set_pending_backspaces(&self, count: usize) {
        self.state.lock().pending_backspaces = count;
    }

    /// Take and clear the deferred backspace count.
    pub fn take_pending_backspaces(&self) -> usize {
        mem::take(&mut self.state.lock().pending_backspaces)
    }
}

/// Built-in disabled list or a user exclusion.
fn disabled_for(bundle: &str, settings: &Settings) -> bool {
    apps::disables_vietnamese(bundle)
        || settings
            .excluded_apps
            .iter()
            .any(|b| b.eq_ignore_ascii_case(bundle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeAccessibility;

    fn prepare(cache: &ContextCache, ax: &FakeAccessibility, settings: &Settings) -> RuntimeContext {
        cache.prepare(42, None, settings, ax, Instant::now())
    }

    #[test]
    fn terminal_target_is_cli() {
        let ax = FakeAccessibility::with_target("com.apple.Terminal");
        let ctx = prepare(&ContextCache::new(), &ax, &Settings::default());
        assert!(ctx.is_cli() && ctx.post_to_session());
        assert_eq!(ctx.cli_profile, Some(CliProfileKind::MediumTerminal));
        assert!(!ctx.post_to_hid);
    }

    #[test]
    fn spotlight_focus_overrides_target() {
        let ax = FakeAccessibility::with_target("com.apple.finder");
        ax.set_spotlight("com.apple.Spotlight");
        let ctx = prepare(&ContextCache::new(), &ax, &Settings::default());
        assert_eq!(ctx.effective_bundle.as_deref(), Some("com.apple.Spotlight"));
        assert!(ctx.post_to_hid && ctx.spotlight_like());
    }

    #[test]
    fn browser_with_spotlight_does_not_post_to_hid() {
        let ax = FakeAccessibility::with_target("com.google.Chrome");
        ax.set_spotlight("com.google.Chrome");
        let ctx = prepare(&ContextCache::new(), &ax, &Settings::default());
        assert!(ctx.is_browser);
        assert!(!ctx.post_to_hid);
    }

    #[test]
    fn safe_mode_ignores_launcher_and_panels() {
        let ax = FakeAccessibility::with_target("com.microsoft.VSCode");
        ax.set_spotlight("com.apple.Spotlight");
        ax.set_terminal_panel(true);
        let settings = Settings {
            safe_mode: true,
            ..Settings::default()
        };
        let ctx = prepare(&ContextCache::new(), &ax, &settings);
        assert!(!ctx.spotlight_active && !ctx.terminal_panel && !ctx.is_cli());
        let normal = prepare(&ContextCache::new(), &ax, &Settings::default());
        assert!(normal.spotlight_active);
    }

    #[test]
    fn editor_terminal_panel_uses_ide_profile() {
        let ax = FakeAccessibility::with_target("com.microsoft.VSCode");
        ax.set_terminal_panel(true);
        let ctx = prepare(&ContextCache::new(), &ax, &Settings::default());
        assert!(ctx.terminal_panel);
        assert_eq!(ctx.cli_profile, Some(CliProfileKind::Ide));
    }

    #[test]
    fn excluded_apps_disable_vietnamese() {
        let ax = FakeAccessibility::with_target("com.example.Game");
        let settings = Settings {
            excluded_apps: vec!["com.example.game".into()],
            ..Settings::default()
        };
        assert!(prepare(&ContextCache::new(), &ax, &settings).vietnamese_disabled);
        let builtin = FakeAccessibility::with_target("com.apple.ScreenContinuity");
        assert!(prepare(&ContextCache::new(), &builtin, &Settings::default()).vietnamese_disabled);
    }

    #[test]
    fn target_answer_is_cached_within_ttl() {
        let ax = FakeAccessibility::with_target("com.apple.Terminal");
        let cache = ContextCache::new();
        let now = Instant::now();
        let settings = Settings::default();
        cache.prepare(42, None, &settings, &ax, now);
        ax.set_target("com.apple.Safari");
        let ctx = cache.prepare(42, None, &settings, &ax, now + Duration::from_millis(10));
        assert_eq!(ctx.target_bundle.as_deref(), Some("com.apple.Terminal"));
        let later = cache.prepare(42, None, &settings, &ax, now + Duration::from_millis(500));
        assert_eq!(later.target_bundle.as_deref(), Some("com.apple.Safari"));
    }

    #[test]
    fn pending_backspaces_are_taken_once() {
        let cache = ContextCache::new();
        cache.set_pending_backspaces(3);
        assert_eq!(cache.take_pending_backspaces(), 3);
        assert_eq!(cache.take_pending_backspaces(), 0);
    }
}
