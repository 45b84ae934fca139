//! Bundle-id classification.
//!
//! Matching is ASCII case-insensitive. A pattern ending in `*` matches any
//! bundle id starting with the text before it.

/// Safari and its web apps.
const SAFARI: &[&str] = &[
    "com.apple.Safari",
    "com.apple.SafariTechnologyPreview",
    "com.apple.Safari.WebApp.*",
];

/// Chromium-based editors that compose text as base plus combining mark.
const UNICODE_COMPOUND: &[&str] = &[
    "com.google.Chrome",
    "com.google.Chrome.app.*",
    "com.brave.Browser",
    "com.brave.Browser.app.*",
    "com.microsoft.edgemac",
    "com.microsoft.edgemac.Dev",
    "com.microsoft.edgemac.Beta",
    "com.microsoft.edgemac.app.*",
    "com.microsoft.Edge",
    "com.microsoft.Edge.Dev",
    "com.thebrowser.Browser",
    "company.thebrowser.dia",
    "org.chromium.Chromium",
    "org.chromium.Chromium.app.*",
    "com.vivaldi.Vivaldi",
    "com.operasoftware.Opera",
    "notion.id",
];

/// Browsers and Electron apps with autocompleting text fields.
const BROWSERS: &[&str] = &[
    "org.mozilla.firefox",
    "org.mozilla.firefoxdeveloperedition",
    "org.mozilla.nightly",
    "app.zen-browser.zen",
    "com.google.Chrome",
    "com.google.Chrome.canary",
    "com.google.Chrome.dev",
    "com.google.Chrome.beta",
    "com.google.Chrome.app.*",
    "org.chromium.Chromium",
    "org.chromium.Chromium.app.*",
    "com.brave.Browser",
    "com.brave.Browser.beta",
    "com.brave.Browser.nightly",
    "com.brave.Browser.app.*",
    "com.microsoft.edgemac",
    "com.microsoft.edgemac.Dev",
    "com.microsoft.edgemac.Beta",
    "com.microsoft.edgemac.Canary",
    "com.microsoft.edgemac.app.*",
    "com.microsoft.Edge",
    "com.microsoft.Edge.Dev",
    "com.thebrowser.Browser",
    "ai.perplexity.comet",
    "com.visualkit.browser",
    "com.coccoc.browser",
    "com.vivaldi.Vivaldi",
    "com.operasoftware.Opera",
    "com.operasoftware.OperaGX",
    "com.kagi.kagimacOS",
    "com.duckduckgo.macos.browser",
    "com.sigmaos.sigmaos.macos",
    "com.pushplaylabs.sidekick",
    "com.bookry.wavebox",
    "com.mighty.app",
    "com.collovos.naver.whale",
    "ru.yandex.desktop.yandex-browser",
    "com.tinyspeck.slackmacgap",
    "com.hnc.Discord",
    "com.electron.discord",
    "com.github.GitHubClient",
    "com.figma.Desktop",
    "com.linear",
    "com.logseq.logseq",
    "md.obsidian",
];

/// Terminals that keep up with fast input.
const FAST_TERMINALS: &[&str] = &["io.alacritty", "com.mitchellh.ghostty", "com.raphaelamorim.rio"];

/// Every other known terminal.
const MEDIUM_TERMINALS: &[&str] = &[
    "com.apple.Terminal",
    "net.kovidgoyal.kitty",
    "com.github.wez.wezterm",
    "com.googlecode.iterm2",
    "dev.warp.Warp-Stable",
    "co.zeit.hyper",
    "org.tabby",
    "com.termius-dmg.mac",
];

/// Terminals that need the widest spacing. None are known today.
const SLOW_TERMINALS: &[&str] = &[];

/// VS Code and its forks.
const VSCODE_FAMILY: &[&str] = &[
    "com.microsoft.VSCode",
    "com.microsoft.VSCodeInsiders",
    "com.visualstudio.code.oss",
    "com.vscodium",
    "com.vscodium.codium",
    "com.google.antigravity",
    "com.todesktop.cursor",
    "com.todesktop.230313mzl4w4u92",
];

/// JetBrains IDEs.
const JETBRAINS: &[&str] = &["com.jetbrains.*", "com.google.android.studio"];

/// Launchers whose search field takes precomposed text posted to the HID tap.
const SPOTLIGHT_LIKE: &[&str] = &["com.apple.Spotlight", "com.apple.systemuiserver", "com.raycast.*"];

/// Apps that mangle composed sequences unless sent precomposed in one batch.
const PRECOMPOSED_BATCHED: &[&str] = &["net.whatsapp.WhatsApp", "notion.id"];

/// Apps that drop characters from multi-character events.
const STEP_BY_STEP: &[&str] = &[
    "com.apple.loginwindow",
    "com.apple.SecurityAgent",
    "com.alfredapp.Alfred",
    "com.apple.launchpad",
    "notion.id",
];

/// Apps where Vietnamese input is never applied.
const DISABLE_VIETNAMESE: &[&str] = &["com.apple.apps.launcher", "com.apple.ScreenContinuity"];

/// Apps that swallow the narrow no-break space probe.
const NICE_SPACE: &[&str] = &["com.sublimetext.3", "com.sublimetext.2"];

/// Accessibility role/description fragments that identify a terminal panel.
pub const TERMINAL_PANEL_KEYWORDS: &[&str] = &[
    "terminal",
    "xterm",
    "shell",
    "console",
    "vscode-terminal",
    "terminal.integrated",
    "xterm.js",
    "terminalview",
    "terminalpanel",
    "toolwindow terminal",
    "tool window: terminal",
    "terminal tool window",
    "command line",
    "pty",
    "tty",
];

/// Does one pattern match `bundle_id`?
fn pattern_matches(pattern: &str, bundle_id: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => bundle_id
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
        None => pattern.eq_ignore_ascii_case(bundle_id),
    }
}

/// Does any pattern match `bundle_id`?
fn any_matches(patterns: &[&str], bundle_id: &str) -> bool {
    patterns.iter().any(|p| pattern_matches(p, bundle_id))
}

/// Safari or one of its web apps.
pub fn is_safari(bundle_id: &str) -> bool {
    any_matches(SAFARI, bundle_id)
}

/// Composes text as base letter plus combining mark.
pub fn contains_unicode_compound(bundle_id: &str) -> bool {
    is_safari(bundle_id) || any_matches(UNICODE_COMPOUND, bundle_id)
}

/// A browser or browser-like app.
pub fn is_browser(bundle_id: &str) -> bool {
    is_safari(bundle_id) || any_matches(BROWSERS, bundle_id)
}

/// Fast terminal.
pub fn is_fast_terminal(bundle_id: &str) -> bool {
    any_matches(FAST_TERMINALS, bundle_id)
}

/// Medium terminal.
pub fn is_medium_terminal(bundle_id: &str) -> bool {
    any_matches(MEDIUM_TERMINALS, bundle_id)
}

/// Slow terminal.
pub fn is_slow_terminal(bundle_id: &str) -> bool {
    any_matches(SLOW_TERMINALS, bundle_id)
}

/// Any known terminal emulator.
pub fn is_terminal(bundle_id: &str) -> bool {
    is_fast_terminal(bundle_id) || is_medium_terminal(bundle_id) || is_slow_terminal(bundle_id)
}

/// VS Code or a fork.
pub fn is_vscode_family(bundle_id: &str) -> bool {
    any_matches(VSCODE_FAMILY, bundle_id)
}

/// A JetBrains IDE.
pub fn is_jetbrains(bundle_id: &str) -> bool {
    any_matches(JETBRAINS, bundle_id)
}

/// A Spotlight-like launcher.
pub fn is_spotlight_like(bundle_id: &str) -> bool {
    any_matches(SPOTLIGHT_LIKE, bundle_id)
}

/// Needs precomposed text sent in one batch.
pub fn needs_precomposed_batched(bundle_id: &str) -> bool {
    any_matches(PRECOMPOSED_BATCHED, bundle_id)
}

/// Needs characters sent one event at a time.
pub fn needs_step_by_step(bundle_id: &str) -> bool {
    is_safari(bundle_id) || any_matches(STEP_BY_STEP, bundle_id)
}

/// Vietnamese input is never applied here.
pub fn disables_vietnamese(bundle_id: &str) -> bool {
    any_matches(DISABLE_VIETNAMESE, bundle_id)
}

/// The empty-character probe must be a zero-width non-joiner.
pub fn needs_nice_space(bundle_id: &str) -> bool {
    any_matches(NICE_SPACE, bundle_id)
}

/// Does an accessibility description look like a terminal panel?
pub fn looks_like_terminal_panel(description: &str) -> bool {
    let lower = description.to_ascii_lowercase();
    TERMINAL_PANEL_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Per-bundle quirks, computed once and cached by the context layer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AppCharacteristics {
    /// Spotlight-like launcher.
    pub spotlight_like: bool,
    /// Send precomposed text in one batch.
    pub precomposed_batched: bool,
    /// Send characters one event at a time.
    pub step_by_step: bool,
    /// Text is composed as base plus combining mark.
    pub unicode_compound: bool,
    /// Safari family.
    pub safari: bool,
}

impl AppCharacteristics {
    /// Classify `bundle_id`.
    pub fn for_bundle(bundle_id: &str) -> Self {
        Self {
            spotlight_like: is_spotlight_like(bundle_id),
            precomposed_batched: needs_precomposed_batched(bundle_id),
            step_by_step: needs_step_by_step(bundle_id),
            unicode_compound: contains_unicode_compound(bundle_id),
            safari: is_safari(bundle_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_ignores_case() {
        assert!(is_vscode_family("com.microsoft.vscode"));
        assert!(is_browser("COM.GOOGLE.CHROME"));
        assert!(!is_browser("com.google.Chromebook"));
    }

    #[test]
    fn wildcard_matches_prefix() {
        assert!(is_safari("com.apple.Safari.WebApp.12345"));
        assert!(is_jetbrains("com.jetbrains.pycharm"));
        assert!(is_spotlight_like("com.raycast.macos"));
        assert!(contains_unicode_compound("com.google.Chrome.app.abcdef"));
        assert!(!is_jetbrains("com.jetbrain"));
    }

    #[test]
    fn safari_flags_ride_along() {
        let c = AppCharacteristics::for_bundle("com.apple.Safari");
        assert!(c.safari && c.step_by_step && c.unicode_compound);
        assert!(!c.spotlight_like);
    }

    #[test]
    fn notion_is_batched_and_stepwise() {
        let c = AppCharacteristics::for_bundle("notion.id");
        assert!(c.precomposed_batched && c.step_by_step && c.unicode_compound);
    }

    #[test]
    fn terminal_classes() {
        assert!(is_terminal("com.apple.Terminal"));
        assert!(is_fast_terminal("io.alacritty"));
        assert!(!is_terminal("com.microsoft.VSCode"));
        assert!(looks_like_terminal_panel("Terminal 1, zsh"));
        assert!(!looks_like_terminal_panel("Editor group"));
    }

    #[test]
    fn disabled_and_nice_space_lists() {
        assert!(disables_vietnamese("com.apple.ScreenContinuity"));
        assert!(needs_nice_space("com.sublimetext.3"));
        assert!(!needs_nice_space("com.sublimetext.4"));
    }
}
