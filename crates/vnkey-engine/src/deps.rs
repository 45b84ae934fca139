use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{CodeTable, EngineInput, EngineSignal, Language, Result};

// ---- Typing engine ----

/// The Vietnamese transformation engine.
///
/// The pipeline owns it behind a mutex; every call happens on the callback
/// thread with that lock held.
pub trait TypingEngine: Send {
    /// Advance the engine for one Vietnamese-mode keystroke.
    fn handle_event(&mut self, input: EngineInput);
    /// Advance the engine in English mode (macro lookup only).
    fn handle_english_event(&mut self, input: EngineInput);
    /// Verdict for the last keystroke.
    fn signal(&self) -> EngineSignal;
    /// Current input language.
    fn language(&self) -> Language;
    /// Switch input language.
    fn set_language(&mut self, language: Language);
    /// Current output code table.
    fn code_table(&self) -> CodeTable;
    /// Switch output code table.
    fn set_code_table(&mut self, table: CodeTable);
    /// Drop the current word.
    fn start_new_session(&mut self);
    /// Drop the current word on the next keystroke. `allow_prime` keeps a
    /// pending sentence-start capitalisation.
    fn request_new_session(&mut self, allow_prime: bool);
    /// Capitalise the next word.
    fn prime_uppercase(&mut self);
    /// Revert the current word to the keys typed. Returns false when there
    /// is nothing to restore; the resulting edit is read from `signal`.
    fn restore_to_raw_keys(&mut self) -> bool;
    /// Fold base-plus-mark sequences into precomposed characters.
    fn precompose(&self, units: &[u16]) -> Vec<u16>;
    /// Toggle spell-check suspension.
    fn toggle_spell_check_suspension(&mut self);
    /// Toggle the temporary engine bypass.
    fn toggle_engine_bypass(&mut self);
}

// ---- Accessibility ----

/// Focus and text-field inspection.
///
/// Implementations answer from their own short-lived caches; every method
/// may be called on the callback thread.
pub trait Accessibility: Send + Sync {
    /// Bundle id of the process with `pid`.
    fn bundle_id_for_pid(&self, pid: i32) -> Option<String>;
    /// Bundle id owning the focused element.
    fn focused_bundle_id(&self) -> Option<String>;
    /// Bundle id of the frontmost application.
    fn frontmost_bundle_id(&self) -> Option<String>;
    /// A Spotlight-like search field has focus.
    fn is_spotlight_active(&self) -> bool;
    /// The focused element is a terminal panel inside an editor.
    fn is_terminal_panel_focused(&self) -> bool;
    /// The focused element is a browser address bar.
    fn is_address_bar_focused(&self) -> bool;
    /// The caret is inside a Notion code block.
    fn is_notion_code_block(&self) -> bool;
    /// The caret sits at the start of a sentence.
    fn is_at_sentence_start(&self) -> bool;
    /// Replace the `backspaces` characters before the caret with `units`.
    /// Returns true when the edit was applied (and verified, if asked).
    fn replace_focused_text(&self, backspaces: usize, units: &[u16], verify: bool) -> bool;
    /// Drop cached answers.
    fn invalidate(&self);
}

/// Accessibility that knows nothing; used where no focus inspection exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAccessibility;

impl Accessibility for NoAccessibility {
    fn bundle_id_for_pid(&self, _pid: i32) -> Option<String> {
        None
    }
    fn focused_bundle_id(&self) -> Option<String> {
        None
    }
    fn frontmost_bundle_id(&self) -> Option<String> {
        None
    }
    fn is_spotlight_active(&self) -> bool {
        false
    }
    fn is_terminal_panel_focused(&self) -> bool {
        false
    }
    fn is_address_bar_focused(&self) -> bool {
        false
    }
    fn is_notion_code_block(&self) -> bool {
        false
    }
    fn is_at_sentence_start(&self) -> bool {
        false
    }
    fn replace_focused_text(&self, _backspaces: usize, _units: &[u16], _verify: bool) -> bool {
        false
    }
    fn invalidate(&self) {}
}

// ---- Persistence ----

/// Byte blobs stored under a key.
pub trait Persistence: Send + Sync {
    /// Stored bytes, or `None` when nothing was saved.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Replace the stored bytes.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// One file per key inside a directory.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    /// Directory holding the files.
    dir: PathBuf,
}

impl FilePersistence {
    /// Store files under `dir`, created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }
}

impl Persistence for FilePersistence {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), len = bytes.len(), "persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{env, process};

    use super::*;

    #[test]
    fn file_persistence_round_trips_and_misses_cleanly() {
        let dir = env::temp_dir().join(format!("vnkey-persist-{}", process::id()));
        let p = FilePersistence::new(&dir);
        assert_eq!(p.load("missing").ok().flatten(), None);
        assert!(p.save("table", &[1, 2, 3]).is_ok());
        assert_eq!(p.load("table").ok().flatten(), Some(vec![1, 2, 3]));
        let _cleanup = fs::remove_dir_all(&dir);
    }
}
