//! Rollback ledger for double-code tables.
//!
//! With VNI or Unicode Compound output one engine character can land as two
//! units in the editor. The stack remembers how many units each inserted
//! character took, so a Delete the engine did not act on can be widened to
//! remove the whole character.

use crate::{CodeTable, ExtCode};

/// Insertion lengths, most recent last.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SyncKeyStack {
    /// One entry per inserted character.
    lengths: Vec<u8>,
}

/// What a do-nothing signal does to the stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SyncKeyAction {
    /// Leave the stack alone.
    None,
    /// The word ended.
    Clear,
    /// A Delete removed the last character.
    Pop,
    /// A Delete removed a two-unit character; send one more backspace.
    PopAndSendBackspace,
    /// A plain character was typed.
    InsertOne,
}

impl SyncKeyStack {
    /// Remember a character that took `len` units.
    pub fn push(&mut self, len: u8) {
        self.lengths.push(len);
    }

    /// Forget the most recent character.
    pub fn pop(&mut self) -> Option<u8> {
        self.lengths.pop()
    }

    /// Length of the most recent character.
    pub fn back(&self) -> Option<u8> {
        self.lengths.last().copied()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.lengths.clear();
    }

    /// No characters recorded.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Number of characters recorded.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Drop the entries for `count` backspaces the pipeline is about to send.
    pub fn consume_backspaces(&mut self, count: usize) {
        let keep = self.lengths.len().saturating_sub(count);
        self.lengths.truncate(keep);
    }

    /// Apply `action`. Returns true when one extra backspace must be sent.
    pub fn apply(&mut self, action: SyncKeyAction) -> bool {
        match action {
            SyncKeyAction::None => false,
            SyncKeyAction::Clear => {
                self.clear();
                false
            }
            SyncKeyAction::Pop => {
                self.pop();
                false
            }
            SyncKeyAction::PopAndSendBackspace => {
                self.pop();
                true
            }
            SyncKeyAction::InsertOne => {
                self.push(1);
                false
            }
        }
    }
}

/// Decide the stack update for a do-nothing signal.
pub fn sync_key_action(
    table: CodeTable,
    ext: ExtCode,
    back: Option<u8>,
    unicode_compound_app: bool,
) -> SyncKeyAction {
    if !table.is_double_code() {
        return SyncKeyAction::None;
    }
    match ext {
        ExtCode::WordBreak => SyncKeyAction::Clear,
        ExtCode::Delete => match back {
            None => SyncKeyAction::None,
            Some(b) if b > 1 && (table == CodeTable::VniWindows || !unicode_compound_app) => {
                SyncKeyAction::PopAndSendBackspace
            }
            Some(_) => SyncKeyAction::Pop,
        },
        ExtCode::Normal => SyncKeyAction::InsertOne,
        _ => SyncKeyAction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_code_tables_never_touch_the_stack() {
        for ext in [ExtCode::WordBreak, ExtCode::Delete, ExtCode::Normal] {
            assert_eq!(
                sync_key_action(CodeTable::Unicode, ext, Some(2), false),
                SyncKeyAction::None
            );
        }
    }

    #[test]
    fn delete_of_two_unit_character_needs_extra_backspace() {
        let mut st = SyncKeyStack::default();
        st.push(1);
        st.push(2);
        let a = sync_key_action(CodeTable::VniWindows, ExtCode::Delete, st.back(), true);
        assert_eq!(a, SyncKeyAction::PopAndSendBackspace);
        assert!(st.apply(a));
        assert_eq!(st.back(), Some(1));
        let a = sync_key_action(CodeTable::VniWindows, ExtCode::Delete, st.back(), true);
        assert!(!st.apply(a));
        assert!(st.is_empty());
    }

    #[test]
    fn compound_apps_realign_themselves() {
        let a = sync_key_action(CodeTable::UnicodeCompound, ExtCode::Delete, Some(2), true);
        assert_eq!(a, SyncKeyAction::Pop);
        let b = sync_key_action(CodeTable::UnicodeCompound, ExtCode::Delete, Some(2), false);
        assert_eq!(b, SyncKeyAction::PopAndSendBackspace);
    }

    #[test]
    fn word_break_clears_and_normal_inserts() {
        let mut st = SyncKeyStack::default();
        st.apply(sync_key_action(CodeTable::VniWindows, ExtCode::Normal, None, false));
        st.apply(sync_key_action(CodeTable::VniWindows, ExtCode::Normal, None, false));
        assert_eq!(st.len(), 2);
        st.apply(sync_key_action(CodeTable::VniWindows, ExtCode::WordBreak, st.back(), false));
        assert!(st.is_empty());
    }

    #[test]
    fn consuming_more_than_recorded_empties() {
        let mut st = SyncKeyStack::default();
        st.push(2);
        st.consume_backspaces(5);
        assert!(st.is_empty());
    }
}
