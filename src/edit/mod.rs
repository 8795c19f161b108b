pub mod undo;

use std::ops::Range;

use crate::error::Result;

pub use undo::{EditGroup, UndoStack};

/// Something edits can be replayed against.
///
/// Undo and redo only need a primitive that swaps a range for new text;
/// the document state and the test fixtures both provide one.
pub trait EditTarget {
    /// Replace `remove` chars at `offset` with `insert` and return the text
    /// that was removed.
    fn replace(&mut self, offset: usize, remove: usize, insert: &str) -> Result<String>;
}

/// How an edit was produced; decides whether it may join the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// Typed text; adjacent runs join one burst
    Typing,
    /// A single char removed by backspace or forward delete
    Erase,
    /// Paste, replace, programmatic edits. Never coalesced.
    Block,
}

/// A single reversible edit: `removed` at `offset` was replaced by `inserted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRecord {
    /// Char offset where the edit occurred
    offset: usize,
    /// Text before the edit
    removed: String,
    /// Text after the edit
    inserted: String,
    removed_len: usize,
    inserted_len: usize,
}

impl EditRecord {
    pub fn new(offset: usize, removed: String, inserted: String) -> Self {
        Self {
            offset,
            removed_len: removed.chars().count(),
            inserted_len: inserted.chars().count(),
            removed,
            inserted,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn removed(&self) -> &str {
        &self.removed
    }

    pub fn inserted(&self) -> &str {
        &self.inserted
    }

    pub fn removed_len(&self) -> usize {
        self.removed_len
    }

    pub fn inserted_len(&self) -> usize {
        self.inserted_len
    }

    /// Range the edit replaced, in pre-edit offsets
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.removed_len
    }

    /// Caret after the removed text, where undo leaves the view
    pub fn caret_before(&self) -> usize {
        self.offset + self.removed_len
    }

    /// Caret after the inserted text
    pub fn caret_after(&self) -> usize {
        self.offset + self.inserted_len
    }

    /// The edit that exactly undoes this one
    pub fn reverse(&self) -> Self {
        Self {
            offset: self.offset,
            removed: self.inserted.clone(),
            inserted: self.removed.clone(),
            removed_len: self.inserted_len,
            inserted_len: self.removed_len,
        }
    }

    pub(crate) fn apply_to(&self, target: &mut impl EditTarget) -> Result<()> {
        let removed = target.replace(self.offset, self.removed_len, &self.inserted)?;
        debug_assert_eq!(removed, self.removed, "replayed edit removed unexpected text");
        Ok(())
    }
}
