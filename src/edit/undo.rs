use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::trace;

use super::{EditOrigin, EditRecord, EditTarget};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Undo/redo stack with burst coalescing and transaction grouping
#[derive(Debug, Clone)]
pub struct UndoStack {
    /// Stack of undo groups, oldest first
    stack: VecDeque<EditGroup>,
    /// Stack of redo groups
    redo_stack: Vec<EditGroup>,
    /// Edits of the open transaction
    current_group: Vec<EditRecord>,
    /// Nesting depth of `begin_group` calls
    depth: usize,
    /// Maximum number of undo levels
    max_size: usize,
    /// Typing or erasing run the top group may still absorb
    burst: Option<Burst>,
    /// Max gap between two edits of one burst
    window: Duration,
    /// Max chars folded into one burst
    max_burst_chars: usize,
}

#[derive(Debug, Clone, Copy)]
struct Burst {
    origin: EditOrigin,
    last_edit_at: Instant,
    chars: usize,
}

/// A group of edits that are undone/redone together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditGroup {
    records: Vec<EditRecord>,
}

impl EditGroup {
    fn new(records: Vec<EditRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[EditRecord] {
        &self.records
    }

    /// Re-apply every edit in order; returns the caret after the last one.
    fn apply(&self, target: &mut impl EditTarget) -> Result<usize> {
        for record in &self.records {
            record.apply_to(target)?;
        }
        Ok(self.records.last().map_or(0, EditRecord::caret_after))
    }

    /// Revert every edit, last first; returns the caret after the first
    /// edit's restored text.
    fn apply_reverse(&self, target: &mut impl EditTarget) -> Result<usize> {
        for record in self.records.iter().rev() {
            record.reverse().apply_to(target)?;
        }
        Ok(self.records.first().map_or(0, EditRecord::caret_before))
    }
}

fn ends_line(text: &str) -> bool {
    matches!(text.chars().last(), Some('\n' | '\r'))
}

/// A terminator anywhere but the last char
fn breaks_inside(text: &str) -> bool {
    text.char_indices()
        .any(|(i, ch)| matches!(ch, '\n' | '\r') && i + ch.len_utf8() < text.len())
}

/// Chars an edit adds to a burst
fn burst_len(record: &EditRecord) -> usize {
    record.inserted_len.max(record.removed_len)
}

impl UndoStack {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            stack: VecDeque::new(),
            redo_stack: Vec::new(),
            current_group: Vec::new(),
            depth: 0,
            max_size: config.undo_limit,
            burst: None,
            window: config.coalesce_window(),
            max_burst_chars: config.coalesce_max_chars.max(1),
        }
    }

    /// Record an edit that has already been applied.
    pub fn record(&mut self, record: EditRecord, origin: EditOrigin) {
        self.record_at(record, origin, Instant::now());
    }

    /// Record with an explicit timestamp for the coalescing window.
    pub fn record_at(&mut self, record: EditRecord, origin: EditOrigin, now: Instant) {
        // A new edit forks history
        self.redo_stack.clear();

        if self.depth > 0 {
            self.current_group.push(record);
            return;
        }
        if self.try_coalesce(&record, origin, now) {
            return;
        }

        self.burst = match origin {
            EditOrigin::Block => None,
            origin => Some(Burst {
                origin,
                last_edit_at: now,
                chars: burst_len(&record),
            }),
        };
        self.stack.push_back(EditGroup::new(vec![record]));
        self.enforce_limit();
    }

    fn try_coalesce(&mut self, record: &EditRecord, origin: EditOrigin, now: Instant) -> bool {
        let Some(burst) = self.burst.as_mut() else {
            return false;
        };
        if burst.origin != origin
            || now.saturating_duration_since(burst.last_edit_at) > self.window
            || burst.chars + burst_len(record) > self.max_burst_chars
        {
            return false;
        }
        let Some(prev) = self.stack.back_mut().and_then(|g| g.records.last_mut()) else {
            return false;
        };

        match origin {
            EditOrigin::Typing => {
                if record.offset != prev.caret_after()
                    || ends_line(&prev.inserted)
                    || breaks_inside(&record.inserted)
                {
                    return false;
                }
                prev.inserted.push_str(&record.inserted);
                prev.inserted_len += record.inserted_len;
            }
            EditOrigin::Erase => {
                if record.offset + record.removed_len == prev.offset {
                    // backspace
                    prev.removed.insert_str(0, &record.removed);
                    prev.offset = record.offset;
                } else if record.offset == prev.offset {
                    // forward delete
                    prev.removed.push_str(&record.removed);
                } else {
                    return false;
                }
                prev.removed_len += record.removed_len;
            }
            EditOrigin::Block => return false,
        }

        burst.last_edit_at = now;
        burst.chars += burst_len(record);
        trace!(?origin, chars = burst.chars, "coalesced edit into burst");
        true
    }

    /// End the current typing/erase burst; the next edit starts a new group.
    pub fn break_burst(&mut self) {
        self.burst = None;
    }

    /// Start a new edit group (for explicit transaction boundaries). Calls nest.
    pub fn begin_group(&mut self) {
        if self.depth == 0 {
            self.burst = None;
        }
        self.depth += 1;
    }

    /// Close one level of grouping; the outermost commits the group.
    pub fn end_group(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.commit_group();
        }
    }

    fn commit_group(&mut self) {
        if self.current_group.is_empty() {
            return;
        }
        let group = EditGroup::new(std::mem::take(&mut self.current_group));
        self.stack.push_back(group);
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        while self.stack.len() > self.max_size {
            self.stack.pop_front();
        }
    }

    /// Undo the last edit group; returns the caret offset to restore.
    pub fn undo(&mut self, target: &mut impl EditTarget) -> Result<usize> {
        // An open transaction is closed before undoing
        self.depth = 0;
        self.commit_group();
        self.burst = None;

        let group = self.stack.pop_back().ok_or(Error::NothingToUndo)?;
        let caret = group.apply_reverse(target)?;
        trace!(edits = group.records.len(), caret, "undo");
        self.redo_stack.push(group);
        Ok(caret)
    }

    /// Redo the last undone edit group; returns the caret offset to restore.
    pub fn redo(&mut self, target: &mut impl EditTarget) -> Result<usize> {
        self.burst = None;

        let group = self.redo_stack.pop().ok_or(Error::NothingToRedo)?;
        let caret = group.apply(target)?;
        trace!(edits = group.records.len(), caret, "redo");
        self.stack.push_back(group);
        Ok(caret)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.stack.is_empty() || !self.current_group.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get the number of undo levels available
    pub fn undo_count(&self) -> usize {
        self.stack.len() + usize::from(!self.current_group.is_empty())
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn in_group(&self) -> bool {
        self.depth > 0
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
