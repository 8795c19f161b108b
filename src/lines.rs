use std::ops::Range;
use std::sync::Arc;

use crate::buffer::ContentBuffer;
use crate::table::PieceTable;

/// Sorted char offsets of every line start; `starts[0] == 0`.
///
/// `\n`, `\r` and `\r\n` each end a line, so a document with `n` terminators
/// has `n + 1` lines. The vector is shared with snapshots and copied only when
/// an edit touches it while a snapshot is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    starts: Arc<Vec<usize>>,
}

impl Default for LineIndex {
    fn default() -> Self {
        Self {
            starts: Arc::new(vec![0]),
        }
    }
}

impl LineIndex {
    /// Index for freshly loaded text, reusing the starts the buffer collected
    /// while it was filled.
    pub fn from_buffer(buffer: &ContentBuffer) -> Self {
        let mut starts = Vec::with_capacity(buffer.line_starts().len() + 1);
        starts.push(0);
        starts.extend_from_slice(buffer.line_starts());
        Self {
            starts: Arc::new(starts),
        }
    }

    /// Full rescan of a table.
    pub fn build(table: &PieceTable) -> Self {
        let mut starts = vec![0];
        scan(table, 0, table.len(), &mut starts);
        Self {
            starts: Arc::new(starts),
        }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.starts.get(line).copied()
    }

    /// Line containing `offset`. An offset just past a terminator belongs to
    /// the next line.
    pub fn line_of_offset(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset) - 1
    }

    /// Char range of a line including its terminator.
    pub fn line_range(&self, line: usize, doc_len: usize) -> Option<Range<usize>> {
        let start = self.line_start(line)?;
        let end = self.line_start(line + 1).unwrap_or(doc_len);
        Some(start..end)
    }

    /// Bring the index in line with `table` after `removed` chars at `start`
    /// were replaced by `inserted` chars.
    ///
    /// Starts in the window around the edit are rescanned from the new text,
    /// one char on either side so that a `\r\n` joined or split at an edge is
    /// seen. Starts past the window only shift.
    pub fn update(&mut self, table: &PieceTable, start: usize, removed: usize, inserted: usize) {
        let new_len = table.len();
        let old_len = new_len + removed - inserted;
        let window_start = start.saturating_sub(1);
        let old_end = (start + removed + 1).min(old_len);
        let new_end = (start + inserted + 1).min(new_len);

        let mut fresh = Vec::new();
        scan(table, window_start, new_end, &mut fresh);

        let starts = Arc::make_mut(&mut self.starts);
        let lo = starts.partition_point(|&s| s <= window_start);
        let hi = starts.partition_point(|&s| s <= old_end);
        let shifted = lo + fresh.len();
        starts.splice(lo..hi, fresh);
        for s in &mut starts[shifted..] {
            *s = *s + inserted - removed;
        }
    }
}

/// Push the start following every terminator that begins in `[from, to)`.
/// A `\r` at `to - 1` is resolved by peeking one char further.
fn scan(table: &PieceTable, from: usize, to: usize, out: &mut Vec<usize>) {
    if from >= to {
        return;
    }
    let mut chars = table.chars_from(from).take(to - from + 1).peekable();
    for pos in from..to {
        let Some(ch) = chars.next() else {
            break;
        };
        match ch {
            '\n' => out.push(pos + 1),
            '\r' if chars.peek() != Some(&'\n') => out.push(pos + 1),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn setup(text: &str) -> (PieceTable, LineIndex) {
        let buffer = ContentBuffer::from_text(text).unwrap();
        let index = LineIndex::from_buffer(&buffer);
        let table = PieceTable::new(Arc::new(buffer), &EngineConfig::default());
        (table, index)
    }

    fn insert(table: &mut PieceTable, index: &mut LineIndex, at: usize, text: &str) {
        table.insert(at, text).unwrap();
        index.update(table, at, 0, text.chars().count());
        assert_eq!(*index, LineIndex::build(table), "after insert {text:?} at {at}");
    }

    fn delete(table: &mut PieceTable, index: &mut LineIndex, at: usize, len: usize) {
        table.delete(at, len).unwrap();
        index.update(table, at, len, 0);
        assert_eq!(*index, LineIndex::build(table), "after delete {len} at {at}");
    }

    #[test]
    fn test_lines_of_simple_text() {
        let (_, index) = setup("ab\ncd\n");
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.starts(), &[0, 3, 6]);
        assert_eq!(index.line_of_offset(2), 0);
        assert_eq!(index.line_of_offset(3), 1);
        assert_eq!(index.line_of_offset(6), 2);
        assert_eq!(index.line_range(1, 6), Some(3..6));
        assert_eq!(index.line_range(2, 6), Some(6..6));
        assert_eq!(index.line_range(3, 6), None);
    }

    #[test]
    fn test_mixed_terminators() {
        let (table, index) = setup("a\r\nb\rc\nd");
        assert_eq!(index.starts(), &[0, 3, 5, 7]);
        assert_eq!(index, LineIndex::build(&table));
    }

    #[test]
    fn test_empty_document_has_one_line() {
        let (table, index) = setup("");
        assert_eq!(index.line_count(), 1);
        assert_eq!(LineIndex::build(&table), index);
    }

    #[test]
    fn test_insert_joins_crlf() {
        let (mut table, mut index) = setup("a\rb");
        assert_eq!(index.starts(), &[0, 2]);
        insert(&mut table, &mut index, 2, "\n");
        assert_eq!(index.starts(), &[0, 3]);
    }

    #[test]
    fn test_insert_splits_crlf() {
        let (mut table, mut index) = setup("a\r\nb");
        insert(&mut table, &mut index, 2, "x");
        assert_eq!(index.starts(), &[0, 2, 4]);
    }

    #[test]
    fn test_delete_joins_and_splits_crlf() {
        let (mut table, mut index) = setup("a\rX\nb\r\nc");
        delete(&mut table, &mut index, 2, 1);
        assert_eq!(index.starts(), &[0, 3, 6]);
        // remove the '\r' of the CRLF that was just formed
        delete(&mut table, &mut index, 1, 1);
        assert_eq!(index.starts(), &[0, 2, 5]);
        delete(&mut table, &mut index, 3, 1);
        assert_eq!(table.text(), "a\nb\nc");
        assert_eq!(index.starts(), &[0, 2, 4]);
    }

    #[test]
    fn test_edits_far_from_lines_only_shift() {
        let (mut table, mut index) = setup("one\ntwo\nthree\n");
        insert(&mut table, &mut index, 0, "zero\n");
        assert_eq!(index.starts(), &[0, 5, 9, 13, 19]);
        insert(&mut table, &mut index, 10, "xx\r\nyy");
        delete(&mut table, &mut index, 0, 12);
        let len = table.len();
        delete(&mut table, &mut index, 0, len);
        assert_eq!(index.line_count(), 1);
    }

    #[test]
    fn test_trailing_cr_at_end_of_document() {
        let (mut table, mut index) = setup("ab");
        insert(&mut table, &mut index, 2, "\r");
        assert_eq!(index.starts(), &[0, 3]);
        insert(&mut table, &mut index, 3, "\n");
        assert_eq!(index.starts(), &[0, 4]);
    }

    #[test]
    fn test_update_leaves_snapshot_index_alone() {
        let (mut table, mut index) = setup("a\nb\n");
        let snapshot = index.clone();
        insert(&mut table, &mut index, 0, "\n");
        assert_eq!(snapshot.starts(), &[0, 2, 4]);
        assert_eq!(index.starts(), &[0, 1, 3, 5]);
    }
}
