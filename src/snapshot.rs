use std::ops::Range;

use crate::config::EngineConfig;
use crate::edit::EditTarget;
use crate::error::Result;
use crate::lines::LineIndex;
use crate::query::{Query, SearchOptions, Searcher};
use crate::table::{Chunks, PieceTable};

/// Immutable view of a document at one point in its history.
///
/// Taking a snapshot is O(1) in document size: the piece tree, the buffer
/// pages and the line index are all shared with the live document, which
/// copies only what it touches afterwards. Snapshots are `Send + Sync` and
/// can be read from any thread.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) table: PieceTable,
    pub(crate) lines: LineIndex,
    search_block_lines: usize,
}

impl Snapshot {
    pub(crate) fn new(table: PieceTable, lines: LineIndex, config: &EngineConfig) -> Self {
        Self {
            table,
            lines,
            search_block_lines: config.search_block_lines,
        }
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.table.char_at(offset)
    }

    pub fn text_in_range(&self, start: usize, end: usize) -> Result<String> {
        self.table.text_in_range(start, end)
    }

    pub fn text(&self) -> String {
        self.table.text()
    }

    /// Borrowed text runs of the whole document
    pub fn chunks(&self) -> Chunks<'_> {
        self.table.chunks(0, self.len())
    }

    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.table.chars_from(0)
    }

    pub fn line_count(&self) -> usize {
        self.lines.line_count()
    }

    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.lines.line_start(line)
    }

    /// Line containing `offset`; offsets past the end map to the last line.
    pub fn line_of_offset(&self, offset: usize) -> usize {
        self.lines.line_of_offset(offset.min(self.len()))
    }

    /// Char range of `line`, terminator included
    pub fn line_range(&self, line: usize) -> Option<Range<usize>> {
        self.lines.line_range(line, self.len())
    }

    /// Text of `line`, terminator included
    pub fn line_text(&self, line: usize) -> Option<String> {
        let range = self.line_range(line)?;
        Some(self.table.chunks(range.start, range.end).collect())
    }

    pub fn piece_count(&self) -> usize {
        self.table.piece_count()
    }

    fn searcher<'a>(&'a self, query: &'a Query) -> Searcher<'a> {
        Searcher::new(&self.table, &self.lines, query, self.search_block_lines)
    }

    /// Start of the nearest match, see [`Snapshot::find`].
    pub fn search(&self, pattern: &str, from: usize, options: &SearchOptions) -> Result<Option<usize>> {
        Ok(self.find(pattern, from, options)?.map(|range| range.start))
    }

    /// Nearest match from `from` in `options.direction`, wrapping if asked.
    pub fn find(&self, pattern: &str, from: usize, options: &SearchOptions) -> Result<Option<Range<usize>>> {
        let query = Query::new(pattern, options)?;
        self.searcher(&query).find(from, options.direction, options.wrap)
    }

    /// Every non-overlapping match in document order
    pub fn find_all(&self, pattern: &str, options: &SearchOptions) -> Result<Vec<Range<usize>>> {
        let query = Query::new(pattern, options)?;
        self.searcher(&query).find_all()
    }

    pub(crate) fn search_block_lines(&self) -> usize {
        self.search_block_lines
    }

    /// Full structural check against the line index. Panics on violation.
    pub fn check_invariants(&self) {
        let terminators = self.table.check_invariants();
        assert_eq!(
            terminators + 1,
            self.lines.line_count(),
            "line index disagrees with piece line data"
        );
        assert_eq!(self.lines.starts().first(), Some(&0));
        assert!(
            self.lines.starts().windows(2).all(|w| w[0] < w[1]),
            "line starts not strictly increasing"
        );
        assert!(self.lines.starts().last().map_or(true, |&s| s <= self.len()));
    }
}

impl EditTarget for Snapshot {
    fn replace(&mut self, offset: usize, remove: usize, insert: &str) -> Result<String> {
        self.table.check_range(offset, offset.saturating_add(remove))?;
        let removed = self.table.delete(offset, remove)?;
        self.table.insert(offset, insert)?;
        self.lines
            .update(&self.table, offset, remove, insert.chars().count());
        Ok(removed)
    }
}
