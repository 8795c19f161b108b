//! Literal and regex search over a piece table.
//!
//! A search never materializes the whole document. It walks blocks of
//! `search_block_lines` lines, reading each block (plus a short overlap so
//! matches can run past the block end) into a scratch string, and checks the
//! cancellation flag between blocks.

pub mod worker;

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};
use crate::lines::LineIndex;
use crate::table::PieceTable;

/// Chars a regex match may run past the end of its block
const REGEX_OVERLAP: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Continue from the other end of the document when nothing is found
    pub wrap: bool,
    pub direction: Direction,
    /// Treat the pattern as a regular expression instead of literal text
    pub regex: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            wrap: false,
            direction: Direction::Forward,
            regex: false,
        }
    }
}

impl SearchOptions {
    pub fn backward(mut self) -> Self {
        self.direction = Direction::Backward;
        self
    }

    pub fn wrapping(mut self) -> Self {
        self.wrap = true;
        self
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn regex(mut self) -> Self {
        self.regex = true;
        self
    }
}

/// A compiled search pattern.
#[derive(Debug, Clone)]
pub struct Query {
    regex: Regex,
    /// Expand `$n` capture references in replacements
    expand: bool,
    overlap: usize,
    empty: bool,
}

impl Query {
    pub fn new(pattern: &str, options: &SearchOptions) -> Result<Self> {
        let (source, overlap) = if options.regex {
            (pattern.to_string(), REGEX_OVERLAP)
        } else {
            (regex::escape(pattern), pattern.chars().count().saturating_sub(1))
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.case_sensitive)
            .multi_line(true)
            .build()?;
        Ok(Self {
            regex,
            expand: options.regex,
            overlap,
            empty: pattern.is_empty(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

/// A match and, when replacing, the text that goes in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub range: Range<usize>,
    pub text: String,
}

/// Tracks the char count of a growing byte prefix of one string.
struct CharCursor {
    byte: usize,
    chars: usize,
}

impl CharCursor {
    /// Start `chars` chars into `text`.
    fn at_char(text: &str, chars: usize) -> Self {
        let byte = text.char_indices().nth(chars).map_or(text.len(), |(b, _)| b);
        Self { byte, chars }
    }

    /// Char offset of `byte`; calls must not go backwards.
    fn chars_to(&mut self, text: &str, byte: usize) -> usize {
        self.chars += text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

/// Runs one query against one document state.
pub struct Searcher<'a> {
    table: &'a PieceTable,
    lines: &'a LineIndex,
    query: &'a Query,
    block_lines: usize,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Searcher<'a> {
    pub fn new(table: &'a PieceTable, lines: &'a LineIndex, query: &'a Query, block_lines: usize) -> Self {
        Self {
            table,
            lines,
            query,
            block_lines: block_lines.max(1),
            cancel: None,
        }
    }

    /// Abort with `Error::Cancelled` once `flag` is set.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check_cancel(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Match nearest to `from` in the given direction.
    ///
    /// Forward returns the first match starting at or after `from`; backward
    /// returns the last match starting before it, overlaps included.
    pub fn find(&self, from: usize, direction: Direction, wrap: bool) -> Result<Option<Range<usize>>> {
        if self.query.is_empty() {
            return Ok(None);
        }
        let len = self.table.len();
        let from = from.min(len);
        let found = match direction {
            Direction::Forward => match self.find_first(from, len)? {
                None if wrap => self.find_first(0, from)?,
                found => found,
            },
            Direction::Backward => match self.find_last(0, from)? {
                None if wrap => self.find_last(from, len)?,
                found => found,
            },
        };
        Ok(found)
    }

    /// Every non-overlapping match in document order.
    pub fn find_all(&self) -> Result<Vec<Range<usize>>> {
        self.find_all_with(|_| {})
    }

    /// Like [`Searcher::find_all`], reporting the offset scanned so far after
    /// each block.
    pub fn find_all_with(&self, progress: impl FnMut(usize)) -> Result<Vec<Range<usize>>> {
        let found = self.collect_all(None, progress)?;
        Ok(found.into_iter().map(|r| r.range).collect())
    }

    /// Every match paired with its replacement text. Regex queries expand
    /// `$name` / `$n` references against the match's captures.
    pub fn replacements(&self, template: &str) -> Result<Vec<Replacement>> {
        self.collect_all(Some(template), |_| {})
    }

    fn collect_all(&self, template: Option<&str>, mut progress: impl FnMut(usize)) -> Result<Vec<Replacement>> {
        let mut found = Vec::new();
        if self.query.is_empty() {
            return Ok(found);
        }
        let len = self.table.len();
        let mut pos = 0;
        let mut last_end = 0;
        while pos < len {
            self.check_cancel()?;
            let block_end = self.block_end(pos);
            if last_end < block_end {
                let from = pos.max(last_end);
                for m in self.block_matches(from, block_end, false, template)? {
                    last_end = m.range.end;
                    found.push(m);
                }
            }
            pos = block_end;
            progress(pos);
        }
        Ok(found)
    }

    fn find_first(&self, lo: usize, hi: usize) -> Result<Option<Range<usize>>> {
        let mut pos = lo;
        while pos < hi {
            self.check_cancel()?;
            let block_end = self.block_end(pos).min(hi);
            let mut found = self.block_matches(pos, block_end, false, None)?;
            if !found.is_empty() {
                return Ok(Some(found.swap_remove(0).range));
            }
            pos = block_end;
        }
        Ok(None)
    }

    fn find_last(&self, lo: usize, hi: usize) -> Result<Option<Range<usize>>> {
        let mut end = hi;
        while end > lo {
            self.check_cancel()?;
            let block_start = self.block_start(end).max(lo);
            if let Some(m) = self.block_matches(block_start, end, true, None)?.pop() {
                return Ok(Some(m.range));
            }
            end = block_start;
        }
        Ok(None)
    }

    /// End of the block that begins at `pos`
    fn block_end(&self, pos: usize) -> usize {
        let line = self.lines.line_of_offset(pos);
        self.lines
            .line_start(line + self.block_lines)
            .unwrap_or(self.table.len())
    }

    /// Start of the block that ends at `end`
    fn block_start(&self, end: usize) -> usize {
        let last_line = self.lines.line_of_offset(end - 1);
        let first_line = last_line.saturating_sub(self.block_lines - 1);
        self.lines.line_start(first_line).unwrap_or(0)
    }

    /// Matches starting in `[from, block_end)`.
    ///
    /// The text read begins at the start of `from`'s line so anchors and word
    /// boundaries see real context, and runs `overlap` chars past the block.
    fn block_matches(
        &self,
        from: usize,
        block_end: usize,
        overlapping: bool,
        template: Option<&str>,
    ) -> Result<Vec<Replacement>> {
        let context = self
            .lines
            .line_start(self.lines.line_of_offset(from))
            .unwrap_or(0);
        let window_end = (block_end + self.query.overlap).min(self.table.len());
        let text = self.table.text_in_range(context, window_end)?;
        let regex = &self.query.regex;

        let mut cursor = CharCursor::at_char(&text, from - context);
        let mut at = cursor.byte;
        let mut found = Vec::new();
        while at <= text.len() {
            let Some(m) = regex.find_at(&text, at) else {
                break;
            };
            let start = context + cursor.chars_to(&text, m.start());
            if start >= block_end {
                break;
            }
            let next = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
            if m.is_empty() {
                at = next;
                continue;
            }

            let replacement = match template {
                Some(template) if self.query.expand => {
                    let mut out = String::new();
                    if let Some(caps) = regex.captures_at(&text, m.start()) {
                        caps.expand(template, &mut out);
                    }
                    out
                }
                Some(template) => template.to_string(),
                None => String::new(),
            };
            found.push(Replacement {
                range: start..start + m.as_str().chars().count(),
                text: replacement,
            });
            at = if overlapping { next } else { m.end() };
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    struct Fixture {
        table: PieceTable,
        lines: LineIndex,
    }

    impl Fixture {
        fn new(text: &str) -> Self {
            let table = PieceTable::from_text(text, &EngineConfig::default()).unwrap();
            let lines = LineIndex::build(&table);
            Self { table, lines }
        }

        fn find(&self, pattern: &str, from: usize, options: SearchOptions) -> Option<Range<usize>> {
            self.find_blocks(pattern, from, options, 1024)
        }

        fn find_blocks(
            &self,
            pattern: &str,
            from: usize,
            options: SearchOptions,
            block_lines: usize,
        ) -> Option<Range<usize>> {
            let query = Query::new(pattern, &options).unwrap();
            Searcher::new(&self.table, &self.lines, &query, block_lines)
                .find(from, options.direction, options.wrap)
                .unwrap()
        }

        fn find_all(&self, pattern: &str, options: SearchOptions, block_lines: usize) -> Vec<Range<usize>> {
            let query = Query::new(pattern, &options).unwrap();
            Searcher::new(&self.table, &self.lines, &query, block_lines)
                .find_all()
                .unwrap()
        }
    }

    #[test]
    fn test_forward_and_backward() {
        let f = Fixture::new("one two one two");
        let opts = SearchOptions::default();
        assert_eq!(f.find("two", 0, opts), Some(4..7));
        assert_eq!(f.find("two", 5, opts), Some(12..15));
        assert_eq!(f.find("two", 13, opts), None);
        assert_eq!(f.find("one", 8, opts.backward()), Some(0..3));
        assert_eq!(f.find("one", 9, opts.backward()), Some(8..11));
    }

    #[test]
    fn test_wrap_around() {
        let f = Fixture::new("alpha beta alpha");
        let opts = SearchOptions::default().wrapping();
        assert_eq!(f.find("beta", 7, opts), Some(6..10));
        assert_eq!(f.find("alpha", 12, opts.backward()), Some(11..16));
        assert_eq!(f.find("gamma", 3, opts), None);
    }

    #[test]
    fn test_backward_finds_overlapping_start() {
        let f = Fixture::new("aaaa");
        assert_eq!(f.find("aa", 4, SearchOptions::default().backward()), Some(2..4));
        assert_eq!(f.find("aa", 2, SearchOptions::default().backward()), Some(1..3));
    }

    #[test]
    fn test_case_insensitive_and_multibyte_offsets() {
        let f = Fixture::new("Ünïcode ÜNÏCODE");
        let opts = SearchOptions::default().ignore_case();
        assert_eq!(f.find("ünïcode", 1, opts), Some(8..15));
        assert_eq!(f.find("ünïcode", 1, SearchOptions::default()), None);
    }

    #[test]
    fn test_literal_metacharacters_are_escaped() {
        let f = Fixture::new("a.b axb (c)");
        assert_eq!(f.find("x.b", 0, SearchOptions::default()), None);
        assert_eq!(f.find("(c)", 0, SearchOptions::default()), Some(8..11));
    }

    #[test]
    fn test_regex_anchor_sees_line_context() {
        let f = Fixture::new("foo bar\nbar foo\n");
        let opts = SearchOptions::default().regex();
        // starting mid-line must not make "^bar" match at the offset
        assert_eq!(f.find("^bar", 4, opts), Some(8..11));
        assert_eq!(f.find(r"foo$", 0, opts), Some(12..15));
    }

    #[test]
    fn test_match_spanning_block_boundary() {
        let text = "x\n".repeat(10) + "needle\nin\nhay";
        let f = Fixture::new(&text);
        let opts = SearchOptions::default();
        assert_eq!(f.find_blocks("needle\nin", 0, opts, 1), Some(20..29));
        assert_eq!(f.find_blocks("le\nin\nh", 0, opts.backward(), 2), Some(24..31));
        assert_eq!(f.find_all("x\nx", opts, 1), vec![0..3, 4..7, 8..11, 12..15, 16..19]);
    }

    #[test]
    fn test_find_all_non_overlapping() {
        let f = Fixture::new("aaaaa");
        assert_eq!(f.find_all("aa", SearchOptions::default(), 1024), vec![0..2, 2..4]);
        assert!(f.find_all("", SearchOptions::default(), 1024).is_empty());
    }

    #[test]
    fn test_empty_regex_matches_are_skipped() {
        let f = Fixture::new("ab");
        assert_eq!(f.find_all("x*", SearchOptions::default().regex(), 1024), Vec::<Range<usize>>::new());
    }

    #[test]
    fn test_regex_replacements_expand_captures() {
        let f = Fixture::new("k1=v1, k2=v2");
        let query = Query::new(r"(\w+)=(\w+)", &SearchOptions::default().regex()).unwrap();
        let plan = Searcher::new(&f.table, &f.lines, &query, 1024)
            .replacements("$2=$1")
            .unwrap();
        assert_eq!(plan[0], Replacement { range: 0..5, text: "v1=k1".to_string() });
        assert_eq!(plan[1].text, "v2=k2");
    }

    #[test]
    fn test_invalid_regex() {
        let err = Query::new("(", &SearchOptions::default().regex()).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern(_)));
    }

    #[test]
    fn test_cancelled_search() {
        let f = Fixture::new("abc\ndef\n");
        let query = Query::new("def", &SearchOptions::default()).unwrap();
        let flag = AtomicBool::new(true);
        let result = Searcher::new(&f.table, &f.lines, &query, 1)
            .with_cancel(&flag)
            .find_all();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
