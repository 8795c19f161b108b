use std::io::{ErrorKind, Read, Write};
use std::ops::Range;

use tracing::{debug, warn};

use crate::buffer::OriginalBuilder;
use crate::codec::{self, Charset, Decoder, Encoder, Encoding, LineEnding, LoadReport};
use crate::config::EngineConfig;
use crate::edit::{EditOrigin, EditRecord, EditTarget, UndoStack};
use crate::error::Result;
use crate::lines::LineIndex;
use crate::query::{Query, SearchOptions, Searcher};
use crate::snapshot::Snapshot;
use crate::table::PieceTable;

/// Bytes the encoding sniffer wants to see before deciding
const SNIFF_BYTES: usize = 512;

/// How to read a byte stream into a document.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Force a charset instead of sniffing one
    pub charset: Option<Charset>,
    /// Fail on malformed input instead of substituting U+FFFD
    pub strict: bool,
    pub config: EngineConfig,
}

/// How to write a document back out. `None` keeps what was detected on load.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    pub charset: Option<Charset>,
    pub bom: Option<bool>,
    /// Rewrite every terminator to this style; `None` writes them verbatim
    pub line_ending: Option<LineEnding>,
}

/// One open text document: content, line index, undo history and the
/// encoding it was loaded with.
///
/// All mutation goes through `&mut self`. Readers on other threads work on a
/// [`Snapshot`] taken with [`Document::snapshot`].
#[derive(Debug, Clone)]
pub struct Document {
    state: Snapshot,
    undo: UndoStack,
    dirty: bool,
    encoding: Encoding,
    line_ending: LineEnding,
    report: LoadReport,
    config: EngineConfig,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// An empty document
    pub fn with_config(config: EngineConfig) -> Self {
        let table = PieceTable::new(OriginalBuilder::new().finish(), &config);
        Self::from_parts(table, LineIndex::default(), LoadReport::default(), LineEnding::default(), config)
    }

    /// A clean document whose original buffer holds `text`.
    pub fn from_text(text: &str) -> Result<Self> {
        Self::from_text_with(text, EngineConfig::default())
    }

    pub fn from_text_with(text: &str, config: EngineConfig) -> Result<Self> {
        let mut builder = OriginalBuilder::new();
        builder.push_str(text)?;
        let original = builder.finish();
        let report = LoadReport {
            bytes_read: text.len() as u64,
            ..LoadReport::default()
        };
        let lines = LineIndex::from_buffer(&original);
        let line_ending = LineEnding::dominant(original.terminator_stats());
        let table = PieceTable::new(original, &config);
        Ok(Self::from_parts(table, lines, report, line_ending, config))
    }

    fn from_parts(
        table: PieceTable,
        lines: LineIndex,
        report: LoadReport,
        line_ending: LineEnding,
        config: EngineConfig,
    ) -> Self {
        Self {
            state: Snapshot::new(table, lines, &config),
            undo: UndoStack::new(&config),
            dirty: false,
            encoding: report.encoding,
            line_ending,
            report,
            config,
        }
    }

    /// Decode a byte stream chunk by chunk into a new document.
    ///
    /// Malformed input is replaced by U+FFFD and recorded in the load report,
    /// unless `options.strict` is set, in which case it fails with
    /// [`Error::Decode`](crate::Error::Decode).
    pub fn open<R: Read>(mut reader: R, options: &OpenOptions) -> Result<Self> {
        let config = options.config.clone();
        let mut buf = vec![0u8; config.read_chunk_bytes.max(SNIFF_BYTES)];

        let mut head = 0;
        while head < SNIFF_BYTES {
            let n = read_some(&mut reader, &mut buf[head..])?;
            if n == 0 {
                break;
            }
            head += n;
        }

        let (encoding, skip) = match options.charset {
            Some(charset) => {
                let bom = buf[..head].starts_with(charset.bom());
                let skip = if bom { charset.bom().len() } else { 0 };
                (Encoding::new(charset, bom), skip)
            }
            None => codec::sniff(&buf[..head], head < SNIFF_BYTES),
        };

        let mut decoder = Decoder::new(encoding, options.strict);
        let mut builder = OriginalBuilder::new();
        let mut text = String::new();
        decoder.decode(&buf[skip..head], &mut text)?;
        builder.push_str(&text)?;
        loop {
            let n = read_some(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            text.clear();
            decoder.decode(&buf[..n], &mut text)?;
            builder.push_str(&text)?;
        }
        text.clear();
        let report = decoder.finish(&mut text)?;
        builder.push_str(&text)?;

        if report.is_lossy() {
            warn!(
                charset = %encoding.charset,
                replaced = report.replaced,
                first_malformed = ?report.first_malformed,
                "lossy load: malformed input replaced"
            );
        }
        let original = builder.finish();
        debug!(
            bytes = report.bytes_read,
            chars = original.len(),
            charset = %encoding.charset,
            bom = encoding.bom,
            "loaded document"
        );

        let lines = LineIndex::from_buffer(&original);
        let line_ending = LineEnding::dominant(original.terminator_stats());
        let table = PieceTable::new(original, &config);
        Ok(Self::from_parts(table, lines, report, line_ending, config))
    }

    /// Re-encode the document into `writer`.
    pub fn write<W: Write>(&self, writer: W, options: &SaveOptions) -> Result<()> {
        let encoding = Encoding::new(
            options.charset.unwrap_or(self.encoding.charset),
            options.bom.unwrap_or(self.encoding.bom),
        );
        let mut encoder = Encoder::new(writer, encoding, options.line_ending)?;
        for chunk in self.state.chunks() {
            encoder.write_str(chunk)?;
        }
        encoder.finish()?;
        debug!(
            chars = self.len(),
            charset = %encoding.charset,
            line_ending = ?options.line_ending,
            "wrote document"
        );
        Ok(())
    }

    fn apply(&mut self, offset: usize, remove: usize, insert: &str, origin: EditOrigin) -> Result<String> {
        if remove == 0 && insert.is_empty() {
            self.state.table.check_range(offset, offset)?;
            return Ok(String::new());
        }
        let removed = self.state.replace(offset, remove, insert)?;
        self.undo
            .record(EditRecord::new(offset, removed.clone(), insert.to_string()), origin);
        self.dirty = true;
        Ok(removed)
    }

    /// Insert typed text. Adjacent inserts in quick succession undo together.
    pub fn insert(&mut self, offset: usize, text: &str) -> Result<()> {
        self.apply(offset, 0, text, EditOrigin::Typing).map(|_| ())
    }

    /// Insert pasted or generated text as its own undo unit.
    pub fn insert_block(&mut self, offset: usize, text: &str) -> Result<()> {
        self.apply(offset, 0, text, EditOrigin::Block).map(|_| ())
    }

    /// Remove `len` chars at `offset` and return them. Single-char deletes
    /// coalesce like backspace or forward delete.
    pub fn delete(&mut self, offset: usize, len: usize) -> Result<String> {
        let origin = if len == 1 {
            EditOrigin::Erase
        } else {
            EditOrigin::Block
        };
        self.apply(offset, len, "", origin)
    }

    /// Replace `len` chars at `offset` with `text` as one undo unit.
    pub fn replace(&mut self, offset: usize, len: usize, text: &str) -> Result<String> {
        self.undo.break_burst();
        self.apply(offset, len, text, EditOrigin::Block)
    }

    /// Replace every match of `pattern`; returns the number replaced.
    ///
    /// All replacements form a single undo unit. With `options.regex`,
    /// `$1` / `$name` in `replacement` refer to the match's capture groups.
    pub fn replace_all(&mut self, pattern: &str, replacement: &str, options: &SearchOptions) -> Result<usize> {
        let query = Query::new(pattern, options)?;
        let plan = Searcher::new(
            &self.state.table,
            &self.state.lines,
            &query,
            self.config.search_block_lines,
        )
        .replacements(replacement)?;
        if plan.is_empty() {
            return Ok(0);
        }

        self.begin_group();
        // Last to first keeps the earlier ranges valid
        let result = plan
            .iter()
            .rev()
            .try_for_each(|r| self.apply(r.range.start, r.range.len(), &r.text, EditOrigin::Block).map(|_| ()));
        self.end_group();
        result?;

        debug!(pattern, count = plan.len(), "replaced all matches");
        Ok(plan.len())
    }

    /// Revert the last undo unit; returns the caret offset for the view.
    pub fn undo(&mut self) -> Result<usize> {
        let caret = self.undo.undo(&mut self.state)?;
        self.dirty = true;
        Ok(caret)
    }

    /// Re-apply the last undone unit; returns the caret offset for the view.
    pub fn redo(&mut self) -> Result<usize> {
        let caret = self.undo.redo(&mut self.state)?;
        self.dirty = true;
        Ok(caret)
    }

    /// Caret moved: the next edit starts a new undo unit.
    pub fn break_coalescing(&mut self) {
        self.undo.break_burst();
    }

    pub fn begin_group(&mut self) {
        self.undo.begin_group();
    }

    pub fn end_group(&mut self) {
        self.undo.end_group();
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// O(1) immutable view of the current state
    pub fn snapshot(&self) -> Snapshot {
        self.state.clone()
    }

    /// Read access to the current state without cloning
    pub fn view(&self) -> &Snapshot {
        &self.state
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Dominant terminator style detected on load
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.state.char_at(offset)
    }

    pub fn text_in_range(&self, start: usize, end: usize) -> Result<String> {
        self.state.text_in_range(start, end)
    }

    pub fn text(&self) -> String {
        self.state.text()
    }

    pub fn line_count(&self) -> usize {
        self.state.line_count()
    }

    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.state.line_start(line)
    }

    pub fn line_of_offset(&self, offset: usize) -> usize {
        self.state.line_of_offset(offset)
    }

    pub fn line_text(&self, line: usize) -> Option<String> {
        self.state.line_text(line)
    }

    pub fn search(&self, pattern: &str, from: usize, options: &SearchOptions) -> Result<Option<usize>> {
        self.state.search(pattern, from, options)
    }

    pub fn find(&self, pattern: &str, from: usize, options: &SearchOptions) -> Result<Option<Range<usize>>> {
        self.state.find(pattern, from, options)
    }

    pub fn find_all(&self, pattern: &str, options: &SearchOptions) -> Result<Vec<Range<usize>>> {
        self.state.find_all(pattern, options)
    }

    /// Full structural check of table and line index. Panics on violation.
    pub fn check_invariants(&self) {
        self.state.check_invariants();
    }
}

/// `read` that retries on `Interrupted`
fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            result => return Ok(result?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_insert_delete_and_dirty_state() {
        let mut doc = Document::from_text("hello").unwrap();
        assert!(!doc.is_dirty());

        doc.insert(5, " world").unwrap();
        assert_eq!(doc.text(), "hello world");
        assert!(doc.is_dirty());

        doc.mark_saved();
        assert_eq!(doc.delete(5, 6).unwrap(), " world");
        assert!(doc.is_dirty());
        doc.mark_saved();
        doc.undo().unwrap();
        assert!(doc.is_dirty());
        doc.check_invariants();
    }

    #[test]
    fn test_zero_length_edits_are_noops() {
        let mut doc = Document::from_text("abc").unwrap();
        assert_eq!(doc.delete(0, 0).unwrap(), "");
        doc.insert(3, "").unwrap();
        assert!(!doc.is_dirty());
        assert!(!doc.can_undo());
        assert!(matches!(doc.delete(4, 0), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_replace_is_one_unit() {
        let mut doc = Document::from_text("let x = 1;").unwrap();
        doc.insert(10, " ").unwrap();
        assert_eq!(doc.replace(4, 1, "value").unwrap(), "x");
        assert_eq!(doc.text(), "let value = 1; ");

        doc.undo().unwrap();
        assert_eq!(doc.text(), "let x = 1; ");
    }

    #[test]
    fn test_replace_all_literal_and_undo() {
        let mut doc = Document::from_text("foo bar foo\nfoo").unwrap();
        let count = doc
            .replace_all("foo", "quux", &SearchOptions::default())
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(doc.text(), "quux bar quux\nquux");
        doc.check_invariants();

        doc.undo().unwrap();
        assert_eq!(doc.text(), "foo bar foo\nfoo");
        assert_eq!(doc.replace_all("zzz", "y", &SearchOptions::default()).unwrap(), 0);
    }

    #[test]
    fn test_replace_all_regex_captures() {
        let mut doc = Document::from_text("a=1\nb=2\n").unwrap();
        let options = SearchOptions::default().regex();
        doc.replace_all(r"^(\w)=(\d)$", "$2:$1", &options).unwrap();
        assert_eq!(doc.text(), "1:a\n2:b\n");
    }

    #[test]
    fn test_undo_redo_carets() {
        let mut doc = Document::new();
        doc.insert_block(0, "abc").unwrap();
        doc.delete(1, 1).unwrap();

        assert_eq!(doc.undo().unwrap(), 2);
        assert_eq!(doc.undo().unwrap(), 0);
        assert!(matches!(doc.undo(), Err(Error::NothingToUndo)));
        assert_eq!(doc.redo().unwrap(), 3);
        assert_eq!(doc.redo().unwrap(), 1);
        assert!(matches!(doc.redo(), Err(Error::NothingToRedo)));
        assert_eq!(doc.text(), "ac");
    }

    #[test]
    fn test_open_detects_encoding_and_line_ending() {
        let bytes = b"\xEF\xBB\xBFone\r\ntwo\r\n";
        let doc = Document::open(&bytes[..], &OpenOptions::default()).unwrap();
        assert_eq!(doc.encoding(), Encoding::new(Charset::Utf8, true));
        assert_eq!(doc.line_ending(), LineEnding::CrLf);
        assert_eq!(doc.text(), "one\r\ntwo\r\n");
        assert_eq!(doc.line_count(), 3);

        let mut out = Vec::new();
        doc.write(&mut out, &SaveOptions::default()).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_open_with_small_chunks() {
        let text = "αβγ\n".repeat(200);
        let options = OpenOptions {
            config: EngineConfig {
                read_chunk_bytes: 7,
                ..EngineConfig::default()
            },
            ..OpenOptions::default()
        };
        let doc = Document::open(text.as_bytes(), &options).unwrap();
        assert_eq!(doc.text(), text);
        assert_eq!(doc.line_count(), 201);
    }

    #[test]
    fn test_forced_charset() {
        let bytes: Vec<u8> = "hi".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let options = OpenOptions {
            charset: Some(Charset::Utf16Le),
            ..OpenOptions::default()
        };
        let doc = Document::open(&bytes[..], &options).unwrap();
        assert_eq!(doc.text(), "hi");
        assert_eq!(doc.encoding(), Encoding::new(Charset::Utf16Le, false));
    }

    #[test]
    fn test_snapshot_is_isolated_from_edits() {
        let mut doc = Document::from_text("abc\ndef").unwrap();
        let before = doc.snapshot();
        doc.insert(0, "xyz\n").unwrap();
        doc.delete(5, 3).unwrap();

        assert_eq!(before.text(), "abc\ndef");
        assert_eq!(before.line_count(), 2);
        assert_eq!(doc.text(), "xyz\nadef");
        before.check_invariants();
        doc.check_invariants();
    }
}
