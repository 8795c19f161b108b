mod piece;
mod tree;

use std::sync::Arc;

use tracing::debug;

pub use piece::Piece;

use crate::buffer::{BufferStore, ContentBuffer};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use tree::Link;

/// The document as an ordered sequence of pieces over a `BufferStore`.
///
/// Cloning is O(1) apart from the page list: the piece tree and every buffer
/// page are shared through `Arc`, and later edits on either copy never show
/// through to the other.
#[derive(Debug, Clone)]
pub struct PieceTable {
    store: BufferStore,
    root: Link,
    /// xorshift state for treap priorities
    seed: u32,
    defrag_threshold: usize,
    next_defrag_at: usize,
}

impl PieceTable {
    pub fn new(original: Arc<ContentBuffer>, config: &EngineConfig) -> Self {
        let len = original.len();
        let store = BufferStore::new(original, config.add_page_chars);
        let mut table = Self {
            store,
            root: None,
            seed: 0x9E37_79B9,
            defrag_threshold: config.defrag_piece_threshold.max(1),
            next_defrag_at: config.defrag_piece_threshold.max(1),
        };
        if len > 0 {
            let piece = Piece::new(&table.store, crate::buffer::BufferId::Original, 0, len);
            table.root = tree::leaf(piece, table.next_priority());
        }
        table
    }

    pub fn from_text(text: &str, config: &EngineConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(ContentBuffer::from_text(text)?), config))
    }

    fn next_priority(&mut self) -> u32 {
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;
        x
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        tree::len(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn piece_count(&self) -> usize {
        tree::count(&self.root)
    }

    pub fn store(&self) -> &BufferStore {
        &self.store
    }

    /// Pieces in document order
    pub fn pieces(&self) -> impl Iterator<Item = Piece> + '_ {
        tree::Pieces::new(&self.root, 0).map(|(piece, _)| *piece)
    }

    pub(crate) fn check_range(&self, start: usize, end: usize) -> Result<()> {
        let len = self.len();
        if start > end || end > len {
            return Err(Error::OutOfRange { start, end, len });
        }
        Ok(())
    }

    pub fn insert(&mut self, offset: usize, text: &str) -> Result<()> {
        self.check_range(offset, offset)?;
        if text.is_empty() {
            return Ok(());
        }
        let before = self.len();
        let (buffer, start, len) = self.store.append(text)?;
        let (left, right) = tree::split(&self.root, offset, &self.store);

        let left = match tree::last(&left) {
            // Typing usually lands right after the previous append
            Some(prev) if prev.buffer == buffer && prev.end() == start => {
                let grown = Piece::new(&self.store, buffer, prev.start, prev.len + len);
                tree::replace_last(&left, grown)
            }
            _ => {
                let piece = Piece::new(&self.store, buffer, start, len);
                tree::merge(left, tree::leaf(piece, self.next_priority()))
            }
        };
        self.root = tree::merge(left, right);

        debug_assert_eq!(self.len(), before + len, "insert changed length incorrectly");
        self.maybe_defragment();
        Ok(())
    }

    /// Remove `len` chars at `offset`, returning the removed text.
    pub fn delete(&mut self, offset: usize, len: usize) -> Result<String> {
        let end = offset.checked_add(len).ok_or(Error::OutOfRange {
            start: offset,
            end: usize::MAX,
            len: self.len(),
        })?;
        self.check_range(offset, end)?;
        if len == 0 {
            return Ok(String::new());
        }
        let before = self.len();
        let (left, rest) = tree::split(&self.root, offset, &self.store);
        let (middle, right) = tree::split(&rest, len, &self.store);

        let mut removed = String::new();
        for (piece, _) in tree::Pieces::new(&middle, 0) {
            removed.push_str(piece.text(&self.store));
        }
        self.root = tree::merge(left, right);

        debug_assert_eq!(self.len() + len, before, "delete changed length incorrectly");
        self.maybe_defragment();
        Ok(removed)
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        let (piece, local) = tree::locate(&self.root, offset)?;
        self.store.buffer(piece.buffer).char_at(piece.start + local)
    }

    pub fn text_in_range(&self, start: usize, end: usize) -> Result<String> {
        self.check_range(start, end)?;
        Ok(self.chunks(start, end).collect())
    }

    pub fn text(&self) -> String {
        self.chunks(0, self.len()).collect()
    }

    /// Borrowed text runs covering `[start, end)`, clamped to the document.
    pub fn chunks(&self, start: usize, end: usize) -> Chunks<'_> {
        let end = end.min(self.len());
        Chunks {
            pieces: tree::Pieces::new(&self.root, start),
            store: &self.store,
            remaining: end.saturating_sub(start),
        }
    }

    /// Chars from `offset` to the end of the document
    pub fn chars_from(&self, offset: usize) -> impl Iterator<Item = char> + '_ {
        self.chunks(offset, self.len()).flat_map(str::chars)
    }

    fn maybe_defragment(&mut self) {
        if self.piece_count() > self.next_defrag_at {
            self.defragment();
        }
    }

    /// Merge neighbouring pieces that reference contiguous buffer ranges and
    /// rebuild the tree.
    pub fn defragment(&mut self) {
        let before = self.piece_count();
        let mut merged: Vec<Piece> = Vec::with_capacity(before);
        for piece in self.pieces() {
            match merged.last_mut() {
                Some(prev) if prev.is_contiguous_with(&piece) => {
                    *prev = Piece::new(&self.store, prev.buffer, prev.start, prev.len + piece.len);
                }
                _ => merged.push(piece),
            }
        }

        let len = self.len();
        let mut root = None;
        for piece in merged {
            let priority = self.next_priority();
            root = tree::merge(root, tree::leaf(piece, priority));
        }
        self.root = root;

        let after = self.piece_count();
        self.next_defrag_at = self.defrag_threshold.max(after * 2);
        debug_assert_eq!(self.len(), len, "defragment changed length");
        debug!(before, after, next = self.next_defrag_at, "defragmented piece table");
    }

    /// Full structural check; returns the document's terminator count.
    ///
    /// Panics when a cached aggregate disagrees with the pieces or a piece's
    /// line data disagrees with its buffer.
    pub fn check_invariants(&self) -> usize {
        let (len, breaks, count) = tree::validate(&self.root);
        assert_eq!(len, self.len());
        assert_eq!(count, self.piece_count());

        let mut seams = 0;
        let mut prev_ends_cr = false;
        let mut total = 0;
        for piece in self.pieces() {
            let buffer = self.store.buffer(piece.buffer);
            assert!(piece.end() <= buffer.len(), "piece past end of its buffer");
            let (line_breaks, last_line_len) = buffer.breaks_in(piece.start, piece.end());
            assert_eq!(
                (line_breaks, last_line_len),
                (piece.line_breaks, piece.last_line_len),
                "stale line data in {piece:?}"
            );
            if prev_ends_cr && buffer.char_at(piece.start) == Some('\n') {
                seams += 1;
            }
            prev_ends_cr = buffer.char_at(piece.end() - 1) == Some('\r');
            total += piece.len;
        }
        assert_eq!(total, len, "piece lengths do not sum to document length");
        breaks - seams
    }
}

/// Iterator over borrowed text runs, one per piece.
pub struct Chunks<'a> {
    pieces: tree::Pieces<'a>,
    store: &'a BufferStore,
    remaining: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.remaining == 0 {
            return None;
        }
        let (piece, skip) = self.pieces.next()?;
        let (buffer, start, len) = piece.trimmed(skip, self.remaining);
        self.remaining -= len;
        Some(self.store.slice(buffer, start, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> PieceTable {
        PieceTable::from_text(text, &EngineConfig::default()).unwrap()
    }

    fn terminators(text: &str) -> usize {
        text.replace("\r\n", "\n").matches(['\n', '\r']).count()
    }

    #[test]
    fn test_hello_world() {
        let mut t = table("");
        t.insert(0, "hello").unwrap();
        t.insert(5, " world").unwrap();
        assert_eq!(t.text(), "hello world");

        assert_eq!(t.delete(0, 6).unwrap(), "hello ");
        assert_eq!(t.text(), "world");
        assert_eq!(t.len(), 5);
        t.check_invariants();
    }

    #[test]
    fn test_insert_splits_original_piece() {
        let mut t = table("abcdef");
        t.insert(3, "XY").unwrap();
        assert_eq!(t.text(), "abcXYdef");
        assert_eq!(t.piece_count(), 3);
        assert_eq!(t.char_at(4), Some('Y'));
        assert_eq!(t.char_at(5), Some('d'));
        assert_eq!(t.char_at(8), None);
    }

    #[test]
    fn test_sequential_typing_extends_one_piece() {
        let mut t = table("ab");
        for (i, ch) in "hello".chars().enumerate() {
            t.insert(1 + i, &ch.to_string()).unwrap();
        }
        assert_eq!(t.text(), "ahellob");
        assert_eq!(t.piece_count(), 3);
        t.check_invariants();
    }

    #[test]
    fn test_delete_across_pieces() {
        let mut t = table("0123456789");
        t.insert(5, "abc").unwrap();
        t.insert(0, "xyz").unwrap();
        assert_eq!(t.text(), "xyz01234abc56789");

        assert_eq!(t.delete(2, 10).unwrap(), "z01234abc5");
        assert_eq!(t.text(), "xy6789");
        t.check_invariants();
    }

    #[test]
    fn test_text_in_range_and_chunks() {
        let mut t = table("hello world");
        t.insert(5, ",").unwrap();
        assert_eq!(t.text_in_range(3, 8).unwrap(), "lo, w");
        assert_eq!(t.chunks(3, 8).collect::<Vec<_>>(), vec!["lo", ",", " w"]);
        assert_eq!(t.text_in_range(12, 12).unwrap(), "");
    }

    #[test]
    fn test_out_of_range() {
        let mut t = table("abc");
        assert!(matches!(
            t.insert(4, "x"),
            Err(Error::OutOfRange { start: 4, end: 4, len: 3 })
        ));
        assert!(matches!(
            t.delete(0, 4),
            Err(Error::OutOfRange { start: 0, end: 4, len: 3 })
        ));
        assert!(t.delete(1, usize::MAX).is_err());
        assert!(t.text_in_range(2, 1).is_err());
        assert_eq!(t.delete(3, 0).unwrap(), "");
        assert_eq!(t.text(), "abc");
    }

    #[test]
    fn test_crlf_seam_counts_one_terminator() {
        let mut t = table("a\rb");
        t.insert(2, "\n").unwrap();
        // "a\r" + "\n" + "b"
        assert_eq!(t.text(), "a\r\nb");
        assert_eq!(t.check_invariants(), 1);

        t.delete(2, 1).unwrap();
        assert_eq!(t.check_invariants(), 1);
        t.insert(1, "\n").unwrap();
        assert_eq!(t.text(), "a\n\rb");
        assert_eq!(t.check_invariants(), 2);
    }

    #[test]
    fn test_defragment_bounds_piece_count() {
        let config = EngineConfig {
            defrag_piece_threshold: 4,
            ..EngineConfig::default()
        };
        let text: String = ('a'..='z').cycle().take(100).collect();
        let mut t = PieceTable::from_text(&text, &config).unwrap();

        for k in 1..100 {
            t.insert(k, "X").unwrap();
            t.delete(k, 1).unwrap();
            assert!(t.piece_count() <= 8, "{} pieces after {k}", t.piece_count());
        }
        assert_eq!(t.text(), text);

        t.defragment();
        assert_eq!(t.piece_count(), 1);
        t.check_invariants();
    }

    #[test]
    fn test_clone_is_isolated() {
        let mut t = table("line one\nline two\n");
        let snapshot = t.clone();
        t.insert(4, "!").unwrap();
        t.delete(0, 2).unwrap();

        assert_eq!(snapshot.text(), "line one\nline two\n");
        assert_eq!(t.text(), "ne! one\nline two\n");
        assert_eq!(snapshot.check_invariants(), terminators(&snapshot.text()));
        assert_eq!(t.check_invariants(), terminators(&t.text()));
    }
}
