use crate::buffer::{BufferId, BufferStore};

/// A slice of one content buffer that currently contributes to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub buffer: BufferId,
    /// Char offset inside the buffer
    pub start: usize,
    /// Length in chars
    pub len: usize,
    /// Line terminators inside the range
    pub line_breaks: usize,
    /// Chars after the last terminator (or `len` if there is none)
    pub last_line_len: usize,
}

impl Piece {
    pub fn new(store: &BufferStore, buffer: BufferId, start: usize, len: usize) -> Self {
        let (line_breaks, last_line_len) = store.buffer(buffer).breaks_in(start, start + len);
        Self {
            buffer,
            start,
            len,
            line_breaks,
            last_line_len,
        }
    }

    /// End offset inside the buffer (exclusive)
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Split at a local offset strictly inside the piece.
    pub fn split(&self, store: &BufferStore, at: usize) -> (Piece, Piece) {
        assert!(at > 0 && at < self.len, "split at {at} outside piece of length {}", self.len);
        (
            Piece::new(store, self.buffer, self.start, at),
            Piece::new(store, self.buffer, self.start + at, self.len - at),
        )
    }

    /// Sub-range of this piece, for reads only; cached line data is not kept.
    pub fn trimmed(&self, skip: usize, take: usize) -> (BufferId, usize, usize) {
        let skip = skip.min(self.len);
        (self.buffer, self.start + skip, take.min(self.len - skip))
    }

    /// Whether `next` continues this piece in the same buffer.
    pub fn is_contiguous_with(&self, next: &Piece) -> bool {
        self.buffer == next.buffer && self.end() == next.start
    }

    pub fn text<'a>(&self, store: &'a BufferStore) -> &'a str {
        store.slice(self.buffer, self.start, self.len)
    }
}
