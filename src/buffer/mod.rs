use std::sync::Arc;

use crate::error::{Error, Result};

#[cfg(test)]
mod tests;

/// Chars between two char→byte checkpoints
const CHAR_STRIDE: usize = 256;

/// Identifies the content buffer a piece points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    /// The text loaded at open time
    Original,
    /// A page of the append-only edit buffer
    Added(usize),
}

/// Counts of each line terminator kind seen by a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminatorStats {
    pub lf: usize,
    pub cr: usize,
    pub crlf: usize,
}

/// Append-only UTF-8 text addressed by char offsets.
///
/// Text is never rewritten once pushed. Alongside the text the buffer keeps
/// a byte checkpoint every `CHAR_STRIDE` chars and the buffer-local start of
/// every line, so slicing and line-break counting never scan the whole buffer.
#[derive(Debug, Clone, Default)]
pub struct ContentBuffer {
    text: String,
    /// Byte offset of char `i * CHAR_STRIDE`
    marks: Vec<usize>,
    /// Char offsets just past each terminator; `\r\n` counts once
    line_starts: Vec<usize>,
    chars: usize,
    last_char: Option<char>,
    stats: TerminatorStats,
}

impl ContentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Result<Self> {
        let mut buffer = Self::new();
        buffer.push_str(text)?;
        Ok(buffer)
    }

    /// Append text; returns the char offset it starts at.
    pub fn push_str(&mut self, text: &str) -> Result<usize> {
        self.text
            .try_reserve(text.len())
            .map_err(|_| Error::AllocationFailure)?;

        let start = self.chars;
        let base = self.text.len();
        for (byte, ch) in text.char_indices() {
            if self.chars % CHAR_STRIDE == 0 {
                self.marks.push(base + byte);
            }
            match ch {
                '\n' if self.last_char == Some('\r') => {
                    // The '\r' already registered a line start right here;
                    // the pair is one terminator, so move that start past '\n'.
                    self.line_starts.pop();
                    self.line_starts.push(self.chars + 1);
                    self.stats.cr -= 1;
                    self.stats.crlf += 1;
                }
                '\n' => {
                    self.line_starts.push(self.chars + 1);
                    self.stats.lf += 1;
                }
                '\r' => {
                    self.line_starts.push(self.chars + 1);
                    self.stats.cr += 1;
                }
                _ => {}
            }
            self.last_char = Some(ch);
            self.chars += 1;
        }
        self.text.push_str(text);
        Ok(start)
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    pub fn len_bytes(&self) -> usize {
        self.text.len()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn terminator_stats(&self) -> TerminatorStats {
        self.stats
    }

    /// Buffer-local line starts, excluding the implicit start at 0.
    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    /// Convert a char offset to a byte offset.
    pub fn char_to_byte(&self, char_idx: usize) -> usize {
        debug_assert!(char_idx <= self.chars);
        if char_idx >= self.chars {
            return self.text.len();
        }
        let mark = self.marks[char_idx / CHAR_STRIDE];
        let skip = char_idx % CHAR_STRIDE;
        if skip == 0 {
            return mark;
        }
        self.text[mark..]
            .char_indices()
            .nth(skip)
            .map(|(byte, _)| mark + byte)
            .unwrap_or(self.text.len())
    }

    /// Text of `len` chars starting at char `start`.
    pub fn slice(&self, start: usize, len: usize) -> &str {
        let from = self.char_to_byte(start);
        let to = self.char_to_byte(start + len);
        &self.text[from..to]
    }

    pub fn char_at(&self, char_idx: usize) -> Option<char> {
        if char_idx >= self.chars {
            return None;
        }
        self.text[self.char_to_byte(char_idx)..].chars().next()
    }

    /// Line terminators inside `[start, end)` and the length of the run after
    /// the last one, treating the range as standalone text.
    pub fn breaks_in(&self, start: usize, end: usize) -> (usize, usize) {
        let lo = self.line_starts.partition_point(|&s| s <= start);
        let hi = self.line_starts.partition_point(|&s| s <= end);
        let mut breaks = hi - lo;
        let mut last_start = if breaks > 0 {
            self.line_starts[hi - 1]
        } else {
            start
        };

        // A range ending between '\r' and '\n' owns a terminator the buffer
        // places after the '\n'.
        if end > start
            && self.char_at(end - 1) == Some('\r')
            && self.char_at(end) == Some('\n')
        {
            breaks += 1;
            last_start = end;
        }

        (breaks, end - last_start)
    }
}

/// Builds the `original` buffer incrementally while a file streams in.
#[derive(Debug, Default)]
pub struct OriginalBuilder {
    buffer: ContentBuffer,
}

impl OriginalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, text: &str) -> Result<()> {
        self.buffer.push_str(text).map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn finish(self) -> Arc<ContentBuffer> {
        Arc::new(self.buffer)
    }
}

/// The two content pools of one document.
///
/// `original` is shared read-only. `added` is split into pages so that a
/// snapshot holding old pages never forces a copy of the whole edit history;
/// only the tail page is copied on write while a snapshot still references it.
#[derive(Debug, Clone)]
pub struct BufferStore {
    original: Arc<ContentBuffer>,
    added: Vec<Arc<ContentBuffer>>,
    page_chars: usize,
}

impl BufferStore {
    pub fn new(original: Arc<ContentBuffer>, page_chars: usize) -> Self {
        Self {
            original,
            added: Vec::new(),
            page_chars: page_chars.max(1),
        }
    }

    pub fn buffer(&self, id: BufferId) -> &ContentBuffer {
        match id {
            BufferId::Original => &self.original,
            BufferId::Added(page) => &self.added[page],
        }
    }

    pub fn original(&self) -> &ContentBuffer {
        &self.original
    }

    pub fn page_count(&self) -> usize {
        self.added.len()
    }

    /// Total chars ever appended to the edit buffer
    pub fn added_len(&self) -> usize {
        self.added.iter().map(|page| page.len()).sum()
    }

    /// Append to the edit buffer. An append never spans pages.
    pub fn append(&mut self, text: &str) -> Result<(BufferId, usize, usize)> {
        let len = text.chars().count();
        let fits_tail = self
            .added
            .last()
            .map_or(false, |page| page.len() + len <= self.page_chars);

        if !fits_tail {
            self.added.push(Arc::new(ContentBuffer::new()));
        }
        let page = self.added.len() - 1;
        let start = Arc::make_mut(&mut self.added[page]).push_str(text)?;
        Ok((BufferId::Added(page), start, len))
    }

    pub fn slice(&self, id: BufferId, start: usize, len: usize) -> &str {
        self.buffer(id).slice(start, len)
    }
}
