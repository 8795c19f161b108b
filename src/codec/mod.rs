//! Byte ⇄ text conversion at the edges of the engine.
//!
//! Loading sniffs a byte-order mark (or guesses UTF-16 from NUL patterns),
//! then streams chunks through a [`Decoder`] that tolerates multi-byte
//! sequences split across reads. Saving goes through an [`Encoder`] that can
//! rewrite line terminators on the fly.

mod line_ending;

use std::fmt;
use std::io::Write;

pub use line_ending::LineEnding;

use crate::error::{Error, Result};

const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16_BE: &[u8] = &[0xFE, 0xFF];

/// Bytes inspected by the UTF-16 guess when there is no BOM
const SNIFF_LEN: usize = 512;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl Charset {
    pub fn bom(&self) -> &'static [u8] {
        match self {
            Charset::Utf8 => BOM_UTF8,
            Charset::Utf16Le => BOM_UTF16_LE,
            Charset::Utf16Be => BOM_UTF16_BE,
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Utf16Be => "UTF-16BE",
        })
    }
}

/// Charset plus whether the file carried a byte-order mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Encoding {
    pub charset: Charset,
    pub bom: bool,
}

impl Encoding {
    pub fn new(charset: Charset, bom: bool) -> Self {
        Self { charset, bom }
    }
}

/// Guess the encoding from the first bytes of a file.
///
/// `complete` says `head` holds the whole file. Returns the encoding and the
/// length of the BOM to skip.
///
/// Without a BOM, UTF-16 is only chosen when the NUL pattern fits and the
/// sample decodes as UTF-16 without a single malformed unit; a complete file
/// must also have an even length. Anything else reads as UTF-8.
pub fn sniff(head: &[u8], complete: bool) -> (Encoding, usize) {
    for charset in [Charset::Utf8, Charset::Utf16Le, Charset::Utf16Be] {
        let bom = charset.bom();
        if head.starts_with(bom) {
            return (Encoding::new(charset, true), bom.len());
        }
    }

    let fits_window = complete && head.len() <= SNIFF_LEN;
    if fits_window && head.len() % 2 != 0 {
        return (Encoding::default(), 0);
    }

    // ASCII-heavy UTF-16 has a NUL in every other byte
    let sample = &head[..head.len().min(SNIFF_LEN) & !1];
    let pairs = sample.len() / 2;
    if pairs >= 2 {
        let even = sample.iter().step_by(2).filter(|&&b| b == 0).count();
        let odd = sample.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
        let guess = if odd * 10 >= pairs * 4 && even * 10 < pairs {
            Some((Charset::Utf16Le, u16::from_le_bytes as fn([u8; 2]) -> u16))
        } else if even * 10 >= pairs * 4 && odd * 10 < pairs {
            Some((Charset::Utf16Be, u16::from_be_bytes as fn([u8; 2]) -> u16))
        } else {
            None
        };
        if let Some((charset, unit)) = guess {
            if clean_utf16(sample, unit, fits_window) {
                return (Encoding::new(charset, false), 0);
            }
        }
    }
    (Encoding::default(), 0)
}

/// Whether `sample` holds only well-formed UTF-16. A high surrogate at the
/// very end is allowed when more bytes follow the sample.
fn clean_utf16(sample: &[u8], unit: fn([u8; 2]) -> u16, whole: bool) -> bool {
    let mut units: Vec<u16> = sample.chunks_exact(2).map(|b| unit([b[0], b[1]])).collect();
    if !whole && matches!(units.last(), Some(0xD800..=0xDBFF)) {
        units.pop();
    }
    char::decode_utf16(units).all(|decoded| decoded.is_ok())
}

/// What happened while decoding a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub encoding: Encoding,
    /// Malformed sequences replaced by U+FFFD
    pub replaced: usize,
    /// Byte offset of the first malformed sequence
    pub first_malformed: Option<u64>,
    pub bytes_read: u64,
}

impl LoadReport {
    pub fn is_lossy(&self) -> bool {
        self.replaced > 0
    }
}

/// Streaming decoder: bytes in, UTF-8 text out.
#[derive(Debug)]
pub struct Decoder {
    strict: bool,
    /// Incomplete sequence carried over from the previous chunk
    pending: Vec<u8>,
    /// File offset of the first byte in `pending`
    consumed: u64,
    report: LoadReport,
}

impl Decoder {
    /// `encoding.bom` means the caller already skipped the mark; offsets in
    /// errors still count it.
    pub fn new(encoding: Encoding, strict: bool) -> Self {
        let consumed = if encoding.bom {
            encoding.charset.bom().len() as u64
        } else {
            0
        };
        Self {
            strict,
            pending: Vec::new(),
            consumed,
            report: LoadReport {
                encoding,
                bytes_read: consumed,
                ..LoadReport::default()
            },
        }
    }

    pub fn charset(&self) -> Charset {
        self.report.encoding.charset
    }

    /// Decode a chunk, appending text to `out`.
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) -> Result<()> {
        self.report.bytes_read += bytes.len() as u64;
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let used = match self.charset() {
            Charset::Utf8 => self.decode_utf8(&data, out)?,
            Charset::Utf16Le => self.decode_utf16(&data, out, u16::from_le_bytes)?,
            Charset::Utf16Be => self.decode_utf16(&data, out, u16::from_be_bytes)?,
        };
        self.consumed += used as u64;
        data.drain(..used);
        self.pending = data;
        Ok(())
    }

    /// Flush the tail. A sequence cut off by end of input is malformed.
    pub fn finish(mut self, out: &mut String) -> Result<LoadReport> {
        if !self.pending.is_empty() {
            self.malformed(self.consumed, out)?;
        }
        Ok(self.report)
    }

    fn malformed(&mut self, offset: u64, out: &mut String) -> Result<()> {
        if self.strict {
            return Err(Error::Decode {
                offset,
                charset: self.charset(),
            });
        }
        out.push(char::REPLACEMENT_CHARACTER);
        self.report.replaced += 1;
        self.report.first_malformed.get_or_insert(offset);
        Ok(())
    }

    /// Returns the number of bytes fully handled.
    fn decode_utf8(&mut self, data: &[u8], out: &mut String) -> Result<usize> {
        let mut pos = 0;
        loop {
            match std::str::from_utf8(&data[pos..]) {
                Ok(text) => {
                    out.push_str(text);
                    return Ok(data.len());
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&data[pos..pos + valid]) {
                        out.push_str(text);
                    }
                    pos += valid;
                    match err.error_len() {
                        Some(bad) => {
                            self.malformed(self.consumed + pos as u64, out)?;
                            pos += bad;
                        }
                        // Truncated sequence; wait for more bytes
                        None => return Ok(pos),
                    }
                }
            }
        }
    }

    fn decode_utf16(
        &mut self,
        data: &[u8],
        out: &mut String,
        unit: fn([u8; 2]) -> u16,
    ) -> Result<usize> {
        let mut units: Vec<u16> = data.chunks_exact(2).map(|b| unit([b[0], b[1]])).collect();
        // Hold back a high surrogate whose partner is in the next chunk
        if matches!(units.last(), Some(0xD800..=0xDBFF)) {
            units.pop();
        }

        let mut index = 0;
        for decoded in char::decode_utf16(units.iter().copied()) {
            match decoded {
                Ok(ch) => {
                    out.push(ch);
                    index += ch.len_utf16();
                }
                Err(_) => {
                    self.malformed(self.consumed + index as u64 * 2, out)?;
                    index += 1;
                }
            }
        }
        Ok(index * 2)
    }
}

/// Streaming encoder: text in, bytes out.
///
/// With a target line ending set, every `\n`, `\r` and `\r\n` is rewritten to
/// it, including a `\r\n` split across two `write_str` calls.
pub struct Encoder<W: Write> {
    writer: W,
    charset: Charset,
    line_ending: Option<LineEnding>,
    pending_cr: bool,
    buf: Vec<u8>,
}

impl<W: Write> Encoder<W> {
    pub fn new(mut writer: W, encoding: Encoding, line_ending: Option<LineEnding>) -> Result<Self> {
        if encoding.bom {
            writer.write_all(encoding.charset.bom())?;
        }
        Ok(Self {
            writer,
            charset: encoding.charset,
            line_ending,
            pending_cr: false,
            buf: Vec::new(),
        })
    }

    pub fn write_str(&mut self, text: &str) -> Result<()> {
        let Some(ending) = self.line_ending else {
            if self.charset == Charset::Utf8 {
                self.writer.write_all(text.as_bytes())?;
            } else {
                self.encode(text);
                self.flush_buf()?;
            }
            return Ok(());
        };

        let mut run = 0;
        for (i, ch) in text.char_indices() {
            if ch != '\r' && ch != '\n' && !self.pending_cr {
                continue;
            }
            self.encode(&text[run..i]);
            run = i + ch.len_utf8();
            match ch {
                '\r' => {
                    if self.pending_cr {
                        self.encode(ending.as_str());
                    }
                    self.pending_cr = true;
                }
                '\n' => {
                    self.encode(ending.as_str());
                    self.pending_cr = false;
                }
                _ => {
                    self.encode(ending.as_str());
                    self.pending_cr = false;
                    run = i;
                }
            }
        }
        self.encode(&text[run..]);
        self.flush_buf()
    }

    /// Write out a trailing `\r` and flush; returns the writer.
    pub fn finish(mut self) -> Result<W> {
        if self.pending_cr {
            if let Some(ending) = self.line_ending {
                self.encode(ending.as_str());
            }
            self.pending_cr = false;
        }
        self.flush_buf()?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn encode(&mut self, text: &str) {
        match self.charset {
            Charset::Utf8 => self.buf.extend_from_slice(text.as_bytes()),
            Charset::Utf16Le => {
                for unit in text.encode_utf16() {
                    self.buf.extend_from_slice(&unit.to_le_bytes());
                }
            }
            Charset::Utf16Be => {
                for unit in text.encode_utf16() {
                    self.buf.extend_from_slice(&unit.to_be_bytes());
                }
            }
        }
    }

    fn flush_buf(&mut self) -> Result<()> {
        self.writer.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}
