use std::fmt;

use crate::buffer::TerminatorStats;

/// Line terminator style of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LineEnding {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// The most frequent style; `Lf` for text without terminators or on a tie
    /// with `Lf`.
    pub fn dominant(stats: TerminatorStats) -> Self {
        if stats.crlf > stats.lf && stats.crlf >= stats.cr {
            LineEnding::CrLf
        } else if stats.cr > stats.lf && stats.cr > stats.crlf {
            LineEnding::Cr
        } else {
            LineEnding::Lf
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LineEnding::Lf => "LF",
            LineEnding::Cr => "CR",
            LineEnding::CrLf => "CRLF",
        })
    }
}
