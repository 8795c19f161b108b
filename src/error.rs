//! Error types for the text engine.

use thiserror::Error;

use crate::codec::Charset;

/// Errors returned by document operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An offset or range fell outside `[0, len]`. Always a caller bug.
    #[error("range {start}..{end} out of bounds for document of length {len}")]
    OutOfRange {
        start: usize,
        end: usize,
        len: usize,
    },

    /// Malformed input bytes while loading in strict mode.
    #[error("malformed {charset} sequence at byte {offset}")]
    Decode { offset: u64, charset: Charset },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    /// The content buffer could not grow.
    #[error("allocation failure while growing a content buffer")]
    AllocationFailure,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A long-running read observed its cancellation flag.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Benign signals the view layer treats as a no-op.
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::NothingToUndo | Error::NothingToRedo | Error::Cancelled)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
