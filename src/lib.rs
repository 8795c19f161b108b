//! Piece-table text engine for code editors.
//!
//! A [`Document`] keeps the loaded text untouched in an `original` buffer and
//! every later insertion in an append-only `added` buffer. The document
//! itself is a balanced sequence of pieces referencing ranges of those
//! buffers, so an edit costs O(log pieces) no matter how large the file is.
//!
//! ```
//! use piecetext::Document;
//!
//! let mut doc = Document::from_text("hello").unwrap();
//! doc.insert(5, " world").unwrap();
//! assert_eq!(doc.text(), "hello world");
//! doc.undo().unwrap();
//! assert_eq!(doc.text(), "hello");
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod document;
pub mod edit;
pub mod error;
pub mod io;
pub mod lines;
pub mod query;
pub mod shared;
pub mod snapshot;
pub mod table;

pub use codec::{Charset, Encoding, LineEnding, LoadReport};
pub use config::EngineConfig;
pub use document::{Document, OpenOptions, SaveOptions};
pub use error::{Error, Result};
pub use io::{open_path, save_to};
pub use query::worker::{SearchHandle, SearchResponse, SearchWorker};
pub use query::{Direction, SearchOptions};
pub use shared::SharedDocument;
pub use snapshot::Snapshot;
