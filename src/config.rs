use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Default read size when streaming a file into the original buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Editor-policy knobs for the engine.
///
/// Every field has a default, so a JSON config only needs the keys it
/// overrides:
///
/// ```
/// let config = piecetext::EngineConfig::from_json(r#"{ "undo_limit": 50 }"#).unwrap();
/// assert_eq!(config.undo_limit, 50);
/// assert_eq!(config.coalesce_max_chars, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max gap between two keystrokes of one typing/deletion burst (milliseconds)
    pub coalesce_window_ms: u64,
    /// Max chars a single burst may accumulate before a new undo unit starts
    pub coalesce_max_chars: usize,
    /// Max undo groups kept; the oldest are dropped first
    pub undo_limit: usize,
    /// Piece count that triggers defragmentation
    pub defrag_piece_threshold: usize,
    /// Capacity (chars) of one page of the added buffer
    pub add_page_chars: usize,
    /// Lines scanned between two cancellation checks during search
    pub search_block_lines: usize,
    /// Bytes read per chunk when loading
    pub read_chunk_bytes: usize,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: 1000,
            coalesce_max_chars: 256,
            undo_limit: 1000,
            defrag_piece_threshold: 1000,
            add_page_chars: 64 * 1024,
            search_block_lines: 1024,
            read_chunk_bytes: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"coalesce_window_ms": 250}"#).unwrap();
        assert_eq!(config.coalesce_window(), Duration::from_millis(250));
        assert_eq!(config.undo_limit, EngineConfig::default().undo_limit);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = EngineConfig::from_json(r#"{"undo_limit": "many"}"#).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
