//! Text processing: boundary-aware segmentation and speech cleanup.

pub mod chunker;
mod cleaner;
mod sentences;

pub use chunker::{segment, segment_with, SegmentOptions, DEFAULT_SPLIT_FLOOR};
pub use cleaner::clean_for_speech;
pub use sentences::split_sentences;

/// One ordered slice of a unit's text, sized for a single outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position in the sequence
    pub index: usize,
    /// Number of chunks in the sequence
    pub total: usize,
    /// Trimmed, non-empty content
    pub text: String,
    /// Length of `text` in chars
    pub size_chars: usize,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(index: usize, total: usize, text: String) -> Self {
        let size_chars = text.chars().count();
        Self {
            index,
            total,
            text,
            size_chars,
        }
    }

    /// Whether this is the only chunk of its unit.
    pub fn is_sole(&self) -> bool {
        self.total == 1
    }
}
