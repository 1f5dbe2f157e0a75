//! Boundary-aware segmentation of long text into size-bounded chunks.
//!
//! Boundaries are tried from best to worst: blank-line paragraph breaks, then
//! sentence ends, then the last whitespace or strong punctuation in the window,
//! and finally an exact cut at the limit. Paragraphs packed together are joined
//! by one blank line; everything else is a trimmed slice of the input.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use super::sentences::{push_trimmed, sentence_spans};
use super::Chunk;

/// Earliest point in a window, as a fraction of the limit, at which a soft
/// hard-cut is accepted.
pub const DEFAULT_SPLIT_FLOOR: f64 = 0.6;

/// One or more blank (or whitespace-only) lines.
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n\s*\n").expect("paragraph pattern is valid"));

/// Joins paragraphs packed into one chunk, whatever separated them in the input.
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Punctuation after which a hard cut reads naturally.
const STRONG_PUNCTUATION: &[char] = &[
    '.', '!', '?', ',', ';', ':', '。', '！', '？', '，', '；', '：', '、', '…',
];

/// Segmentation limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions {
    /// Maximum chunk length in chars
    pub max_chars: usize,
    /// Fraction of `max_chars` before which a soft hard-cut is rejected
    pub split_floor: f64,
}

impl SegmentOptions {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            split_floor: DEFAULT_SPLIT_FLOOR,
        }
    }

    pub fn with_split_floor(mut self, split_floor: f64) -> Self {
        self.split_floor = split_floor.clamp(0.0, 1.0);
        self
    }

    /// Limit used for packing; a zero limit behaves as one char.
    fn limit(&self) -> usize {
        self.max_chars.max(1)
    }

    /// Minimum number of chars a soft hard-cut must keep.
    fn floor_chars(&self) -> usize {
        ((self.limit() as f64) * self.split_floor).ceil().max(1.0) as usize
    }
}

/// Split `text` into ordered chunks of at most `max_chars` chars.
pub fn segment(text: &str, max_chars: usize) -> Vec<Chunk> {
    segment_with(text, SegmentOptions::new(max_chars))
}

/// Split `text` into ordered chunks using explicit options.
pub fn segment_with(text: &str, options: SegmentOptions) -> Vec<Chunk> {
    let pieces = split_text(text, options);
    let total = pieces.len();

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk::new(i + 1, total, piece))
        .collect()
}

fn split_text(text: &str, options: SegmentOptions) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if char_len(trimmed) <= options.limit() {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    pack_paragraphs(text, options, &mut chunks);
    chunks
}

/// Greedily pack whole paragraphs, joined by a single blank line. A paragraph
/// that cannot fit on its own is split by sentence.
fn pack_paragraphs(text: &str, options: SegmentOptions, out: &mut Vec<String>) {
    let max = options.limit();
    let separator_len = char_len(PARAGRAPH_SEPARATOR);
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for span in paragraph_spans(text) {
        let paragraph = &text[span];
        let len = char_len(paragraph);

        if len > max {
            flush_paragraphs(&mut current, out);
            split_paragraph(paragraph, options, out);
            continue;
        }

        if !current.is_empty() && current_len + separator_len + len <= max {
            current_len += separator_len + len;
        } else {
            flush_paragraphs(&mut current, out);
            current_len = len;
        }
        current.push(paragraph);
    }

    flush_paragraphs(&mut current, out);
}

fn flush_paragraphs(current: &mut Vec<&str>, out: &mut Vec<String>) {
    if !current.is_empty() {
        out.push(current.join(PARAGRAPH_SEPARATOR));
        current.clear();
    }
}

/// Byte ranges of the blank-line separated paragraphs in `text`, trimmed.
fn paragraph_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for separator in PARAGRAPH_BREAK.find_iter(text) {
        push_trimmed(text, start..separator.start(), &mut spans);
        start = separator.end();
    }
    push_trimmed(text, start..text.len(), &mut spans);
    spans
}

fn split_paragraph(paragraph: &str, options: SegmentOptions, out: &mut Vec<String>) {
    pack_spans(
        paragraph,
        &sentence_spans(paragraph),
        options.limit(),
        out,
        |sentence, out| hard_cut(sentence, options, out),
    );
}

/// Greedily pack consecutive sentence spans of `base` into slices of at most
/// `max` chars, keeping the original text between sentences. A span that cannot fit on
/// its own is handed to `oversized` after flushing the pending slice.
fn pack_spans(
    base: &str,
    spans: &[Range<usize>],
    max: usize,
    out: &mut Vec<String>,
    mut oversized: impl FnMut(&str, &mut Vec<String>),
) {
    // (start byte, end byte, length in chars) of the slice being built
    let mut current: Option<(usize, usize, usize)> = None;

    for span in spans {
        let len = char_len(&base[span.clone()]);

        if len > max {
            flush(base, current.take(), out);
            oversized(&base[span.clone()], out);
            continue;
        }

        current = match current {
            Some((start, end, current_len)) => {
                let joined = current_len + char_len(&base[end..span.start]) + len;
                if joined <= max {
                    Some((start, span.end, joined))
                } else {
                    flush(base, Some((start, end, current_len)), out);
                    Some((span.start, span.end, len))
                }
            }
            None => Some((span.start, span.end, len)),
        };
    }

    flush(base, current, out);
}

fn flush(base: &str, slice: Option<(usize, usize, usize)>, out: &mut Vec<String>) {
    if let Some((start, end, _)) = slice {
        let piece = base[start..end].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
    }
}

/// Cut a single over-long sentence into pieces of at most `max_chars` chars.
///
/// Each cut lands on the last whitespace or strong punctuation within the
/// window when that keeps at least `split_floor` of the window; otherwise the
/// cut is exact, which always makes progress.
fn hard_cut(sentence: &str, options: SegmentOptions, out: &mut Vec<String>) {
    let max = options.limit();
    let floor = options.floor_chars();
    let mut rest = sentence.trim();

    while !rest.is_empty() {
        let window_end = match rest.char_indices().nth(max) {
            Some((byte, _)) => byte,
            None => {
                out.push(rest.to_string());
                break;
            }
        };

        let cut = soft_cut(rest, max, floor).unwrap_or(window_end);
        let head = rest[..cut].trim_end();
        // A soft cut keeps at least `floor` >= 1 chars, so `head` is never empty.
        out.push(head.to_string());
        rest = rest[cut..].trim_start();
    }
}

/// Byte offset of the latest natural cut within the first `max` chars of
/// `text`, if it keeps at least `floor` chars.
///
/// Whitespace right after the window counts as a cut exactly at the limit.
fn soft_cut(text: &str, max: usize, floor: usize) -> Option<usize> {
    let window: Vec<(usize, char)> = text.char_indices().take(max + 1).collect();

    window
        .iter()
        .enumerate()
        .rev()
        .find_map(|(position, &(byte, c))| {
            let (kept, end) = if c.is_whitespace() {
                (position, byte)
            } else if position < max && STRONG_PUNCTUATION.contains(&c) {
                (position + 1, byte + c.len_utf8())
            } else {
                return None;
            };
            (kept >= floor && kept <= max).then_some(end)
        })
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
