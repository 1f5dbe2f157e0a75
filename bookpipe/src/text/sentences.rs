//! Punctuation-based sentence boundaries for Latin and CJK text.

use std::ops::Range;

/// Closing quotes and brackets that stay attached to the sentence they end.
const CLOSERS: &[char] = &[
    '"', '\'', ')', ']', '}', '\u{201d}', '\u{2019}', '』', '」', '》', '»', '）', '】',
];

fn is_latin_ender(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_cjk_ender(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_ender(c: char) -> bool {
    is_latin_ender(c) || is_cjk_ender(c)
}

/// Byte ranges of the sentences in `text`, trimmed, in order.
///
/// A run of enders followed by closers ends a sentence when the next char is
/// whitespace or end of text. CJK enders need no following whitespace.
/// Text between boundaries is never dropped: the last range runs to the end.
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i].1;
        if !is_ender(c) {
            i += 1;
            continue;
        }

        let mut cjk = is_cjk_ender(c);
        let mut j = i + 1;
        while j < chars.len() && is_ender(chars[j].1) {
            cjk |= is_cjk_ender(chars[j].1);
            j += 1;
        }
        while j < chars.len() && CLOSERS.contains(&chars[j].1) {
            j += 1;
        }

        let at_end = j >= chars.len();
        if at_end || cjk || chars[j].1.is_whitespace() {
            let end = if at_end { text.len() } else { chars[j].0 };
            push_trimmed(text, start..end, &mut spans);
            start = end;
        }
        i = j;
    }

    push_trimmed(text, start..text.len(), &mut spans);
    spans
}

/// Split `text` into trimmed sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    sentence_spans(text)
        .into_iter()
        .map(|range| &text[range])
        .collect()
}

/// Push `range` narrowed to its non-whitespace content, if any.
pub(crate) fn push_trimmed(text: &str, range: Range<usize>, spans: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let trimmed_start = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        let start = range.start + trimmed_start;
        spans.push(start..start + trimmed.len());
    }
}
