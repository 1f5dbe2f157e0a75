//! Cleanup of Markdown-formatted chapter text before speech synthesis.

/// Characters read aloud as noise, and what to put in their place.
const SPEECH_REPLACEMENTS: &[(char, &str)] = &[
    ('#', ""),          // Markdown heading marker
    ('*', ""),          // Markdown emphasis marker
    ('\u{00a0}', " "),  // Non-breaking space
    ('\u{3000}', " "),  // Ideographic space
    ('\u{200b}', ""),   // Zero-width space
    ('\u{200c}', ""),   // Zero-width non-joiner
    ('\u{200d}', ""),   // Zero-width joiner
    ('\u{feff}', ""),   // BOM
];

/// Prepare text for speech synthesis.
///
/// Strips Markdown heading/emphasis markers and invisible characters, drops
/// control characters other than newlines and tabs, collapses runs of spaces,
/// and keeps at most one blank line between paragraphs so paragraph
/// boundaries survive for segmentation.
pub fn clean_for_speech(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());

    for c in text.chars() {
        match SPEECH_REPLACEMENTS.iter().find(|(ch, _)| *ch == c) {
            Some((_, replacement)) => stripped.push_str(replacement),
            None if c == '\n' || c == '\t' || !c.is_control() => stripped.push(c),
            None => {}
        }
    }

    collapse_whitespace(&stripped)
}

fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut newline_count = 0;

    for line in text.split('\n') {
        let line = line.split([' ', '\t']).filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            newline_count += 1;
            continue;
        }
        if !result.is_empty() {
            result.push_str(if newline_count > 0 { "\n\n" } else { "\n" });
        }
        result.push_str(&line);
        newline_count = 0;
    }

    result
}
