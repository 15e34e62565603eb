/// Sanitize extracted text before it leaves the pipeline.
///
/// Form feeds and carriage returns become line breaks; other control
/// characters, replacement characters and invisible formatting marks are
/// dropped. Lines are trimmed and blank lines removed.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '\n' | '\t' => Some(c),
            '\r' | '\u{000C}' => Some('\n'),
            '\u{FFFD}' | '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Character count the quality gate compares against its threshold.
pub fn stripped_char_count(text: &str) -> usize {
    text.trim().chars().count()
}
