//! Tolerant CSV reading for operator-exported spreadsheets.
//!
//! The source files come out of hand-maintained sheets, so the reader
//! accepts what a strict RFC parser would reject: ragged rows, stray
//! whitespace, and lines where a closing quote never arrives. Field
//! splitting never fails; anything structurally odd surfaces later as
//! a per-row normalization error instead.

pub mod dialect;

/// Split one record into fields.
///
/// Quoting rules:
/// - a field starting with `"` (after optional spaces) runs to the next
///   lone `"`; commas and doubled quotes inside are literal content
/// - `""` inside a quoted field is a single literal quote
/// - an unclosed quote swallows the rest of the line into that field
/// - unquoted fields are trimmed; quoted fields keep their content
///   exactly as written
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' if !was_quoted && field.trim().is_empty() => {
                    // Opening quote; drop any leading whitespace.
                    field.clear();
                    in_quotes = true;
                    was_quoted = true;
                }
                ',' => {
                    fields.push(finish_field(field, was_quoted));
                    field = String::new();
                    was_quoted = false;
                }
                _ => field.push(c),
            }
        }
    }
    // An unclosed quote falls through here with in_quotes still set;
    // the remainder is kept as field content.
    fields.push(finish_field(field, was_quoted || in_quotes));
    fields
}

fn finish_field(raw: String, was_quoted: bool) -> String {
    if was_quoted {
        raw
    } else {
        raw.trim().to_string()
    }
}

/// Split raw text into records, honoring newlines inside quoted fields.
///
/// Handles `\n` and `\r\n` endings. Records that are empty after
/// trimming (blank separator lines) are dropped.
pub fn split_records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut record = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                // Track quote state the same way parse_line does so a
                // doubled quote does not flip it.
                if in_quotes && chars.peek() == Some(&'"') {
                    record.push('"');
                    record.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                    record.push('"');
                }
            }
            '\n' if !in_quotes => {
                if record.ends_with('\r') {
                    record.pop();
                }
                if !record.trim().is_empty() {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => record.push(c),
        }
    }
    if record.ends_with('\r') {
        record.pop();
    }
    if !record.trim().is_empty() {
        records.push(record);
    }
    records
}
