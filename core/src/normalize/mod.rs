//! Row normalizers, one per CSV dialect.
//!
//! Each normalizer turns parsed rows into typed records and collects
//! per-row errors instead of aborting the batch. Shared here: the
//! error type and the small field-coercion helpers every dialect needs
//! for Japanese spreadsheet values ("徒歩7分", "約520台", "あり").

pub mod event_master;
pub mod machine_master;
pub mod store_profile;

use serde::Serialize;

/// One row that could not be converted. `row` is the 1-based position
/// in the source file, counting the header.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row:     usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self { row, message: message.into() }
    }
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

/// Field by index, empty string when the row is too short.
pub(crate) fn field(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.as_str()).unwrap_or("")
}

/// First run of digits anywhere in the text, with an optional leading
/// minus. "徒歩7分" -> 7, "約520台" -> 520, "-1200枚" -> -1200.
pub(crate) fn first_int(text: &str) -> Option<i64> {
    let mut digits = String::new();
    let mut negative = false;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if c.is_ascii_digit() {
            if digits.is_empty() && prev == Some('-') {
                negative = true;
            }
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
        prev = Some(c);
    }
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok().map(|n| if negative { -n } else { n })
}

/// First decimal number in the text. "98.5%" -> 98.5.
pub(crate) fn first_float(text: &str) -> Option<f64> {
    let mut num = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() || (c == '.' && num.contains(|d: char| d.is_ascii_digit())) {
            num.push(c);
        } else if c == '-' && num.is_empty() {
            num.push(c);
        } else if !num.is_empty() && num.contains(|d: char| d.is_ascii_digit()) {
            break;
        } else {
            num.clear();
        }
    }
    num.parse().ok()
}

/// Yes/no coercion for presence-style attributes.
///
/// Explicit negatives ("なし", "無", "不可", "no") win; explicit
/// positives ("あり", "有", "可", "yes") or a positive count
/// ("300台") read as true; anything else is false.
pub(crate) fn truthy(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() {
        return false;
    }
    let lower = t.to_ascii_lowercase();
    if t.contains("なし")
        || t.contains("無し")
        || t == "無"
        || t.contains("不可")
        || matches!(lower.as_str(), "no" | "none" | "false" | "0")
    {
        return false;
    }
    // "有料駐車場" and friends: 有 anywhere reads as presence.
    if t.contains("あり")
        || t.contains("有")
        || t == "可"
        || matches!(lower.as_str(), "yes" | "true" | "ok")
    {
        return true;
    }
    matches!(first_int(t), Some(n) if n > 0)
}

/// Split a list-valued attribute on the separators operators actually
/// use: `、` `・` `,` `/`.
pub(crate) fn split_list(text: &str) -> Vec<String> {
    text.split(['、', '・', ',', '/'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
