//! Cell-level normalization shared by every input mode.
//!
//! Everything here is a pure function over `&str`. Sheets, the semantic store
//! and the schema catalog all funnel their raw cell text through
//! [`clean_scalar`] before it reaches the model builder, so "blank", "quoted
//! blank" and "null-like export token" all collapse to `None`.

use std::borrow::Cow;

/// Tokens spreadsheet exports write for empty cells.
const NULL_TOKENS: &[&str] = &["nan", "NaN", "None", "null", "NULL", "#N/A"];

const TRUE_TOKENS: &[&str] = &["true", "1", "yes", "y", "t"];

const ACRONYMS: &[&str] = &["id", "api", "url", "ip", "uuid", "ssn", "dna", "rna", "ui", "db"];

/// Strips matching outer quote layers (`'` or `"`), trimming between layers.
pub fn strip_outer_quotes(value: &str) -> &str {
    let mut current = value.trim();
    loop {
        let bytes = current.as_bytes();
        if bytes.len() >= 2
            && bytes[0] == bytes[bytes.len() - 1]
            && matches!(bytes[0], b'\'' | b'"')
        {
            current = current[1..current.len() - 1].trim();
        } else {
            return current;
        }
    }
}

/// Trims and unquotes a raw cell, returning `None` for blank or null-like input.
pub fn clean_scalar(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NULL_TOKENS.contains(&trimmed) {
        return None;
    }
    let stripped = strip_outer_quotes(trimmed);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Same as [`clean_scalar`] for values that may already be absent.
pub fn clean_optional(raw: Option<&str>) -> Option<String> {
    raw.and_then(clean_scalar)
}

/// Coerces a cell into a boolean.
///
/// Blank input is `None`. Any non-blank value outside the accepted truthy
/// tokens is `Some(false)`, including garbage such as `"maybe"`.
pub fn coerce_boolean(raw: Option<&str>) -> Option<bool> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }
    let lowered = value.to_ascii_lowercase();
    Some(TRUE_TOKENS.contains(&lowered.as_str()))
}

/// Folds line breaks into spaces and collapses whitespace runs.
///
/// Meant for descriptions and titles. SQL fragments must not go through here.
pub fn collapse_whitespace(text: &str) -> Cow<'_, str> {
    let needs_work = text.contains(['\r', '\n', '\t'])
        || text.contains("  ")
        || text.trim().len() != text.len();
    if !needs_work {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Splits a cell that may list several values separated by newlines or commas.
pub fn split_multi_value_cell(raw: &str) -> Vec<String> {
    raw.lines()
        .flat_map(|line| line.split(','))
        .filter_map(clean_scalar)
        .collect()
}

/// Turns `customer_api_key` into `Customer API Key`.
pub fn titleize_identifier(name: &str) -> String {
    name.split(|ch: char| ch == '_' || ch.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lowered = part.to_lowercase();
            if ACRONYMS.contains(&lowered.as_str()) {
                lowered.to_uppercase()
            } else {
                let mut chars = lowered.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
