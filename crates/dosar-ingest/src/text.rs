//! Small text helpers shared by the parsers and the unknown-signature
//! aggregation.

use once_cell::sync::Lazy;
use regex::Regex;

static DIGIT_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Parse a human-written amount into a minor-unit-less integer by keeping
/// only the digits. Thousands separators (`.`) and decimal commas are both
/// discarded; an empty or digit-free input is zero.
pub fn parse_amount(value: &str) -> i64 {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Normalize a payload line into its aggregation signature: digit runs
/// collapse to `<#>`, whitespace squashes to single spaces, everything
/// lowercased. Idempotent.
pub fn normalize_signature(text: &str) -> String {
    let collapsed = DIGIT_RUNS.replace_all(text, "<#>");
    let squashed = WHITESPACE_RUNS.replace_all(&collapsed, " ");
    squashed.trim().to_lowercase()
}
