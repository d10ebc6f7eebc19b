//! Pattern helpers shared by the checks.
//!
//! Everything is case-insensitive. Patterns are compiled on each call;
//! there is no process-wide cache.

use regex::{Regex, RegexBuilder};

use crate::error::RuleError;

pub fn compile(pattern: &str) -> Result<Regex, RuleError> {
    build(pattern, true)
}

/// Case-sensitive variant, for the few checks where casing is the signal.
pub fn compile_exact(pattern: &str) -> Result<Regex, RuleError> {
    build(pattern, false)
}

fn build(pattern: &str, case_insensitive: bool) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| RuleError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

pub fn is_match(text: &str, pattern: &str) -> Result<bool, RuleError> {
    Ok(compile(pattern)?.is_match(text))
}

pub fn count(text: &str, pattern: &str) -> Result<usize, RuleError> {
    Ok(compile(pattern)?.find_iter(text).count())
}

/// First capture group of every match.
pub fn captures(text: &str, pattern: &str) -> Result<Vec<String>, RuleError> {
    let re = compile(pattern)?;
    Ok(re
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect())
}

pub fn contains_ci(text: &str, needle: &str) -> bool {
    text.to_lowercase().contains(&needle.to_lowercase())
}

/// Bodies of `keyword { ... }` blocks, brace-balanced.
///
/// `opener` must match up to and including the opening brace.
/// Unterminated blocks run to the end of the text.
pub fn blocks_after(text: &str, opener: &str) -> Result<Vec<String>, RuleError> {
    delimited_after(text, opener, '{', '}')
}

/// Bodies of `keyword ( ... )` groups, paren-balanced.
pub fn groups_after(text: &str, opener: &str) -> Result<Vec<String>, RuleError> {
    delimited_after(text, opener, '(', ')')
}

fn delimited_after(
    text: &str,
    opener: &str,
    open: char,
    close: char,
) -> Result<Vec<String>, RuleError> {
    let re = compile(opener)?;
    let mut out = Vec::new();
    for m in re.find_iter(text) {
        let body = &text[m.end()..];
        let mut depth = 1usize;
        let mut end = body.len();
        for (i, ch) in body.char_indices() {
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    end = i;
                    break;
                }
            }
        }
        out.push(body[..end].to_string());
    }
    Ok(out)
}
