//! Checks that apply to every target.

use crate::context::VerificationContext;
use crate::rules::catalog::{CheckResult, Finding};
use crate::rules::matchers;

const SECRET_PATTERNS: &[(&str, &str)] = &[
    (
        r#"(password|secret|api_key)\s*=\s*["'][^"'\n]+["']"#,
        "Possible hardcoded password or secret",
    ),
    (
        r#"ConvertTo-SecureString\s+(-String\s+)?["'][^"'\n]+["']"#,
        "Possible hardcoded secure string",
    ),
    (
        r#"New-Object[^\n]*PSCredential[^\n]*["'][^"'\n]+["']"#,
        "Possible hardcoded credential",
    ),
];

pub fn embedded_secrets(ctx: &VerificationContext) -> CheckResult {
    let mut found = Vec::new();
    for (pattern, label) in SECRET_PATTERNS {
        if matchers::is_match(&ctx.content, pattern)? {
            found.push(*label);
        }
    }
    if found.is_empty() {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(format!(
        "Possible hardcoded credentials found: {}",
        found.join("; ")
    ))])
}

// Parameterized queries (`execute("... %s", args)`) are not flagged;
// only text that is formatted before it reaches the call.
const SQL_PATTERNS: &[&str] = &[
    r#"execute(many)?\s*\(\s*f["']"#,
    r#"execute(many)?\s*\(\s*["'][^"'\n]*["']\s*(%|\+|\.format\()"#,
    r#"-Query\s+"[^"\n]*\$[A-Za-z_({]"#,
];

pub fn sql_injection(ctx: &VerificationContext) -> CheckResult {
    for pattern in SQL_PATTERNS {
        if matchers::is_match(&ctx.content, pattern)? {
            return Ok(vec![Finding::violation(
                "Possible SQL injection vulnerability detected: query text is formatted \
                 before being passed to an execute call",
            )]);
        }
    }
    Ok(vec![])
}
