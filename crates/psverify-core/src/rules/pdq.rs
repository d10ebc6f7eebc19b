//! Checks specific to PDQ Deploy, Inventory and Connect scripts.
//!
//! Scripts run headless under a service account, so anything that waits
//! for a person (prompts, dialogs) hangs the job until it times out.

use crate::context::VerificationContext;
use crate::error::RuleError;
use crate::rules::catalog::{CheckResult, Finding};
use crate::rules::matchers;
use crate::rules::powershell::exit_codes;

pub fn exit_code_missing(ctx: &VerificationContext) -> CheckResult {
    if !exit_codes(&ctx.content)?.is_empty() {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(
        "No explicit exit codes found. PDQ Deploy uses exit codes to determine success. \
         Consider adding 'exit 0' on success and 'exit 1' on failure.",
    )])
}

pub fn catch_without_exit(ctx: &VerificationContext) -> CheckResult {
    let blocks = matchers::blocks_after(&ctx.content, r"\bcatch\s*(?:\[[^\]\n]*\]\s*,?\s*)*\{")?;
    if blocks.is_empty() {
        return Ok(vec![]);
    }
    let exits = matchers::compile(r"\b(exit|throw)\b")?;
    if blocks.iter().any(|b| exits.is_match(b)) {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(
        "Catch blocks don't exit with error code. \
         Consider adding 'exit 1' in catch blocks for PDQ Deploy.",
    )])
}

/// `Get-Credential -Message ...` is treated as a deliberate, documented
/// prompt; bare calls are flagged.
fn bare_get_credential(text: &str) -> Result<bool, RuleError> {
    let re = matchers::compile(r"Get-Credential\b([ \t]+-Message)?")?;
    Ok(re.captures_iter(text).any(|c| c.get(1).is_none()))
}

const PROMPT_PATTERNS: &[(&str, &str)] = &[
    (r"\$Host\.UI\.Prompt", "$Host.UI.Prompt will hang PDQ"),
    (r"\[Console\]::Read(Key|Line)\b", "[Console]::ReadKey/ReadLine will hang PDQ"),
    (
        r"(?m)(^|[;{|]|\bcmd(\.exe)?\s+/c)\s*pause\b",
        "'pause' command will hang PDQ",
    ),
];

pub fn interactive_prompts(ctx: &VerificationContext) -> CheckResult {
    let mut found = Vec::new();
    if matchers::is_match(&ctx.content, r"\bRead-Host\b")? {
        found.push("Read-Host will hang PDQ - use parameters instead");
    }
    if bare_get_credential(&ctx.content)? {
        found.push("Get-Credential without parameters will hang PDQ");
    }
    for (pattern, message) in PROMPT_PATTERNS {
        if matchers::is_match(&ctx.content, pattern)? {
            found.push(*message);
        }
    }
    if found.is_empty() {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(format!(
        "Interactive commands found (will hang PDQ): {}",
        found.join("; ")
    ))])
}

const GUI_PATTERNS: &[(&str, &str)] = &[
    (r"System\.Windows\.Forms", "Windows Forms won't work in PDQ (no GUI)"),
    (r"\.ShowDialog\(\)", "ShowDialog() won't work in PDQ (no GUI)"),
    (r"\[(System\.)?Windows\.MessageBox\]", "MessageBox won't work in PDQ (no GUI)"),
    (r"\bOut-GridView\b", "Out-GridView won't work in PDQ (no GUI)"),
    (r"\bMsgBox\b", "MsgBox won't work in PDQ (no GUI)"),
];

pub fn gui_elements(ctx: &VerificationContext) -> CheckResult {
    let mut found = Vec::new();
    for (pattern, message) in GUI_PATTERNS {
        if matchers::is_match(&ctx.content, pattern)? {
            found.push(*message);
        }
    }
    if found.is_empty() {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(format!(
        "GUI elements found (won't work in PDQ): {}",
        found.join("; ")
    ))])
}

const SHARED_PROFILES: &[&str] = &["public", "default", "all users"];

pub fn hardcoded_paths(ctx: &VerificationContext) -> CheckResult {
    let user_dir = matchers::compile(r#"["'](C:\\Users\\([^"'\\\n]+))"#)?;
    let other_drive = matchers::compile(r#"["']([D-Z]:\\[^"'\n]*)"#)?;

    let mut found: Vec<String> = Vec::new();
    let mut push = |p: &str| {
        if !found.iter().any(|f| f == p) {
            found.push(p.to_string());
        }
    };
    for c in user_dir.captures_iter(&ctx.content) {
        let user = c.get(2).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        if SHARED_PROFILES.contains(&user.as_str()) {
            continue;
        }
        if let Some(m) = c.get(1) {
            push(m.as_str());
        }
    }
    for c in other_drive.captures_iter(&ctx.content) {
        if let Some(m) = c.get(1) {
            push(m.as_str());
        }
    }
    if found.is_empty() {
        return Ok(vec![]);
    }
    let shown: Vec<&str> = found.iter().take(3).map(String::as_str).collect();
    Ok(vec![Finding::violation(format!(
        "Hardcoded paths found: {}. Consider using environment variables or parameters.",
        shown.join(", ")
    ))])
}

pub fn session_cleanup(ctx: &VerificationContext) -> CheckResult {
    let mut out = Vec::new();
    let families = [
        (r"\b(New|Get)-PSSession\b", r"\bRemove-PSSession\b", "PS Sessions", "Remove-PSSession"),
        (r"\bNew-CimSession\b", r"\bRemove-CimSession\b", "CIM sessions", "Remove-CimSession"),
    ];
    for (open, close, label, cleanup) in families {
        if !matchers::is_match(&ctx.content, open)? {
            continue;
        }
        if matchers::is_match(&ctx.content, close)? {
            out.push(Finding::note(format!("{label} are properly cleaned up")));
        } else {
            out.push(Finding::violation(format!(
                "{label} created but not removed. Add {cleanup} cleanup."
            )));
        }
    }
    Ok(out)
}

pub fn structured_output(ctx: &VerificationContext) -> CheckResult {
    let typed = matchers::is_match(&ctx.content, r"\[pscustomobject\]")?;
    let constructed = matchers::is_match(&ctx.content, r"New-Object[^\n]*PSCustomObject")?;
    if typed || constructed {
        return Ok(vec![Finding::note(
            "Properly returns structured objects for Inventory",
        )]);
    }
    Ok(vec![Finding::violation(
        "No PSCustomObject output detected. Inventory scanners should return structured objects.",
    )])
}

pub fn silent_install(ctx: &VerificationContext) -> CheckResult {
    let silent = matchers::is_match(
        &ctx.content,
        r"(?:^|[\s'\x22])(?:/|--?)(?:s|q|qn|qb!?|quiet|silent|verysilent|passive)\b",
    )?;
    if silent {
        return Ok(vec![Finding::note("Silent installation parameters found")]);
    }
    Ok(vec![Finding::violation(
        "No silent installation parameters detected. Installations should run silently in PDQ Deploy.",
    )])
}

pub fn install_verification(ctx: &VerificationContext) -> CheckResult {
    if matchers::is_match(&ctx.content, r"\b(Test-Path|Get-Item)\b")? {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(
        "No installation verification detected. Consider verifying the installation succeeded.",
    )])
}
