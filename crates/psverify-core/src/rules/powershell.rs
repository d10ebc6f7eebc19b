//! PowerShell checks shared by the toolkit and PDQ verifiers, plus the
//! toolkit-only conventions (result logging, admin checks).

use crate::context::{Profile, Target, VerificationContext};
use crate::rules::catalog::{CheckResult, Finding};
use crate::rules::matchers;

const TRY_OPEN: &str = r"\btry\s*\{";
// `catch {`, `catch [Type] {`, `catch [A], [B] {`
const CATCH_OPEN: &str = r"\bcatch\s*(?:\[[^\]\n]*\]\s*,?\s*)*\{";
const FUNCTION_NAME: &str = r"(?m)^\s*function\s+([^\s{(]+)";

fn has_error_action(text: &str) -> Result<bool, crate::error::RuleError> {
    Ok(matchers::is_match(text, r"-ErrorAction\b")?
        || matchers::is_match(text, r"\$ErrorActionPreference")?)
}

pub fn function_names(text: &str) -> Result<Vec<String>, crate::error::RuleError> {
    matchers::captures(text, FUNCTION_NAME)
}

pub fn console_output(ctx: &VerificationContext) -> CheckResult {
    let n = matchers::count(&ctx.content, r"Write-Host\s+")?;
    if n == 0 {
        return Ok(vec![Finding::note(
            "Properly uses Write-Output instead of Write-Host",
        )]);
    }
    let msg = if ctx.profile == Some(Profile::Inventory) && ctx.target == Target::Pdq {
        format!(
            "CRITICAL: Found {n} Write-Host usage(s) in Inventory scanner. Console-only output \
             breaks structured data collection! Use Write-Output or return objects directly."
        )
    } else {
        format!(
            "Found {n} Write-Host usage(s). Console-only output bypasses the pipeline; \
             consider Write-Output or Write-Verbose."
        )
    };
    Ok(vec![Finding::violation(msg)])
}

pub fn try_catch_mismatch(ctx: &VerificationContext) -> CheckResult {
    let tries = matchers::count(&ctx.content, TRY_OPEN)?;
    let catches = matchers::count(&ctx.content, CATCH_OPEN)?;
    if tries == 0 && catches == 0 {
        return Ok(vec![]);
    }
    if tries != catches {
        return Ok(vec![Finding::violation(format!(
            "Mismatched try-catch blocks: {tries} try, {catches} catch"
        ))]);
    }
    Ok(vec![])
}

pub fn no_error_handling(ctx: &VerificationContext) -> CheckResult {
    let has_try = matchers::is_match(&ctx.content, TRY_OPEN)?;
    match ctx.target {
        // Toolkit scripts are expected to use try/catch regardless of
        // ErrorAction settings, which have their own check.
        Target::PowerShell => {
            if !has_try {
                return Ok(vec![Finding::violation(
                    "No try-catch blocks found - consider adding error handling",
                )]);
            }
        }
        _ => {
            if !has_try && !has_error_action(&ctx.content)? {
                return Ok(vec![Finding::violation(
                    "No error handling found (try-catch or -ErrorAction). \
                     Scripts should handle errors gracefully.",
                )]);
            }
        }
    }
    Ok(vec![])
}

/// Parses `0`, `1603`, `0x0`, `0x80070005`.
fn exit_code_value(raw: &str) -> Option<u64> {
    let lower = raw.to_ascii_lowercase();
    match lower.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => lower.parse().ok(),
    }
}

pub fn exit_codes(text: &str) -> Result<Vec<String>, crate::error::RuleError> {
    matchers::captures(text, r"\bexit\s+(0x[0-9a-f]+|\d+)\b")
}

pub fn success_only_exit(ctx: &VerificationContext) -> CheckResult {
    let codes = exit_codes(&ctx.content)?;
    if codes.is_empty() {
        return Ok(vec![]);
    }
    let has_success = codes.iter().any(|c| exit_code_value(c) == Some(0));
    let has_failure = codes.iter().any(|c| exit_code_value(c) != Some(0));
    let out = match (has_success, has_failure) {
        (true, true) => Finding::note(format!(
            "Uses exit codes properly ({} exit statements)",
            codes.len()
        )),
        (true, false) => Finding::violation(
            "Only success exit codes found. Consider adding failure exit codes.",
        ),
        _ => Finding::note("Exit codes found but no explicit success (exit 0)"),
    };
    Ok(vec![out])
}

pub fn param_validation(ctx: &VerificationContext) -> CheckResult {
    let blocks = matchers::groups_after(&ctx.content, r"\bparam\s*\(")?;
    if blocks.is_empty() {
        return Ok(vec![]);
    }
    let has_binding = matchers::is_match(&ctx.content, r"\[CmdletBinding\s*\(")?;
    let validated = blocks
        .iter()
        .filter(|b| matchers::contains_ci(b, "[Parameter") || matchers::contains_ci(b, "[Validate"))
        .count();

    let mut out = Vec::new();
    if !has_binding {
        out.push(Finding::violation(
            "param() block found but no [CmdletBinding()]. \
             Add [CmdletBinding()] for advanced function features.",
        ));
    }
    if validated == 0 {
        out.push(Finding::violation("No parameter validation attributes found"));
    } else if has_binding {
        out.push(Finding::note(format!(
            "Found {validated} parameter validation block(s)"
        )));
    }
    Ok(out)
}

pub fn naming_convention(ctx: &VerificationContext) -> CheckResult {
    let names = function_names(&ctx.content)?;
    if names.is_empty() {
        return Ok(vec![]);
    }
    let casing = matchers::compile_exact(r"^[A-Z][a-z]+-[A-Z]")?;
    let issues: Vec<String> = names
        .iter()
        .filter_map(|name| {
            if !name.contains('-') {
                Some(format!("{name} (missing verb-noun format)"))
            } else if !casing.is_match(name) {
                Some(format!("{name} (non-standard casing)"))
            } else {
                None
            }
        })
        .collect();

    if issues.is_empty() {
        return Ok(vec![Finding::note(format!(
            "Function naming follows conventions ({} functions)",
            names.len()
        ))]);
    }
    let shown: Vec<&str> = issues.iter().take(3).map(String::as_str).collect();
    let mut msg = format!("Function naming issues: {}", shown.join(", "));
    if issues.len() > shown.len() {
        msg.push_str(&format!(" (and {} more)", issues.len() - shown.len()));
    }
    Ok(vec![Finding::violation(msg)])
}

pub fn no_error_action(ctx: &VerificationContext) -> CheckResult {
    if has_error_action(&ctx.content)? {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation("No ErrorAction settings found")])
}

const LOGGING_CALLS: &[&str] = &["Add-ToolResult", "Write-Error", "Write-Warning", "Write-Host"];

pub fn silent_catch(ctx: &VerificationContext) -> CheckResult {
    let blocks = matchers::blocks_after(&ctx.content, CATCH_OPEN)?;
    Ok(blocks
        .iter()
        .enumerate()
        .filter(|(_, body)| !LOGGING_CALLS.iter().any(|c| matchers::contains_ci(body, c)))
        .map(|(i, _)| Finding::violation(format!("Catch block #{} doesn't log errors", i + 1)))
        .collect())
}

const ADMIN_OPERATIONS: &[(&str, &str)] = &[
    (r"\bSet-ItemProperty\b", "Set-ItemProperty"),
    (r"\bNew-Item\b[^\n]*HKLM", "New-Item HKLM"),
    (r"\bDISM\b", "DISM"),
    (r"\bSFC\b", "SFC"),
    (r"\bEnable-PSRemoting\b", "Enable-PSRemoting"),
    (r"\bSet-Service\b", "Set-Service"),
    (r"\bStop-Service\b", "Stop-Service"),
    (r"\bStart-Service\b", "Start-Service"),
    (r"\bRestart-Computer\b", "Restart-Computer"),
    (r"\bCheckpoint-Computer\b", "Checkpoint-Computer"),
];

pub fn admin_check(ctx: &VerificationContext) -> CheckResult {
    let mut used = Vec::new();
    for (pattern, label) in ADMIN_OPERATIONS {
        if matchers::is_match(&ctx.content, pattern)? {
            used.push(*label);
        }
    }
    if used.is_empty() {
        return Ok(vec![]);
    }
    if matchers::contains_ci(&ctx.content, "Test-IsAdmin") {
        return Ok(vec![Finding::note("Admin privilege checks found")]);
    }
    let shown: Vec<&str> = used.into_iter().take(3).collect();
    Ok(vec![Finding::violation(format!(
        "Script uses admin operations ({}) but doesn't check for admin privileges with Test-IsAdmin",
        shown.join(", ")
    ))])
}

fn logging_counts(text: &str) -> Result<(usize, usize), crate::error::RuleError> {
    let functions = function_names(text)?.len();
    let calls = matchers::count(text, r"Add-ToolResult")?;
    Ok((functions, calls))
}

pub fn result_logging_missing(ctx: &VerificationContext) -> CheckResult {
    let (functions, calls) = logging_counts(&ctx.content)?;
    if functions > 0 && calls == 0 {
        return Ok(vec![Finding::violation(
            "No Add-ToolResult calls found - tools must log results",
        )]);
    }
    Ok(vec![])
}

pub fn result_logging_sparse(ctx: &VerificationContext) -> CheckResult {
    let (functions, calls) = logging_counts(&ctx.content)?;
    if functions == 0 || calls == 0 {
        return Ok(vec![]);
    }
    if calls * 2 < functions {
        return Ok(vec![Finding::violation(format!(
            "Only {calls} Add-ToolResult calls for {functions} functions - ensure all tools log results"
        ))]);
    }
    Ok(vec![Finding::note(format!("Found {calls} result logging calls"))])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdq(text: &str, profile: Option<Profile>) -> VerificationContext {
        VerificationContext::new("t.ps1", text, Target::Pdq).with_profile(profile)
    }

    fn toolkit(text: &str) -> VerificationContext {
        VerificationContext::new("t.ps1", text, Target::PowerShell)
    }

    fn violations(out: &[Finding]) -> Vec<&str> {
        out.iter()
            .filter_map(|f| match f {
                Finding::Violation(m) => Some(m.as_str()),
                Finding::Note(_) => None,
            })
            .collect()
    }

    #[test]
    fn write_host_message_depends_on_profile() {
        let text = "Write-Host 'a'\nWrite-Host 'b'\n";
        let inv = console_output(&pdq(text, Some(Profile::Inventory))).unwrap();
        assert!(violations(&inv)[0].starts_with("CRITICAL: Found 2"));
        assert!(violations(&inv)[0].contains("Console-only output"));

        let dep = console_output(&pdq(text, Some(Profile::Deploy))).unwrap();
        assert!(violations(&dep)[0].starts_with("Found 2"));
    }

    #[test]
    fn no_write_host_is_a_note() {
        let out = console_output(&pdq("Write-Output 'x'", None)).unwrap();
        assert!(violations(&out).is_empty());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn three_try_two_catch_is_one_mismatch() {
        let text = "try { a } catch { b }\ntry { c } catch { d }\ntry { e } finally { f }\n";
        let out = try_catch_mismatch(&pdq(text, None)).unwrap();
        assert_eq!(violations(&out), vec!["Mismatched try-catch blocks: 3 try, 2 catch"]);
    }

    #[test]
    fn typed_catch_counts_as_catch() {
        let text = "try { a } catch [System.IO.IOException] { b }";
        assert!(try_catch_mismatch(&pdq(text, None)).unwrap().is_empty());
    }

    #[test]
    fn error_action_satisfies_pdq_but_not_toolkit() {
        let text = "Get-Item x -ErrorAction Stop";
        assert!(no_error_handling(&pdq(text, Some(Profile::Deploy))).unwrap().is_empty());
        assert_eq!(violations(&no_error_handling(&toolkit(text)).unwrap()).len(), 1);
        assert!(no_error_action(&toolkit(text)).unwrap().is_empty());
    }

    #[test]
    fn missing_handling_is_reported() {
        let out = no_error_handling(&pdq("Get-Date", None)).unwrap();
        assert!(violations(&out)[0].starts_with("No error handling found"));
    }

    #[test]
    fn exit_code_classification() {
        let both = success_only_exit(&pdq("exit 0\nexit 1603", None)).unwrap();
        assert!(violations(&both).is_empty());

        let only_ok = success_only_exit(&pdq("exit 0\nexit 0x0", None)).unwrap();
        assert_eq!(violations(&only_ok).len(), 1);

        let none = success_only_exit(&pdq("Get-Date", None)).unwrap();
        assert!(none.is_empty());

        let failure_only = success_only_exit(&pdq("exit 0x80070005", None)).unwrap();
        assert!(violations(&failure_only).is_empty());
    }

    #[test]
    fn param_without_binding_or_validation() {
        let out = param_validation(&pdq("param($Name)\nWrite-Output $Name", None)).unwrap();
        assert_eq!(violations(&out).len(), 2);
    }

    #[test]
    fn param_with_binding_and_validation_is_clean() {
        let text = "[CmdletBinding()]\nparam([Parameter(Mandatory)][ValidateNotNull()]$Name)";
        let out = param_validation(&pdq(text, None)).unwrap();
        assert!(violations(&out).is_empty());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn no_param_block_reports_nothing() {
        assert!(param_validation(&pdq("Get-Date", None)).unwrap().is_empty());
    }

    #[test]
    fn naming_issues_are_listed() {
        let text = "function Get-Thing {}\nfunction dothing {}\nfunction get-other {}\n";
        let out = naming_convention(&pdq(text, None)).unwrap();
        let v = violations(&out);
        assert_eq!(v.len(), 1);
        assert!(v[0].contains("dothing (missing verb-noun format)"));
        assert!(v[0].contains("get-other (non-standard casing)"));
        assert!(!v[0].contains("Get-Thing"));
    }

    #[test]
    fn naming_ignores_prose_mentioning_function() {
        let text = "# this function returns data\nfunction Get-Data { }\n";
        let out = naming_convention(&pdq(text, None)).unwrap();
        assert!(violations(&out).is_empty());
    }

    #[test]
    fn naming_overflow_is_summarized() {
        let text = "function a {}\nfunction b {}\nfunction c {}\nfunction d {}\n";
        let out = naming_convention(&pdq(text, None)).unwrap();
        assert!(violations(&out)[0].ends_with("(and 1 more)"));
    }

    #[test]
    fn silent_catch_blocks_are_numbered() {
        let text = "try { a } catch { Write-Error $_ }\ntry { b } catch { $null = 1 }\n";
        let out = silent_catch(&toolkit(text)).unwrap();
        assert_eq!(violations(&out), vec!["Catch block #2 doesn't log errors"]);
    }

    #[test]
    fn admin_operations_need_test_isadmin() {
        let text = "Stop-Service spooler\nRestart-Computer";
        let out = admin_check(&toolkit(text)).unwrap();
        assert!(violations(&out)[0].contains("Stop-Service, Restart-Computer"));

        let guarded = format!("if (-not (Test-IsAdmin)) {{ return }}\n{text}");
        assert!(violations(&admin_check(&toolkit(&guarded)).unwrap()).is_empty());
    }

    #[test]
    fn result_logging_rules() {
        let none = "function Get-A { }\nfunction Get-B { }\n";
        assert_eq!(violations(&result_logging_missing(&toolkit(none)).unwrap()).len(), 1);
        assert!(result_logging_sparse(&toolkit(none)).unwrap().is_empty());

        let sparse = "function Get-A { Add-ToolResult }\nfunction Get-B { }\nfunction Get-C { }\n";
        assert!(result_logging_missing(&toolkit(sparse)).unwrap().is_empty());
        assert_eq!(violations(&result_logging_sparse(&toolkit(sparse)).unwrap()).len(), 1);

        let full = "function Get-A { Add-ToolResult }\nfunction Get-B { Add-ToolResult }\n";
        assert!(violations(&result_logging_sparse(&toolkit(full)).unwrap()).is_empty());
    }

    #[test]
    fn empty_text_is_harmless() {
        let ctx = pdq("", Some(Profile::Deploy));
        assert!(try_catch_mismatch(&ctx).unwrap().is_empty());
        assert!(naming_convention(&ctx).unwrap().is_empty());
        assert!(silent_catch(&ctx).unwrap().is_empty());
        assert!(success_only_exit(&ctx).unwrap().is_empty());
    }
}
