//! External PowerShell syntax check.
//!
//! The parser is `pwsh` itself, driven through
//! `[System.Management.Automation.Language.Parser]::ParseFile`. A missing
//! `pwsh` degrades to a Warning; it never fails the run.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::SyntaxConfig;
use crate::diagnostics::Collector;
use crate::rules::catalog::RuleId;
use crate::util::process::{kill_and_reap, wait_with_deadline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxOutcome {
    Valid,
    /// Parser reported errors; one message per line.
    Invalid(String),
    /// The parser program is not installed.
    ToolUnavailable(String),
    /// Timeout or any other failure to obtain a result.
    Failed(String),
}

impl SyntaxOutcome {
    pub fn record(&self, collector: &mut Collector) {
        let id = Some(RuleId::Syntax);
        match self {
            SyntaxOutcome::Valid => collector.info("PowerShell syntax is valid", id),
            SyntaxOutcome::Invalid(msg) => collector.error(format!("Syntax error: {msg}"), id),
            SyntaxOutcome::ToolUnavailable(program) => collector.warning(
                format!("PowerShell ({program}) not found - skipping syntax check"),
                id,
            ),
            SyntaxOutcome::Failed(msg) => {
                collector.warning(format!("Could not verify syntax: {msg}"), id)
            }
        }
    }
}

pub trait SyntaxChecker {
    fn check(&self, script: &Path) -> SyntaxOutcome;
}

#[derive(Debug, Clone)]
pub struct PwshSyntaxChecker {
    pub program: String,
    pub timeout: Duration,
}

impl PwshSyntaxChecker {
    pub fn from_config(cfg: &SyntaxConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            timeout: cfg.timeout(),
        }
    }
}

/// PowerShell command that parses `script` and writes each parse error
/// to stderr, exiting 1 when there are any.
pub fn parse_command(script: &Path) -> String {
    let quoted = script.display().to_string().replace('\'', "''");
    format!(
        "$errs = $null; \
         [System.Management.Automation.Language.Parser]::ParseFile('{quoted}', [ref]$null, [ref]$errs) | Out-Null; \
         if ($errs) {{ $errs | ForEach-Object {{ [Console]::Error.WriteLine($_.Message) }}; exit 1 }}"
    )
}

impl SyntaxChecker for PwshSyntaxChecker {
    fn check(&self, script: &Path) -> SyntaxOutcome {
        let spawned = Command::new(&self.program)
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(parse_command(script))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return SyntaxOutcome::ToolUnavailable(self.program.clone());
            }
            Err(e) => return SyntaxOutcome::Failed(format!("spawn `{}` failed: {e}", self.program)),
        };

        // Drain stderr on a side thread so a chatty parser cannot block on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let status = match wait_with_deadline(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill_and_reap(&mut child);
                return SyntaxOutcome::Failed(format!(
                    "`{}` timed out after {}ms",
                    self.program,
                    self.timeout.as_millis()
                ));
            }
            Err(e) => {
                kill_and_reap(&mut child);
                return SyntaxOutcome::Failed(format!("wait for `{}` failed: {e}", self.program));
            }
        };

        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        debug!(program = %self.program, ?status, "syntax check finished");
        interpret(status.code(), &stderr)
    }
}

fn interpret(code: Option<i32>, stderr: &str) -> SyntaxOutcome {
    let messages: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    match code {
        Some(0) => SyntaxOutcome::Valid,
        Some(1) if !messages.is_empty() => SyntaxOutcome::Invalid(messages.join("; ")),
        Some(code) => SyntaxOutcome::Failed(format!("exit code {code}: {}", messages.join("; "))),
        None => SyntaxOutcome::Failed("terminated by signal".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_tool_unavailable() {
        let checker = PwshSyntaxChecker {
            program: "psverify-no-such-pwsh".into(),
            timeout: Duration::from_secs(1),
        };
        let outcome = checker.check(Path::new("x.ps1"));
        assert_eq!(outcome, SyntaxOutcome::ToolUnavailable("psverify-no-such-pwsh".into()));
    }

    #[test]
    fn single_quotes_in_path_are_doubled() {
        let cmd = parse_command(Path::new("C:/it's/deploy.ps1"));
        assert!(cmd.contains("ParseFile('C:/it''s/deploy.ps1'"));
    }

    #[test]
    fn exit_codes_are_interpreted() {
        assert_eq!(interpret(Some(0), ""), SyntaxOutcome::Valid);
        assert_eq!(
            interpret(Some(1), "Missing closing '}'\nUnexpected token\n"),
            SyntaxOutcome::Invalid("Missing closing '}'; Unexpected token".into())
        );
        assert!(matches!(interpret(Some(1), ""), SyntaxOutcome::Failed(_)));
        assert!(matches!(interpret(None, ""), SyntaxOutcome::Failed(_)));
    }

    #[test]
    fn outcomes_map_to_severities() {
        let mut c = Collector::new();
        SyntaxOutcome::Valid.record(&mut c);
        SyntaxOutcome::Invalid("bad".into()).record(&mut c);
        SyntaxOutcome::ToolUnavailable("pwsh".into()).record(&mut c);
        SyntaxOutcome::Failed("timeout".into()).record(&mut c);

        let set = c.into_set();
        assert_eq!(set.info[0].message, "PowerShell syntax is valid");
        assert_eq!(set.errors[0].message, "Syntax error: bad");
        assert_eq!(set.warnings[0].message, "PowerShell (pwsh) not found - skipping syntax check");
        assert_eq!(set.warnings[1].message, "Could not verify syntax: timeout");
    }
}
