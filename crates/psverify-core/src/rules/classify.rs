//! Verdict derivation.
//!
//! Responsibilities:
//! - Turn the final diagnostic sequences into a pass/fail verdict
//! - Compute the process exit code
//!
//! Non-responsibilities:
//! - Running rules (handled in `rules::eval`)
//! - Rendering the verdict
//!
//! The policy is one line: the run passes iff no Error was recorded.
//! Warnings and Info never change the outcome.

use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VerdictStatus::Pass => "PASS",
            VerdictStatus::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    pub exit_code: i32,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.status == VerdictStatus::Pass
    }
}

/// Exit code mapping:
/// - PASS → 0
/// - FAIL → 1
pub fn classify(set: &DiagnosticSet) -> Verdict {
    let status = if set.errors.is_empty() {
        VerdictStatus::Pass
    } else {
        VerdictStatus::Fail
    };

    let exit_code = match status {
        VerdictStatus::Pass => 0,
        VerdictStatus::Fail => 1,
    };

    Verdict {
        status,
        error_count: set.errors.len(),
        warning_count: set.warnings.len(),
        info_count: set.info.len(),
        exit_code,
    }
}
