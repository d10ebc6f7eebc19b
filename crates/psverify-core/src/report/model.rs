use serde::{Deserialize, Serialize};

use crate::SCHEMA_VERSION;
use crate::context::{Profile, ProfileSource, Target};
use crate::detect::DetectionScores;
use crate::diagnostics::DiagnosticSet;
use crate::rules::catalog::RuleId;
use crate::rules::classify::{Verdict, classify};
use crate::verify::Stage;

/// Top-level verification report.
///
/// This struct is the JSON contract of `--format json`. It carries no
/// timestamps, so identical input yields byte-identical output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub script: ScriptInfo,
    pub target: Target,
    pub profile: ProfileInfo,
    pub rules: RulesInfo,
    pub diagnostics: DiagnosticSet,
    pub verdict: Verdict,
    pub stage: Stage,
}

impl Report {
    /// Assemble a report; the verdict is derived from `diagnostics`.
    pub fn new(
        tool: ToolInfo,
        script: ScriptInfo,
        target: Target,
        profile: ProfileInfo,
        rules: RulesInfo,
        diagnostics: DiagnosticSet,
        stage: Stage,
    ) -> Self {
        let verdict = classify(&diagnostics);
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tool,
            script,
            target,
            profile,
            rules,
            diagnostics,
            verdict,
            stage,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }
}

/// Tool metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
    pub commit: Option<String>,
}

/// Script metadata bound to this report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInfo {
    pub path: String,
    pub size_bytes: u64,
    /// Absent when the file could not be read.
    pub hash: Option<ScriptHash>,
}

impl ScriptInfo {
    pub fn unread(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size_bytes: 0,
            hash: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptHash {
    pub algorithm: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub profile: Option<Profile>,
    pub source: ProfileSource,
    pub scores: Option<DetectionScores>,
}

impl ProfileInfo {
    pub fn not_applicable() -> Self {
        Self {
            profile: None,
            source: ProfileSource::NotApplicable,
            scores: None,
        }
    }
}

/// Which rules ran.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesInfo {
    pub catalog_version: String,
    pub evaluated: Vec<RuleId>,
    /// Rules whose check could not complete; each also left a Warning.
    pub failed: Vec<RuleId>,
}
