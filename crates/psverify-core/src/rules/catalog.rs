//! Rule catalog.
//!
//! Every check is a row of `RULES`: an identifier, a title, the targets it
//! belongs to, a severity per context column and a pure check function.
//! A `None` column means the rule does not apply in that context and is
//! not run there. The table order is the execution order: rules with a
//! Generic column (the universal set) come first.

use serde::{Deserialize, Serialize};

use crate::context::{Profile, Target, VerificationContext};
use crate::diagnostics::Severity;
use crate::error::RuleError;
use crate::rules::{flask, pdq, powershell, shared};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleId {
    #[serde(rename = "SEC-CRED-01")]
    EmbeddedSecret,
    #[serde(rename = "SEC-SQL-01")]
    SqlInjection,
    #[serde(rename = "PS-OUT-01")]
    ConsoleOutput,
    #[serde(rename = "PS-ERR-01")]
    TryCatchMismatch,
    #[serde(rename = "PS-ERR-02")]
    NoErrorHandling,
    #[serde(rename = "PS-EXIT-02")]
    SuccessOnlyExit,
    #[serde(rename = "PS-PARAM-01")]
    ParamValidation,
    #[serde(rename = "PS-NAME-01")]
    NamingConvention,
    #[serde(rename = "PS-ERR-03")]
    NoErrorAction,
    #[serde(rename = "PS-ERR-04")]
    SilentCatch,
    #[serde(rename = "PS-ADMIN-01")]
    AdminCheck,
    #[serde(rename = "PS-LOG-01")]
    ResultLoggingMissing,
    #[serde(rename = "PS-LOG-02")]
    ResultLoggingSparse,
    #[serde(rename = "FLASK-IMPORT-01")]
    FlaskImports,
    #[serde(rename = "FLASK-APP-01")]
    FlaskAppInit,
    #[serde(rename = "FLASK-APP-02")]
    FlaskDebug,
    #[serde(rename = "FLASK-APP-03")]
    FlaskHostBinding,
    #[serde(rename = "FLASK-ROUTE-01")]
    FlaskNoRoutes,
    #[serde(rename = "FLASK-ROUTE-02")]
    FlaskExpectedEndpoints,
    #[serde(rename = "FLASK-ERR-01")]
    FlaskRouteErrors,
    #[serde(rename = "FLASK-CMD-01")]
    FlaskCommandInjection,
    #[serde(rename = "FLASK-CORS-01")]
    FlaskCors,
    #[serde(rename = "PS-EXIT-01")]
    ExitCodeMissing,
    #[serde(rename = "PS-ERR-05")]
    CatchWithoutExit,
    #[serde(rename = "PS-INT-01")]
    InteractivePrompt,
    #[serde(rename = "PS-GUI-01")]
    GuiElement,
    #[serde(rename = "PS-PATH-01")]
    HardcodedPath,
    #[serde(rename = "PS-SESS-01")]
    SessionCleanup,
    #[serde(rename = "PS-OBJ-01")]
    StructuredOutput,
    #[serde(rename = "PDQ-DEPLOY-01")]
    SilentInstall,
    #[serde(rename = "PDQ-DEPLOY-02")]
    InstallVerification,
    /// External PowerShell parser.
    #[serde(rename = "PS-SYN-01")]
    Syntax,
    /// Live endpoint probing.
    #[serde(rename = "LIVE-01")]
    LiveProbe,
    /// Script content could not be decoded as text.
    #[serde(rename = "SRC-READ-01")]
    Unreadable,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::EmbeddedSecret => "SEC-CRED-01",
            RuleId::SqlInjection => "SEC-SQL-01",
            RuleId::ConsoleOutput => "PS-OUT-01",
            RuleId::TryCatchMismatch => "PS-ERR-01",
            RuleId::NoErrorHandling => "PS-ERR-02",
            RuleId::SuccessOnlyExit => "PS-EXIT-02",
            RuleId::ParamValidation => "PS-PARAM-01",
            RuleId::NamingConvention => "PS-NAME-01",
            RuleId::NoErrorAction => "PS-ERR-03",
            RuleId::SilentCatch => "PS-ERR-04",
            RuleId::AdminCheck => "PS-ADMIN-01",
            RuleId::ResultLoggingMissing => "PS-LOG-01",
            RuleId::ResultLoggingSparse => "PS-LOG-02",
            RuleId::FlaskImports => "FLASK-IMPORT-01",
            RuleId::FlaskAppInit => "FLASK-APP-01",
            RuleId::FlaskDebug => "FLASK-APP-02",
            RuleId::FlaskHostBinding => "FLASK-APP-03",
            RuleId::FlaskNoRoutes => "FLASK-ROUTE-01",
            RuleId::FlaskExpectedEndpoints => "FLASK-ROUTE-02",
            RuleId::FlaskRouteErrors => "FLASK-ERR-01",
            RuleId::FlaskCommandInjection => "FLASK-CMD-01",
            RuleId::FlaskCors => "FLASK-CORS-01",
            RuleId::ExitCodeMissing => "PS-EXIT-01",
            RuleId::CatchWithoutExit => "PS-ERR-05",
            RuleId::InteractivePrompt => "PS-INT-01",
            RuleId::GuiElement => "PS-GUI-01",
            RuleId::HardcodedPath => "PS-PATH-01",
            RuleId::SessionCleanup => "PS-SESS-01",
            RuleId::StructuredOutput => "PS-OBJ-01",
            RuleId::SilentInstall => "PDQ-DEPLOY-01",
            RuleId::InstallVerification => "PDQ-DEPLOY-02",
            RuleId::Syntax => "PS-SYN-01",
            RuleId::LiveProbe => "LIVE-01",
            RuleId::Unreadable => "SRC-READ-01",
        }
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a check reports. Violations take the severity of the active
/// column; notes are always Info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Violation(String),
    Note(String),
}

impl Finding {
    pub fn violation(msg: impl Into<String>) -> Self {
        Finding::Violation(msg.into())
    }

    pub fn note(msg: impl Into<String>) -> Self {
        Finding::Note(msg.into())
    }
}

pub type CheckResult = Result<Vec<Finding>, RuleError>;
pub type CheckFn = fn(&VerificationContext) -> CheckResult;

/// One optional severity per context column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityMatrix {
    pub generic: Option<Severity>,
    pub deploy: Option<Severity>,
    pub inventory: Option<Severity>,
    pub connect: Option<Severity>,
}

impl SeverityMatrix {
    pub const fn new(
        generic: Option<Severity>,
        deploy: Option<Severity>,
        inventory: Option<Severity>,
        connect: Option<Severity>,
    ) -> Self {
        Self {
            generic,
            deploy,
            inventory,
            connect,
        }
    }

    pub const fn uniform(sev: Severity) -> Self {
        Self::new(Some(sev), Some(sev), Some(sev), Some(sev))
    }

    pub const fn generic_only(sev: Severity) -> Self {
        Self::new(Some(sev), None, None, None)
    }

    /// Severity in the column for `profile`; `None` profile is the
    /// Generic column.
    pub fn for_profile(&self, profile: Option<Profile>) -> Option<Severity> {
        match profile {
            None => self.generic,
            Some(Profile::Deploy) => self.deploy,
            Some(Profile::Inventory) => self.inventory,
            Some(Profile::Connect) => self.connect,
        }
    }
}

pub struct RuleDef {
    pub id: RuleId,
    pub title: &'static str,
    pub targets: &'static [Target],
    pub severity: SeverityMatrix,
    pub check: CheckFn,
}

impl RuleDef {
    /// Severity this rule reports with, or `None` when it does not apply.
    pub fn severity_in(&self, target: Target, profile: Option<Profile>) -> Option<Severity> {
        if !self.targets.contains(&target) {
            return None;
        }
        // Profiles only exist for PDQ; other targets use the Generic column.
        let column = if target == Target::Pdq { profile } else { None };
        self.severity.for_profile(column)
    }

    pub fn is_universal(&self) -> bool {
        self.severity.generic.is_some()
    }
}

impl std::fmt::Debug for RuleDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDef")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("targets", &self.targets)
            .field("severity", &self.severity)
            .finish()
    }
}

const E: Option<Severity> = Some(Severity::Error);
const W: Option<Severity> = Some(Severity::Warning);
const NA: Option<Severity> = None;

const ALL_TARGETS: &[Target] = &[Target::PowerShell, Target::Pdq, Target::Flask];
const POWERSHELL_FAMILY: &[Target] = &[Target::PowerShell, Target::Pdq];
const TOOLKIT: &[Target] = &[Target::PowerShell];
const PDQ: &[Target] = &[Target::Pdq];
const FLASK: &[Target] = &[Target::Flask];

pub static RULES: &[RuleDef] = &[
    // Universal set.
    RuleDef {
        id: RuleId::EmbeddedSecret,
        title: "Embedded secret literal",
        targets: ALL_TARGETS,
        severity: SeverityMatrix::uniform(Severity::Error),
        check: shared::embedded_secrets,
    },
    RuleDef {
        id: RuleId::SqlInjection,
        title: "SQL built by string formatting",
        targets: ALL_TARGETS,
        severity: SeverityMatrix::uniform(Severity::Error),
        check: shared::sql_injection,
    },
    RuleDef {
        id: RuleId::ConsoleOutput,
        title: "Console-only output",
        targets: POWERSHELL_FAMILY,
        severity: SeverityMatrix::new(W, W, E, W),
        check: powershell::console_output,
    },
    RuleDef {
        id: RuleId::TryCatchMismatch,
        title: "Mismatched try/catch blocks",
        targets: POWERSHELL_FAMILY,
        severity: SeverityMatrix::uniform(Severity::Error),
        check: powershell::try_catch_mismatch,
    },
    RuleDef {
        id: RuleId::NoErrorHandling,
        title: "No error handling",
        targets: POWERSHELL_FAMILY,
        severity: SeverityMatrix::uniform(Severity::Warning),
        check: powershell::no_error_handling,
    },
    RuleDef {
        id: RuleId::SuccessOnlyExit,
        title: "Only success exit codes",
        targets: PDQ,
        severity: SeverityMatrix::uniform(Severity::Warning),
        check: powershell::success_only_exit,
    },
    RuleDef {
        id: RuleId::ParamValidation,
        title: "Parameter block without binding or validation",
        targets: POWERSHELL_FAMILY,
        severity: SeverityMatrix::uniform(Severity::Warning),
        check: powershell::param_validation,
    },
    RuleDef {
        id: RuleId::NamingConvention,
        title: "Function naming convention",
        targets: POWERSHELL_FAMILY,
        severity: SeverityMatrix::uniform(Severity::Warning),
        check: powershell::naming_convention,
    },
    // Toolkit scripts.
    RuleDef {
        id: RuleId::NoErrorAction,
        title: "No ErrorAction setting",
        targets: TOOLKIT,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: powershell::no_error_action,
    },
    RuleDef {
        id: RuleId::SilentCatch,
        title: "Catch block does not log",
        targets: TOOLKIT,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: powershell::silent_catch,
    },
    RuleDef {
        id: RuleId::AdminCheck,
        title: "Admin operations without privilege check",
        targets: TOOLKIT,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: powershell::admin_check,
    },
    RuleDef {
        id: RuleId::ResultLoggingMissing,
        title: "No result logging",
        targets: TOOLKIT,
        severity: SeverityMatrix::generic_only(Severity::Error),
        check: powershell::result_logging_missing,
    },
    RuleDef {
        id: RuleId::ResultLoggingSparse,
        title: "Sparse result logging",
        targets: TOOLKIT,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: powershell::result_logging_sparse,
    },
    // Flask applications.
    RuleDef {
        id: RuleId::FlaskImports,
        title: "Required imports",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: flask::required_imports,
    },
    RuleDef {
        id: RuleId::FlaskAppInit,
        title: "Flask app initialization",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Error),
        check: flask::app_init,
    },
    RuleDef {
        id: RuleId::FlaskDebug,
        title: "Debug mode enabled",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: flask::debug_mode,
    },
    RuleDef {
        id: RuleId::FlaskHostBinding,
        title: "Host binding",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: flask::host_binding,
    },
    RuleDef {
        id: RuleId::FlaskNoRoutes,
        title: "Route definitions",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Error),
        check: flask::routes_defined,
    },
    RuleDef {
        id: RuleId::FlaskExpectedEndpoints,
        title: "Expected endpoints",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: flask::expected_endpoints,
    },
    RuleDef {
        id: RuleId::FlaskRouteErrors,
        title: "Route error handling",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: flask::route_error_handling,
    },
    RuleDef {
        id: RuleId::FlaskCommandInjection,
        title: "Command injection",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: flask::command_injection,
    },
    RuleDef {
        id: RuleId::FlaskCors,
        title: "CORS configuration",
        targets: FLASK,
        severity: SeverityMatrix::generic_only(Severity::Warning),
        check: flask::cors,
    },
    // PDQ profile-specific.
    RuleDef {
        id: RuleId::ExitCodeMissing,
        title: "No explicit exit code",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, W, NA, NA),
        check: pdq::exit_code_missing,
    },
    RuleDef {
        id: RuleId::CatchWithoutExit,
        title: "Catch blocks without exit code",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, W, NA, NA),
        check: pdq::catch_without_exit,
    },
    RuleDef {
        id: RuleId::InteractivePrompt,
        title: "Interactive prompt",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, E, E, E),
        check: pdq::interactive_prompts,
    },
    RuleDef {
        id: RuleId::GuiElement,
        title: "GUI element",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, E, E, E),
        check: pdq::gui_elements,
    },
    RuleDef {
        id: RuleId::HardcodedPath,
        title: "Hardcoded path",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, W, W, W),
        check: pdq::hardcoded_paths,
    },
    RuleDef {
        id: RuleId::SessionCleanup,
        title: "Remote session cleanup",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, NA, NA, W),
        check: pdq::session_cleanup,
    },
    RuleDef {
        id: RuleId::StructuredOutput,
        title: "Structured object output",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, NA, W, NA),
        check: pdq::structured_output,
    },
    RuleDef {
        id: RuleId::SilentInstall,
        title: "Silent installation switches",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, W, NA, NA),
        check: pdq::silent_install,
    },
    RuleDef {
        id: RuleId::InstallVerification,
        title: "Installation verification",
        targets: PDQ,
        severity: SeverityMatrix::new(NA, W, NA, NA),
        check: pdq::install_verification,
    },
];

pub fn rules() -> &'static [RuleDef] {
    RULES
}

pub fn find(id: RuleId) -> Option<&'static RuleDef> {
    RULES.iter().find(|r| r.id == id)
}

/// Rules that run for `target` under `profile`, in table order.
pub fn applicable(
    target: Target,
    profile: Option<Profile>,
) -> impl Iterator<Item = (&'static RuleDef, Severity)> {
    RULES
        .iter()
        .filter_map(move |r| r.severity_in(target, profile).map(|s| (r, s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sev(id: RuleId, profile: Option<Profile>) -> Option<Severity> {
        find(id).unwrap().severity_in(Target::Pdq, profile)
    }

    #[test]
    fn rule_ids_are_unique() {
        let ids: HashSet<_> = RULES.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), RULES.len());
    }

    #[test]
    fn serialized_id_matches_display() {
        for r in RULES {
            let json = serde_json::to_string(&r.id).unwrap();
            assert_eq!(json, format!("\"{}\"", r.id));
        }
    }

    #[test]
    fn universal_rules_come_first() {
        let first_specific = RULES.iter().position(|r| !r.is_universal()).unwrap();
        assert!(RULES[first_specific..].iter().all(|r| !r.is_universal()));
    }

    #[test]
    fn console_output_matrix() {
        use Profile::*;
        assert_eq!(sev(RuleId::ConsoleOutput, None), W);
        assert_eq!(sev(RuleId::ConsoleOutput, Some(Deploy)), W);
        assert_eq!(sev(RuleId::ConsoleOutput, Some(Inventory)), E);
        assert_eq!(sev(RuleId::ConsoleOutput, Some(Connect)), W);
    }

    #[test]
    fn headless_constructs_are_errors_only_under_profiles() {
        for id in [RuleId::InteractivePrompt, RuleId::GuiElement] {
            assert_eq!(sev(id, None), NA);
            for p in Profile::ALL {
                assert_eq!(sev(id, Some(p)), E, "{id} under {p}");
            }
        }
    }

    #[test]
    fn secrets_are_errors_everywhere() {
        for target in [Target::PowerShell, Target::Pdq, Target::Flask] {
            let rule = find(RuleId::EmbeddedSecret).unwrap();
            assert_eq!(rule.severity_in(target, None), E);
        }
        for p in Profile::ALL {
            assert_eq!(sev(RuleId::EmbeddedSecret, Some(p)), E);
        }
    }

    #[test]
    fn profile_only_rules_match_table() {
        use Profile::*;
        assert_eq!(sev(RuleId::ExitCodeMissing, Some(Deploy)), W);
        assert_eq!(sev(RuleId::ExitCodeMissing, Some(Inventory)), NA);
        assert_eq!(sev(RuleId::SessionCleanup, Some(Connect)), W);
        assert_eq!(sev(RuleId::SessionCleanup, Some(Deploy)), NA);
        assert_eq!(sev(RuleId::StructuredOutput, Some(Inventory)), W);
        assert_eq!(sev(RuleId::StructuredOutput, None), NA);
        assert_eq!(sev(RuleId::HardcodedPath, None), NA);
        assert_eq!(sev(RuleId::HardcodedPath, Some(Connect)), W);
        assert_eq!(sev(RuleId::TryCatchMismatch, None), E);
        assert_eq!(sev(RuleId::NoErrorHandling, Some(Inventory)), W);
    }

    #[test]
    fn profile_is_ignored_outside_pdq() {
        let rule = find(RuleId::ConsoleOutput).unwrap();
        assert_eq!(rule.severity_in(Target::PowerShell, Some(Profile::Inventory)), W);
        assert_eq!(rule.severity_in(Target::Flask, None), NA);
    }

    #[test]
    fn undetermined_pdq_runs_only_universal_rules() {
        let ids: Vec<_> = applicable(Target::Pdq, None).map(|(r, _)| r.id).collect();
        assert!(!ids.is_empty());
        for id in &ids {
            assert!(find(*id).unwrap().is_universal());
        }
        assert!(!ids.contains(&RuleId::InteractivePrompt));
    }

    #[test]
    fn flask_target_skips_powershell_rules() {
        let ids: Vec<_> = applicable(Target::Flask, None).map(|(r, _)| r.id).collect();
        assert!(ids.contains(&RuleId::EmbeddedSecret));
        assert!(ids.contains(&RuleId::FlaskAppInit));
        assert!(!ids.contains(&RuleId::ConsoleOutput));
    }
}
