//! Verification driver.
//!
//! A run moves through
//! `NotStarted → ContentLoaded → RulesRun → (SyntaxChecked) → (LiveProbeRun) → Summarized`.
//! A missing or unreadable script moves straight to `Failed`: exactly one
//! Error is recorded and no rule runs. Every later step is a no-op once
//! the run has failed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::RULE_CATALOG_VERSION;
use crate::config::VerifierConfig;
use crate::context::{ProfileSource, Target, VerificationContext, VerificationRequest};
use crate::detect::detect_profile;
use crate::diagnostics::Collector;
use crate::probe::LiveProbe;
use crate::probe::http::{HttpClient, ReqwestClient};
use crate::probe::process::{ProcessLauncher, StdLauncher};
use crate::report::model::{ProfileInfo, Report, RulesInfo, ScriptInfo, ToolInfo};
use crate::rules::catalog::{RuleId, rules};
use crate::rules::eval::{EvalSummary, evaluate};
use crate::source::read::read_script;
use crate::syntax::{PwshSyntaxChecker, SyntaxChecker};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NotStarted,
    ContentLoaded,
    RulesRun,
    SyntaxChecked,
    LiveProbeRun,
    Summarized,
    Failed,
}

pub struct Verifier<'a> {
    request: VerificationRequest,
    config: &'a VerifierConfig,
    stage: Stage,
    collector: Collector,
    script: ScriptInfo,
    context: Option<VerificationContext>,
    summary: EvalSummary,
}

impl<'a> Verifier<'a> {
    pub fn new(request: VerificationRequest, config: &'a VerifierConfig) -> Self {
        let script = ScriptInfo::unread(request.path.display().to_string());
        Self {
            request,
            config,
            stage: Stage::NotStarted,
            collector: Collector::new(),
            script,
            context: None,
            summary: EvalSummary::default(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn context(&self) -> Option<&VerificationContext> {
        self.context.as_ref()
    }

    fn advance(&mut self, to: Stage) {
        info!(from = ?self.stage, to = ?to, path = %self.request.path.display(), "stage");
        self.stage = to;
    }

    fn failed(&self) -> bool {
        self.stage == Stage::Failed
    }

    /// Read the script, decode it and resolve the profile.
    pub fn load(&mut self) {
        if self.stage != Stage::NotStarted {
            return;
        }
        let path = self.request.path.clone();

        if !path.is_file() {
            self.collector
                .error(format!("Script file not found: {}", path.display()), None);
            self.advance(Stage::Failed);
            return;
        }

        let source = match read_script(&path) {
            Ok(source) => source,
            Err(e) => {
                self.collector.error(format!("Could not read script: {e:#}"), None);
                self.advance(Stage::Failed);
                return;
            }
        };
        let text = source.text();
        self.script = source.into_script_info();

        let Some(text) = text else {
            self.collector.error(
                "Script content is not readable text (binary data or unsupported encoding)",
                Some(RuleId::Unreadable),
            );
            self.advance(Stage::Failed);
            return;
        };

        let ctx = VerificationContext::new(&path, text, self.request.target)
            .with_expected_endpoints(self.config.flask.expected_endpoints.iter().cloned());
        self.context = Some(self.resolve_profile(ctx));
        self.advance(Stage::ContentLoaded);
    }

    fn resolve_profile(&self, mut ctx: VerificationContext) -> VerificationContext {
        ctx.overrides = self.request.overrides.clone();
        if ctx.target != Target::Pdq {
            return ctx;
        }
        if let Some(profile) = self.request.overrides.profile {
            ctx.profile = Some(profile);
            ctx.profile_source = ProfileSource::Explicit;
            return ctx;
        }
        let detection = detect_profile(&ctx.content, &self.config.detection);
        debug!(scores = ?detection.scores, profile = ?detection.profile, "profile detection");
        ctx.profile = detection.profile;
        ctx.scores = Some(detection.scores);
        ctx.profile_source = match detection.profile {
            Some(_) => ProfileSource::Detected,
            None => ProfileSource::Undetermined,
        };
        ctx
    }

    pub fn run_rules(&mut self) {
        if self.stage != Stage::ContentLoaded {
            return;
        }
        let Some(ctx) = self.context.as_ref() else {
            return;
        };
        self.summary = evaluate(rules(), ctx, &mut self.collector);
        debug!(
            evaluated = self.summary.evaluated.len(),
            failed = self.summary.failed.len(),
            "rules evaluated"
        );
        self.advance(Stage::RulesRun);
    }

    /// External parser check; PowerShell targets only.
    pub fn run_syntax_check(&mut self, checker: &dyn SyntaxChecker) {
        if self.failed() || self.stage != Stage::RulesRun {
            return;
        }
        if !self.request.target.is_powershell()
            || self.request.overrides.skip_syntax_check
            || !self.config.syntax.enabled
        {
            debug!("syntax check skipped");
            return;
        }
        checker.check(&self.request.path).record(&mut self.collector);
        self.advance(Stage::SyntaxChecked);
    }

    /// Live endpoint probe; Flask target only.
    pub fn run_live_probe(&mut self, launcher: &dyn ProcessLauncher, client: &dyn HttpClient) {
        if self.failed() || !matches!(self.stage, Stage::RulesRun | Stage::SyntaxChecked) {
            return;
        }
        if self.request.target != Target::Flask
            || self.request.overrides.skip_live_check
            || !self.config.live.enabled
        {
            debug!("live probe skipped");
            return;
        }
        let outcome = LiveProbe::new(launcher, client, &self.config.live)
            .run(&self.request.path, &mut self.collector);
        debug!(?outcome, "live probe done");
        self.advance(Stage::LiveProbeRun);
    }

    pub fn summarize(mut self, tool: ToolInfo) -> Report {
        if !self.failed() {
            self.advance(Stage::Summarized);
        }
        let profile = match &self.context {
            Some(ctx) => ProfileInfo {
                profile: ctx.profile,
                source: ctx.profile_source,
                scores: ctx.scores,
            },
            None => ProfileInfo::not_applicable(),
        };
        let rules = RulesInfo {
            catalog_version: RULE_CATALOG_VERSION.to_string(),
            evaluated: self.summary.evaluated,
            failed: self.summary.failed,
        };
        Report::new(
            tool,
            self.script,
            self.request.target,
            profile,
            rules,
            self.collector.into_set(),
            self.stage,
        )
    }
}

/// Verify with the real `pwsh` checker, process launcher and HTTP client.
pub fn verify(request: VerificationRequest, config: &VerifierConfig, tool: ToolInfo) -> Report {
    let checker = PwshSyntaxChecker::from_config(&config.syntax);
    let launcher: &dyn ProcessLauncher = &StdLauncher;
    let client: &dyn HttpClient = &ReqwestClient::new();
    verify_with(request, config, tool, &checker, Some((launcher, client)))
}

/// Verify with injected collaborators. `live = None` disables the probe.
pub fn verify_with(
    request: VerificationRequest,
    config: &VerifierConfig,
    tool: ToolInfo,
    checker: &dyn SyntaxChecker,
    live: Option<(&dyn ProcessLauncher, &dyn HttpClient)>,
) -> Report {
    let mut verifier = Verifier::new(request, config);
    verifier.load();
    verifier.run_rules();
    verifier.run_syntax_check(checker);
    if let Some((launcher, client)) = live {
        verifier.run_live_probe(launcher, client);
    }
    verifier.summarize(tool)
}

/// Default target for a script path: `.py` is Flask, everything else PDQ.
pub fn default_target(path: &Path) -> Target {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("py") => Target::Flask,
        _ => Target::Pdq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Profile;
    use crate::syntax::SyntaxOutcome;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct CountingChecker {
        calls: Cell<usize>,
        outcome: SyntaxOutcome,
    }

    impl CountingChecker {
        fn new(outcome: SyntaxOutcome) -> Self {
            Self {
                calls: Cell::new(0),
                outcome,
            }
        }
    }

    impl SyntaxChecker for CountingChecker {
        fn check(&self, _: &Path) -> SyntaxOutcome {
            self.calls.set(self.calls.get() + 1);
            self.outcome.clone()
        }
    }

    fn tool() -> ToolInfo {
        ToolInfo {
            name: "psverify".into(),
            version: "0.0.0".into(),
            commit: None,
        }
    }

    fn script(suffix: &str, body: &[u8]) -> NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(body).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn missing_file_fails_before_any_rule() {
        let cfg = VerifierConfig::default();
        let checker = CountingChecker::new(SyntaxOutcome::Valid);
        let req = VerificationRequest::new("no/such/deploy.ps1", Target::Pdq);

        let report = verify_with(req, &cfg, tool(), &checker, None);

        assert_eq!(report.stage, Stage::Failed);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(
            report.diagnostics.errors[0].message,
            "Script file not found: no/such/deploy.ps1"
        );
        assert!(report.rules.evaluated.is_empty());
        assert_eq!(checker.calls.get(), 0);
        assert_eq!(report.verdict.exit_code, 1);
    }

    #[test]
    fn binary_content_is_a_single_read_error() {
        let f = script(".ps1", &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00]);
        let cfg = VerifierConfig::default();
        let checker = CountingChecker::new(SyntaxOutcome::Valid);

        let report = verify_with(VerificationRequest::new(f.path(), Target::Pdq), &cfg, tool(), &checker, None);

        assert_eq!(report.stage, Stage::Failed);
        assert_eq!(report.diagnostics.errors.len(), 1);
        assert_eq!(report.diagnostics.errors[0].rule_id, Some(RuleId::Unreadable));
        assert!(report.script.hash.is_some());
        assert!(report.rules.evaluated.is_empty());
    }

    #[test]
    fn stages_advance_in_order() {
        let f = script(".ps1", b"Write-Output 'ok'\nexit 0\n");
        let cfg = VerifierConfig::default();
        let checker = CountingChecker::new(SyntaxOutcome::Valid);
        let mut v = Verifier::new(VerificationRequest::new(f.path(), Target::PowerShell), &cfg);

        assert_eq!(v.stage(), Stage::NotStarted);
        v.load();
        assert_eq!(v.stage(), Stage::ContentLoaded);
        v.run_rules();
        assert_eq!(v.stage(), Stage::RulesRun);
        v.run_syntax_check(&checker);
        assert_eq!(v.stage(), Stage::SyntaxChecked);
        let report = v.summarize(tool());
        assert_eq!(report.stage, Stage::Summarized);
        assert!(report
            .diagnostics
            .info
            .iter()
            .any(|d| d.message == "PowerShell syntax is valid"));
    }

    #[test]
    fn syntax_error_fails_the_run() {
        let f = script(".ps1", b"function Get-X { \n");
        let cfg = VerifierConfig::default();
        let checker = CountingChecker::new(SyntaxOutcome::Invalid("Missing closing '}'".into()));

        let report = verify_with(VerificationRequest::new(f.path(), Target::Pdq), &cfg, tool(), &checker, None);

        assert!(report
            .diagnostics
            .errors
            .iter()
            .any(|d| d.rule_id == Some(RuleId::Syntax)));
        assert!(!report.passed());
    }

    #[test]
    fn skip_flag_and_config_disable_syntax_check() {
        let f = script(".ps1", b"exit 0\n");
        let checker = CountingChecker::new(SyntaxOutcome::Valid);

        let cfg = VerifierConfig::default();
        let req = VerificationRequest::new(f.path(), Target::Pdq).skip_syntax_check();
        verify_with(req, &cfg, tool(), &checker, None);

        let mut cfg = VerifierConfig::default();
        cfg.syntax.enabled = false;
        verify_with(VerificationRequest::new(f.path(), Target::Pdq), &cfg, tool(), &checker, None);

        assert_eq!(checker.calls.get(), 0);
    }

    #[test]
    fn flask_target_never_runs_syntax_check() {
        let f = script(".py", b"from flask import Flask\napp = Flask(__name__)\n");
        let cfg = VerifierConfig::default();
        let checker = CountingChecker::new(SyntaxOutcome::Valid);
        let report = verify_with(VerificationRequest::new(f.path(), Target::Flask), &cfg, tool(), &checker, None);
        assert_eq!(checker.calls.get(), 0);
        assert_eq!(report.profile.source, ProfileSource::NotApplicable);
    }

    #[test]
    fn explicit_profile_wins_over_detection() {
        let f = script(".ps1", b"$d = Get-CimInstance Win32_OS | Select-Object Caption\n$d | ConvertTo-Json\n");
        let cfg = VerifierConfig::default();
        let checker = CountingChecker::new(SyntaxOutcome::Valid);

        let detected = verify_with(VerificationRequest::new(f.path(), Target::Pdq), &cfg, tool(), &checker, None);
        assert_eq!(detected.profile.profile, Some(Profile::Inventory));
        assert_eq!(detected.profile.source, ProfileSource::Detected);

        let req = VerificationRequest::new(f.path(), Target::Pdq).with_profile(Profile::Connect);
        let explicit = verify_with(req, &cfg, tool(), &checker, None);
        assert_eq!(explicit.profile.profile, Some(Profile::Connect));
        assert_eq!(explicit.profile.source, ProfileSource::Explicit);
        assert!(explicit.profile.scores.is_none());
    }

    #[test]
    fn default_target_follows_extension() {
        assert_eq!(default_target(Path::new("web/app.py")), Target::Flask);
        assert_eq!(default_target(Path::new("APP.PY")), Target::Flask);
        assert_eq!(default_target(Path::new("deploy.ps1")), Target::Pdq);
        assert_eq!(default_target(Path::new("noext")), Target::Pdq);
    }
}
