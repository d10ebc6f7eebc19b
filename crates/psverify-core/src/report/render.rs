use crate::TOOL_NAME;
use crate::context::ProfileSource;
use crate::diagnostics::Diagnostic;
use crate::report::model::Report;

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", TOOL_NAME, report.tool.version));
    out.push_str(&format!(
        "Script: {} ({} bytes)\n",
        report.script.path, report.script.size_bytes
    ));
    out.push_str(&format!("Target: {}\n", report.target.label()));
    out.push_str(&format!("Profile: {}\n", profile_line(report)));

    section(&mut out, "ERRORS", &report.diagnostics.errors);
    section(&mut out, "WARNINGS", &report.diagnostics.warnings);
    section(&mut out, "INFO", &report.diagnostics.info);

    let v = &report.verdict;
    out.push('\n');
    if v.passed() {
        out.push_str(&format!(
            "PASS: no errors ({} warning(s), {} info)\n",
            v.warning_count, v.info_count
        ));
    } else {
        out.push_str(&format!(
            "FAIL: {} error(s), {} warning(s)\n",
            v.error_count, v.warning_count
        ));
    }
    out
}

fn profile_line(report: &Report) -> String {
    let p = &report.profile;
    let scores = p
        .scores
        .map(|s| {
            format!(
                " [scores: inventory={} deploy={} connect={}]",
                s.inventory, s.deploy, s.connect
            )
        })
        .unwrap_or_default();
    match (p.source, p.profile) {
        (ProfileSource::NotApplicable, _) => "n/a".to_string(),
        (ProfileSource::Undetermined, _) | (_, None) => {
            format!("undetermined (universal rules only){scores}")
        }
        (ProfileSource::Explicit, Some(profile)) => format!("{profile} (explicit)"),
        (ProfileSource::Detected, Some(profile)) => format!("{profile} (detected){scores}"),
    }
}

fn section(out: &mut String, title: &str, items: &[Diagnostic]) {
    out.push_str(&format!("\n{} ({}):\n", title, items.len()));
    if items.is_empty() {
        out.push_str("  (none)\n");
        return;
    }
    for d in items {
        match d.rule_id {
            Some(id) => out.push_str(&format!("  - [{}] {}\n", id, d.message)),
            None => out.push_str(&format!("  - {}\n", d.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Profile, Target};
    use crate::detect::DetectionScores;
    use crate::diagnostics::Collector;
    use crate::report::model::{ProfileInfo, RulesInfo, ScriptInfo, ToolInfo};
    use crate::rules::catalog::RuleId;
    use crate::verify::Stage;

    fn report(c: Collector, profile: ProfileInfo) -> Report {
        Report::new(
            ToolInfo {
                name: "psverify".into(),
                version: "0.1.0".into(),
                commit: None,
            },
            ScriptInfo::unread("inv.ps1"),
            Target::Pdq,
            profile,
            RulesInfo::default(),
            c.into_set(),
            Stage::Summarized,
        )
    }

    #[test]
    fn failing_report_lists_sections_and_banner() {
        let mut c = Collector::new();
        c.error("Console-only output", Some(RuleId::ConsoleOutput));
        c.info("note", None);
        let text = render_text(&report(
            c,
            ProfileInfo {
                profile: Some(Profile::Inventory),
                source: ProfileSource::Explicit,
                scores: None,
            },
        ));

        assert!(text.contains("Profile: Inventory (explicit)"));
        assert!(text.contains("ERRORS (1):\n  - [PS-OUT-01] Console-only output"));
        assert!(text.contains("WARNINGS (0):\n  (none)"));
        assert!(text.contains("  - note\n"));
        assert!(text.trim_end().ends_with("FAIL: 1 error(s), 0 warning(s)"));
    }

    #[test]
    fn undetermined_profile_is_explained() {
        let text = render_text(&report(
            Collector::new(),
            ProfileInfo {
                profile: None,
                source: ProfileSource::Undetermined,
                scores: Some(DetectionScores::default()),
            },
        ));
        assert!(text.contains("Profile: undetermined (universal rules only)"));
        assert!(text.trim_end().ends_with("PASS: no errors (0 warning(s), 0 info)"));
    }
}
