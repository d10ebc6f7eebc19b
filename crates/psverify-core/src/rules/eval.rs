//! Rule execution driver.
//!
//! Runs every applicable rule against one context and records what each
//! one finds. A rule that fails to run is recorded as a Warning and the
//! remaining rules still run.

use tracing::{debug, warn};

use crate::context::VerificationContext;
use crate::diagnostics::{Collector, Severity};
use crate::rules::catalog::{Finding, RuleDef, RuleId};

/// Which rules ran, and which of those could not complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalSummary {
    pub evaluated: Vec<RuleId>,
    pub failed: Vec<RuleId>,
}

pub fn evaluate<'a>(
    rules: impl IntoIterator<Item = &'a RuleDef>,
    ctx: &VerificationContext,
    collector: &mut Collector,
) -> EvalSummary {
    let mut summary = EvalSummary::default();

    for rule in rules {
        let Some(severity) = rule.severity_in(ctx.target, ctx.profile) else {
            continue;
        };
        summary.evaluated.push(rule.id);

        match (rule.check)(ctx) {
            Ok(findings) => {
                debug!(rule = %rule.id, findings = findings.len(), "rule evaluated");
                for finding in findings {
                    match finding {
                        Finding::Violation(msg) => collector.record(severity, msg, Some(rule.id)),
                        Finding::Note(msg) => collector.record(Severity::Info, msg, Some(rule.id)),
                    }
                }
            }
            Err(err) => {
                warn!(rule = %rule.id, error = %err, "rule could not run");
                collector.warning(
                    format!("Check {} ({}) could not run: {}", rule.id, rule.title, err),
                    Some(rule.id),
                );
                summary.failed.push(rule.id);
            }
        }
    }

    summary
}
