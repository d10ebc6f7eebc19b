//! Diagnostic collection for a single verification run.
//!
//! A `Collector` owns three append-only sequences, one per severity.
//! Insertion order is preserved so that report output and test
//! assertions are deterministic. There is no dedup and no cap: two
//! rules reporting the same text produce two entries.

use serde::{Deserialize, Serialize};

use crate::rules::catalog::RuleId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// A single finding. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub rule_id: Option<RuleId>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, rule_id: Option<RuleId>) -> Self {
        Self {
            severity,
            message: message.into(),
            rule_id,
        }
    }
}

/// The three ordered diagnostic sequences, as carried by the report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticSet {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub info: Vec<Diagnostic>,
}

impl DiagnosticSet {
    pub fn len(&self) -> usize {
        self.errors.len() + self.warnings.len() + self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All diagnostics, errors first, each sequence in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.info.iter())
    }
}

/// Mutable bag of findings shared by reference during one run.
#[derive(Debug, Default)]
pub struct Collector {
    set: DiagnosticSet,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic to the sequence matching `severity`.
    pub fn record(&mut self, severity: Severity, message: impl Into<String>, rule_id: Option<RuleId>) {
        self.push(Diagnostic::new(severity, message, rule_id));
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        let bucket = match diagnostic.severity {
            Severity::Error => &mut self.set.errors,
            Severity::Warning => &mut self.set.warnings,
            Severity::Info => &mut self.set.info,
        };
        bucket.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>, rule_id: Option<RuleId>) {
        self.record(Severity::Error, message, rule_id);
    }

    pub fn warning(&mut self, message: impl Into<String>, rule_id: Option<RuleId>) {
        self.record(Severity::Warning, message, rule_id);
    }

    pub fn info(&mut self, message: impl Into<String>, rule_id: Option<RuleId>) {
        self.record(Severity::Info, message, rule_id);
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.set.errors.len(),
            Severity::Warning => self.set.warnings.len(),
            Severity::Info => self.set.info.len(),
        }
    }

    /// True iff no Error has been recorded.
    pub fn is_passing(&self) -> bool {
        self.set.errors.is_empty()
    }

    /// Copy of the current state for reporting.
    pub fn snapshot(&self) -> DiagnosticSet {
        self.set.clone()
    }

    pub fn into_set(self) -> DiagnosticSet {
        self.set
    }
}
