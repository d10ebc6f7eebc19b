use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detect::DetectionScores;

/// Verifier variant. Selects which rows of the rule table are eligible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Generic PowerShell toolkit scripts.
    PowerShell,
    /// PDQ Deploy / Inventory / Connect scripts.
    Pdq,
    /// Flask API application source.
    Flask,
}

impl Target {
    pub fn label(self) -> &'static str {
        match self {
            Target::PowerShell => "PowerShell",
            Target::Pdq => "PDQ",
            Target::Flask => "Flask",
        }
    }

    pub fn is_powershell(self) -> bool {
        matches!(self, Target::PowerShell | Target::Pdq)
    }
}

/// PDQ deployment profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Deploy,
    Inventory,
    Connect,
}

impl Profile {
    pub const ALL: [Profile; 3] = [Profile::Deploy, Profile::Inventory, Profile::Connect];

    pub fn label(self) -> &'static str {
        match self {
            Profile::Deploy => "Deploy",
            Profile::Inventory => "Inventory",
            Profile::Connect => "Connect",
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How the profile of a run was resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// Supplied by the operator.
    Explicit,
    /// Chosen by the detector.
    Detected,
    /// Detector stayed below the confidence threshold.
    Undetermined,
    /// Target has no profiles (PowerShell toolkit, Flask).
    NotApplicable,
}

/// Operator-supplied knobs for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub profile: Option<Profile>,
    pub skip_live_check: bool,
    pub skip_syntax_check: bool,
}

/// What the caller asks to verify.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub path: PathBuf,
    pub target: Target,
    pub overrides: Overrides,
}

impl VerificationRequest {
    pub fn new(path: impl Into<PathBuf>, target: Target) -> Self {
        Self {
            path: path.into(),
            target,
            overrides: Overrides::default(),
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.overrides.profile = Some(profile);
        self
    }

    pub fn skip_live_check(mut self) -> Self {
        self.overrides.skip_live_check = true;
        self
    }

    pub fn skip_syntax_check(mut self) -> Self {
        self.overrides.skip_syntax_check = true;
        self
    }
}

/// Read-only input handed to every rule.
#[derive(Debug, Clone)]
pub struct VerificationContext {
    pub path: PathBuf,
    pub content: String,
    pub target: Target,
    /// `None` until resolved, and stays `None` when undetermined.
    pub profile: Option<Profile>,
    pub profile_source: ProfileSource,
    pub scores: Option<DetectionScores>,
    pub overrides: Overrides,
    /// Endpoints a Flask application is expected to expose.
    pub expected_endpoints: Vec<String>,
}

impl VerificationContext {
    /// Context for a text with no resolution applied yet.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>, target: Target) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            target,
            profile: None,
            profile_source: ProfileSource::NotApplicable,
            scores: None,
            overrides: Overrides::default(),
            expected_endpoints: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: Option<Profile>) -> Self {
        self.profile = profile;
        self.profile_source = if profile.is_some() {
            ProfileSource::Explicit
        } else {
            ProfileSource::Undetermined
        };
        self
    }

    pub fn with_expected_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }
}
