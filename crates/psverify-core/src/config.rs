//! Verifier configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all)
//! yields the stock policy. Durations are expressed in milliseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detect::DetectionPolicy;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifierConfig {
    pub detection: DetectionPolicy,
    pub syntax: SyntaxConfig,
    pub live: LiveProbeConfig,
    pub flask: FlaskConfig,
}

impl VerifierConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: VerifierConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.min_confidence == 0 {
            return Err(ConfigError::Invalid(
                "detection.min_confidence must be at least 1".into(),
            ));
        }
        let mut seen = Vec::new();
        for p in &self.detection.priority {
            if seen.contains(p) {
                return Err(ConfigError::Invalid(format!(
                    "detection.priority lists {p} more than once"
                )));
            }
            seen.push(*p);
        }
        if self.live.attempts == 0 {
            return Err(ConfigError::Invalid("live.attempts must be at least 1".into()));
        }
        if self.live.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("live.base_url must not be empty".into()));
        }
        Ok(())
    }
}

/// External PowerShell parser invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyntaxConfig {
    pub enabled: bool,
    pub program: String,
    pub timeout_ms: u64,
}

impl Default for SyntaxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "pwsh".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl SyntaxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Live endpoint probing of a Flask application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LiveProbeConfig {
    pub enabled: bool,
    /// Interpreter used to start the application.
    pub program: String,
    /// Extra arguments placed before the application path.
    pub args: Vec<String>,
    pub base_url: String,
    /// Endpoint polled until the server answers.
    pub ready_path: String,
    pub attempts: u32,
    pub interval_ms: u64,
    /// Timeout of one readiness poll.
    pub ready_timeout_ms: u64,
    /// Timeout of one endpoint probe request.
    pub request_timeout_ms: u64,
    /// Bounded wait for the server to exit after termination.
    pub shutdown_timeout_ms: u64,
}

impl Default for LiveProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "python".to_string(),
            args: Vec::new(),
            base_url: "http://localhost:5000".to_string(),
            ready_path: "/api/tools".to_string(),
            attempts: 10,
            interval_ms: 500,
            ready_timeout_ms: 1_000,
            request_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl LiveProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlaskConfig {
    pub expected_endpoints: Vec<String>,
}

impl Default for FlaskConfig {
    fn default() -> Self {
        Self {
            expected_endpoints: vec!["/api/tools".to_string(), "/api/run".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Profile;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn empty_file_yields_defaults() {
        let f = write_config("");
        let cfg = VerifierConfig::load_from(f.path()).unwrap();
        assert_eq!(cfg, VerifierConfig::default());
        assert_eq!(cfg.detection.min_confidence, 2);
        assert_eq!(cfg.live.attempts, 10);
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let f = write_config(
            r#"
[detection]
min_confidence = 3
priority = ["deploy", "inventory", "connect"]

[live]
attempts = 4
"#,
        );
        let cfg = VerifierConfig::load_from(f.path()).unwrap();
        assert_eq!(cfg.detection.min_confidence, 3);
        assert_eq!(cfg.detection.priority[0], Profile::Deploy);
        assert_eq!(cfg.live.attempts, 4);
        assert_eq!(cfg.live.interval_ms, 500);
        assert_eq!(cfg.syntax.program, "pwsh");
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let f = write_config("[detection]\nmin_confidence = 0\n");
        let err = VerifierConfig::load_from(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn duplicate_priority_is_rejected() {
        let f = write_config("[detection]\npriority = [\"deploy\", \"deploy\"]\n");
        assert!(VerifierConfig::load_from(f.path()).is_err());
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let f = write_config("[live\nattempts = ");
        let err = VerifierConfig::load_from(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = VerifierConfig::load_from(Path::new("no/such/psverify.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
