use std::path::PathBuf;

use thiserror::Error;

/// Failure inside a single check. Converted into a Warning at the rule
/// boundary; never propagated between rules.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Transport-level failure talking to a probed server.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to start `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}
