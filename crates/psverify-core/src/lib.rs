pub mod config;
pub mod context;
pub mod detect;
pub mod diagnostics;
pub mod error;
pub mod probe;
pub mod report;
pub mod rules;
pub mod source;
pub mod syntax;
pub mod util;
pub mod verify;

pub use verify::{verify, verify_with};

pub const TOOL_NAME: &str = "psverify";

/// JSON schema version of psverify reports.
/// Bump only when the report layout changes semantically.
pub const SCHEMA_VERSION: &str = "0.1.0";

pub const RULE_CATALOG_VERSION: &str = "0.1.0";
