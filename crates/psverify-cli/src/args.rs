use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use psverify_core::context::{Profile, Target};

#[derive(Debug, Parser)]
#[command(
    name = "psverify",
    version,
    about = "Static verification of PowerShell, PDQ and Flask scripts before deployment"
)]
pub struct Args {
    /// Path to the script to verify
    pub script: PathBuf,

    /// PDQ profile; detected from the script when omitted
    #[arg(long = "type", value_name = "TYPE")]
    pub script_type: Option<ScriptType>,

    /// Verifier to run [default: flask for .py files, pdq otherwise]
    #[arg(long)]
    pub target: Option<TargetArg>,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Do not start the Flask app for endpoint probing
    #[arg(long)]
    pub skip_live_check: bool,

    /// Do not run the external PowerShell parser
    #[arg(long)]
    pub skip_syntax_check: bool,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,

    /// Optional git commit hash for tool metadata
    #[arg(long)]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScriptType {
    Deploy,
    Inventory,
    Connect,
}

impl From<ScriptType> for Profile {
    fn from(t: ScriptType) -> Self {
        match t {
            ScriptType::Deploy => Profile::Deploy,
            ScriptType::Inventory => Profile::Inventory,
            ScriptType::Connect => Profile::Connect,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TargetArg {
    Powershell,
    Pdq,
    Flask,
}

impl From<TargetArg> for Target {
    fn from(t: TargetArg) -> Self {
        match t {
            TargetArg::Powershell => Target::PowerShell,
            TargetArg::Pdq => Target::Pdq,
            TargetArg::Flask => Target::Flask,
        }
    }
}
