use anyhow::{Context, Result, bail};
use clap::Parser;
use clap::error::ErrorKind;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use psverify_core::config::VerifierConfig;
use psverify_core::context::{Target, VerificationRequest};
use psverify_core::report::{model::ToolInfo, render};
use psverify_core::verify::{default_target, verify};

mod args;

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Usage errors exit 1 like a failed verification; help and version exit 0.
fn parse_args() -> args::Args {
    match args::Args::try_parse() {
        Ok(args) => args,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                std::process::exit(1);
            }
        },
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => VerifierConfig::load_from(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => VerifierConfig::default(),
    };

    let target: Target = args
        .target
        .map(Into::into)
        .unwrap_or_else(|| default_target(&args.script));
    if args.script_type.is_some() && target != Target::Pdq {
        bail!("--type is only valid with the pdq target (got {})", target.label());
    }

    debug!(script = %args.script.display(), target = target.label(), "verifying");
    let mut request = VerificationRequest::new(&args.script, target);
    if let Some(t) = args.script_type {
        request = request.with_profile(t.into());
    }
    if args.skip_live_check {
        request = request.skip_live_check();
    }
    if args.skip_syntax_check {
        request = request.skip_syntax_check();
    }

    let tool = ToolInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: args.commit.clone(),
    };

    let report = verify(request, &config, tool);

    let output = match args.format {
        args::OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        args::OutputFormat::Text => render::render_text(&report),
    };

    match &args.out {
        Some(path) => std::fs::write(path, &output)
            .with_context(|| format!("failed to write report: {}", path.display()))?,
        None => print!("{output}"),
    }

    std::process::exit(report.verdict.exit_code);
}
