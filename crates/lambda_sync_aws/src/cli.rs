use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use lambda_sync_core::config::{DEFAULT_HANDLER, DEFAULT_RUNTIME, DEFAULT_SOURCE_ROOT};
use lambda_sync_core::{RunReport, SyncConfig};

pub const EXIT_SETTLED: u8 = 0;
pub const EXIT_ITEM_FAILURES: u8 = 1;
pub const EXIT_SETUP_FAULT: u8 = 2;

/// Arguments fall back to the variables a GitHub Actions step exposes.
#[derive(Debug, Parser)]
#[command(
    name = "lambda_sync",
    about = "Reconcile Lambda functions against a change-set"
)]
pub struct Cli {
    /// JSON change-set: {"created": [...], "updated": [...], "deleted": [...]}
    #[arg(long, env = "INPUT_UPDATES")]
    pub changes: String,
    #[arg(long, env = "GITHUB_WORKSPACE", default_value = ".")]
    pub workspace: PathBuf,
    /// Directory under the workspace holding one folder per function
    #[arg(long, env = "LAMBDA_SOURCE_ROOT", default_value = DEFAULT_SOURCE_ROOT)]
    pub source_root: String,
    #[arg(long, env = "LAMBDA_RUNTIME", default_value = DEFAULT_RUNTIME)]
    pub runtime: String,
    #[arg(long, env = "LAMBDA_HANDLER", default_value = DEFAULT_HANDLER)]
    pub handler: String,
    /// Trust policy JSON file; the bundled Lambda assume-role policy otherwise
    #[arg(long, env = "LAMBDA_TRUST_POLICY_PATH")]
    pub trust_policy: Option<PathBuf>,
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,
    /// Exit non-zero when any item settles as a failure
    #[arg(long)]
    pub fail_on_error: bool,
}

pub fn build_config(cli: &Cli) -> Result<SyncConfig, String> {
    let mut config = SyncConfig::with_workspace(&cli.workspace);
    config.source_root = non_blank("source root", &cli.source_root)?;
    config.runtime = non_blank("runtime", &cli.runtime)?;
    config.handler = non_blank("handler", &cli.handler)?;

    if let Some(path) = &cli.trust_policy {
        config.trust_policy_document = read_trust_policy(path)?;
    }

    Ok(config)
}

fn non_blank(field: &str, value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{field} must not be blank"));
    }
    Ok(trimmed.to_string())
}

fn read_trust_policy(path: &Path) -> Result<String, String> {
    let document = fs::read_to_string(path).map_err(|error| {
        format!(
            "failed to read trust policy '{}': {error}",
            path.display()
        )
    })?;
    serde_json::from_str::<serde_json::Value>(&document).map_err(|error| {
        format!(
            "trust policy '{}' is not valid JSON: {error}",
            path.display()
        )
    })?;
    Ok(document)
}

pub fn exit_code(report: &RunReport, fail_on_error: bool) -> u8 {
    if fail_on_error && report.has_failures() {
        EXIT_ITEM_FAILURES
    } else {
        EXIT_SETTLED
    }
}
