use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use lambda_sync_aws::adapters::{IamIdentityService, LambdaComputeService};
use lambda_sync_aws::cli::{build_config, exit_code, Cli, EXIT_SETUP_FAULT};
use lambda_sync_core::contract::parse_change_set;
use lambda_sync_core::packaging::ZipPackager;
use lambda_sync_core::{Reconciler, RunReport};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// JSON logs go to stderr; stdout carries only the run report.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn load_aws_config(region: Option<String>) -> aws_config::SdkConfig {
    let loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    match region {
        Some(region) => loader.region(aws_config::Region::new(region)).load().await,
        None => loader.load().await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let change_set = match parse_change_set(&cli.changes) {
        Ok(change_set) => change_set,
        Err(error) => {
            error!(event = "change_set_rejected", error = %error);
            return ExitCode::from(EXIT_SETUP_FAULT);
        }
    };
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            error!(event = "config_rejected", error = %message);
            return ExitCode::from(EXIT_SETUP_FAULT);
        }
    };

    let aws_config = load_aws_config(cli.region.clone()).await;
    let engine = Reconciler::new(
        &config,
        Arc::new(ZipPackager::new(&config)),
        Arc::new(IamIdentityService::new(&aws_config)),
        Arc::new(LambdaComputeService::new(&aws_config)),
    );

    let started_at = Utc::now();
    let result = engine.reconcile(&change_set).await;
    let report = RunReport::from_result(&change_set, &result, started_at, Utc::now());

    match serde_json::to_string_pretty(&report) {
        Ok(body) => println!("{body}"),
        Err(error) => {
            error!(event = "report_serialization_failed", error = %error);
            return ExitCode::from(EXIT_SETUP_FAULT);
        }
    }
    info!(
        event = "run_reported",
        succeeded = report.succeeded,
        failed = report.failed,
    );

    ExitCode::from(exit_code(&report, cli.fail_on_error))
}
