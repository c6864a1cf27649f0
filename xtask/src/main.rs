use std::path::PathBuf;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use lambda_sync_core::config::{source_dir, DEFAULT_SOURCE_ROOT};
use lambda_sync_core::contract::FunctionName;
use lambda_sync_core::packaging::{artifact_path, package_directory};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the lambda-sync workspace",
    long_about = "A unified CLI for CI checks and local artifact packaging\n\
                  in the lambda-sync workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build one function artifact with the engine's packager
    Package {
        /// Function name; its sources live under <workspace>/<source-root>/<name>
        function: String,
        #[arg(long, env = "GITHUB_WORKSPACE", default_value = ".")]
        workspace: PathBuf,
        #[arg(long, default_value = DEFAULT_SOURCE_ROOT)]
        source_root: String,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Tests only
    Test,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn package_function(function: &str, workspace: PathBuf, source_root: &str) {
    let function = match FunctionName::parse(function) {
        Ok(function) => function,
        Err(error) => {
            eprintln!("invalid function name: {error}");
            exit(2);
        }
    };

    step(&format!("Package {function}"));
    let source = source_dir(&workspace, source_root, &function);
    let destination = artifact_path(&source, &function);
    match package_directory(&source, &destination) {
        Ok(sha256) => {
            eprintln!(
                "\nPackaged artifact:\n- {}\n- sha256 {sha256}",
                destination.display()
            );
        }
        Err(message) => {
            eprintln!("{message}");
            exit(1);
        }
    }
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_test() {
    step("Test lambda_sync_core");
    run_cargo(&["test", "-p", "lambda_sync_core"]);

    step("Test lambda_sync_aws");
    run_cargo(&["test", "-p", "lambda_sync_aws"]);
}

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    ci_test();
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci { job } => match job {
            CiJob::Check => ci_check(),
            CiJob::Test => ci_test(),
        },
        Commands::Package {
            function,
            workspace,
            source_root,
        } => package_function(&function, workspace, &source_root),
    }
}
