//! Headless cooperative session runner.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario file and print its report
//! cargo run -p coop_headless -- run --scenario scenarios/scenario_a.ron
//!
//! # Override the session config of the scenario
//! cargo run -p coop_headless -- run --scenario scenarios/scenario_b.ron --config session.ron
//!
//! # Run one or all built-in scenarios
//! cargo run -p coop_headless -- builtin --name scenario_c
//! ```
//!
//! The process exits with a failure status when a scenario cannot be loaded
//! or a report is not conserved.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coop_core::config::SessionConfig;
use coop_headless::{Scenario, ScenarioError, ScenarioReport, ScenarioRunner};

#[derive(Parser)]
#[command(name = "coop_headless")]
#[command(about = "Headless host/client deconstruction scenario runner")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Session config overriding the scenario's
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },

    /// Run the built-in scenarios
    Builtin {
        /// Run only this scenario
        #[arg(short, long)]
        name: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for the report)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            config,
            compact,
        } => cmd_run(&scenario, config.as_deref(), compact),
        Commands::Builtin { name } => cmd_builtin(name),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Run one scenario file. Returns the conservation verdict.
fn cmd_run(path: &Path, config: Option<&Path>, compact: bool) -> Result<bool, ScenarioError> {
    let mut scenario = Scenario::load(path)?;
    if let Some(config_path) = config {
        scenario.config = SessionConfig::load(config_path)?;
        tracing::info!(config = %config_path.display(), "session config overridden");
    }

    let report = ScenarioRunner::new(scenario)?.run()?;
    print_report(&report, compact);
    Ok(report.conserved)
}

/// Run built-in scenarios. Returns `true` when all are conserved.
fn cmd_builtin(name: Option<String>) -> Result<bool, ScenarioError> {
    let names: Vec<String> = match name {
        Some(name) => vec![name],
        None => Scenario::BUILTIN.iter().map(|n| (*n).to_string()).collect(),
    };

    let mut all_conserved = true;
    for name in names {
        let scenario = Scenario::builtin(&name)
            .ok_or_else(|| ScenarioError::Invalid(format!("no built-in scenario '{name}'")))?;
        let report = ScenarioRunner::new(scenario)?.run()?;
        tracing::info!(
            scenario = %report.scenario,
            conserved = report.conserved,
            warnings = report.warning_count(),
            "scenario finished"
        );
        all_conserved &= report.conserved;
        print_report(&report, false);
    }
    Ok(all_conserved)
}

fn print_report(report: &ScenarioReport, compact: bool) {
    let json = if compact {
        serde_json::to_string(report)
    } else {
        report.to_json()
    };
    match json {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!("Failed to serialize report: {e}"),
    }
}
