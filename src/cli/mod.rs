//! CLI command handling
//!
//! Merges flags over the config file, runs the command and formats output.

mod progress;

pub use progress::ConsoleProgress;

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;

use crate::commands::{Commands, DiscoveryArgs};
use crate::common::config::Config;
use crate::common::Result;
use crate::orchestrator::{self, RunSettings};
use crate::report::RunReport;

/// Dispatch a CLI command
///
/// Returns whether the command succeeded, which becomes the exit status.
pub async fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Run {
            discovery,
            concurrency,
            timeout,
            runner,
            runner_args,
            no_bail,
            max_output_mb,
            report_json,
        } => {
            let mut config = load_config(&discovery)?;
            if let Some(concurrency) = concurrency {
                config.pool.concurrency = concurrency;
            }
            if let Some(timeout) = timeout {
                config.runner.timeout_secs = timeout;
            }
            if let Some(runner) = runner {
                config.runner.program = runner;
            }
            if !runner_args.is_empty() {
                config.runner.args = runner_args;
            }
            if no_bail {
                config.runner.bail = false;
            }
            if let Some(mb) = max_output_mb {
                config.runner.max_output_mb = mb;
            }

            let settings = RunSettings::from_config(&config);
            let report = orchestrator::run(&settings, Arc::new(ConsoleProgress)).await?;

            print_report(&report)?;

            if let Some(path) = report_json {
                report.write_json(&path)?;
                println!("Report written to {}", path.display());
            }

            Ok(report.overall)
        }

        Commands::List { discovery } => {
            let config = load_config(&discovery)?;
            let settings = RunSettings::from_config(&config);
            let specs = settings.discover()?;

            for (i, spec) in specs.iter().enumerate() {
                println!("{:>3}. {}", i + 1, spec.name);
            }
            println!("{} specs in {}", specs.len(), settings.dir.display());

            Ok(true)
        }
    }
}

/// Load the config file and apply the discovery flags
fn load_config(args: &DiscoveryArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(dir) = &args.dir {
        config.discovery.dir = dir.clone();
    }
    if let Some(prefix) = &args.prefix {
        config.discovery.prefix = prefix.clone();
    }
    if let Some(smoke) = &args.smoke {
        config.discovery.smoke = Some(smoke.clone());
    }
    if args.no_smoke {
        config.discovery.smoke = None;
    }

    Ok(config)
}

/// Print the logs of failed specs and a summary line
fn print_report(report: &RunReport) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    report.write_failure_logs(&mut out)?;
    out.flush()?;

    let summary = report.summary();
    let line = format!(
        "{} passed, {} failed, {} total",
        summary.passed, summary.failed, summary.total
    );
    if report.overall {
        println!("\n{}", line.green().bold());
    } else {
        println!("\n{}", line.red().bold());
    }

    Ok(())
}
