//! CLI command definitions
//!
//! Defines the clap commands for clickpool.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run every spec in parallel and report failures
    Run {
        #[command(flatten)]
        discovery: DiscoveryArgs,

        /// Maximum number of specs running at once (default: 5)
        #[arg(long, short = 'j')]
        concurrency: Option<usize>,

        /// Maximum runtime of one spec in seconds, also passed to the runner (default: 20)
        #[arg(long)]
        timeout: Option<u64>,

        /// Test runner executable (default: ./node_modules/mocha/bin/mocha)
        #[arg(long)]
        runner: Option<PathBuf>,

        /// Extra argument passed to the runner before the spec path.
        /// Can be specified multiple times: --runner-arg --require --runner-arg helper.js
        #[arg(long = "runner-arg", allow_hyphen_values = true)]
        runner_args: Vec<String>,

        /// Let specs continue after their first failing assertion
        #[arg(long)]
        no_bail: bool,

        /// Kill a spec once its output grows past this many MiB (default: 10)
        #[arg(long)]
        max_output_mb: Option<usize>,

        /// Also write the full report as JSON to this file
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// List discovered specs in dispatch order
    List {
        #[command(flatten)]
        discovery: DiscoveryArgs,
    },
}

/// Options shared by every command
#[derive(Args)]
pub struct DiscoveryArgs {
    /// Configuration file (default: platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory containing the specs (default: nmclicktests)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// File name prefix marking a spec (default: "spec.")
    #[arg(long)]
    pub prefix: Option<String>,

    /// Spec dispatched before all others (default: spec.generic.js)
    #[arg(long, conflicts_with = "no_smoke")]
    pub smoke: Option<String>,

    /// Do not move any spec to the front
    #[arg(long)]
    pub no_smoke: bool,
}
