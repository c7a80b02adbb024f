//! clickpool - run end-to-end test specs in parallel
//!
//! Each spec runs as its own test runner process, at most N at a time. The
//! exit status is zero only if every spec passed.

use clap::Parser;
use clickpool::{cli, commands::Commands, common::logging};

#[derive(Parser)]
#[command(name = "clickpool", about = "Bounded-concurrency runner for end-to-end test specs")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    logging::init_cli();

    let cli = Cli::parse();

    match cli::dispatch(cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
