//! Colored progress notices on stdout

use colored::Colorize;

use crate::discovery::TaskSpec;
use crate::pool::Progress;
use crate::report::{Outcome, TaskResult};

pub struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn queued(&self, specs: &[TaskSpec], limit: usize) {
        println!(
            "{}",
            format!(
                "Running {} click tests in parallel, {} at a time... (this will take a while...)",
                specs.len(),
                limit
            )
            .bold()
        );
    }

    fn started(&self, spec: &TaskSpec) {
        println!("{} \t{}", "Clicktest started!".blue(), spec.name);
    }

    fn finished(&self, result: &TaskResult) {
        let elapsed = format!("({:.1}s)", result.duration.as_secs_f64());
        match result.outcome {
            Outcome::Success => {
                println!(
                    "{} \t{} {}",
                    "Clicktest success!".green(),
                    result.name,
                    elapsed.dimmed()
                );
            }
            Outcome::Failure { exit_code, reason } => {
                let detail = match exit_code {
                    Some(code) => format!("{}, exit code {}", reason, code),
                    None => reason.to_string(),
                };
                println!(
                    "{} \t{} {} {}",
                    "Clicktest fail!".red(),
                    result.name,
                    detail.dimmed(),
                    elapsed.dimmed()
                );
            }
        }
    }
}
