//! `grouplink step`: one page of a paged job.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use grouplink_core::{settings, Direction};
use grouplink_daemon::request_step;
use grouplink_sync::job::SCOPE_MANUAL;
use grouplink_sync::{run_one_step, JobId, OutcomeKind, StepProgress};
use serde_json::Value;

use super::{home, open, print_outcome};
use crate::progress::{batch_number, Progress};
use crate::DirectionArg;

#[derive(Args, Debug)]
pub struct StepArgs {
    /// crm-to-platform or platform-to-crm.
    pub direction: DirectionArg,

    /// Rows per step; defaults to the configured batch count. `0` runs each
    /// phase in a single step.
    #[arg(long)]
    pub step_size: Option<u64>,

    /// Job scope; jobs with different scopes keep separate progress.
    #[arg(long, default_value = SCOPE_MANUAL)]
    pub scope: String,

    /// Emit the step result as JSON.
    #[arg(long)]
    pub json: bool,

    /// Run the step inside the running daemon (manual scope only).
    #[arg(long)]
    pub daemon: bool,
}

impl StepArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let direction: Direction = self.direction.into();

        if self.daemon {
            let value = request_step(&home, direction, self.step_size)
                .context("daemon step failed")?;
            return print_daemon_step(&value, self.json);
        }

        let step_size = match self.step_size {
            Some(size) => size,
            None => settings::load_at(&home).context("failed to load settings")?.batch_count,
        };
        let ctx = open(&home);
        let job = JobId::new(direction, self.scope);
        let step = run_one_step(&ctx, &job, step_size)
            .with_context(|| format!("step of job '{job}' failed"))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&step).context("failed to render step JSON")?
            );
            return Ok(());
        }
        print_step(&Progress::new()?, &step, step_size)
    }
}

/// Progress lines for one step, outcomes in between.
pub fn print_step(progress: &Progress, step: &StepProgress, step_size: u64) -> Result<()> {
    if step.finished {
        println!("{} job '{}' finished", "✓".green(), step.identifier);
        return Ok(());
    }
    let batch = batch_number(step.progress_from, step_size);
    println!(
        "{}",
        progress.current(batch, step.progress_from, step.progress_to)?
    );
    for outcome in &step.outcomes {
        if outcome.kind != OutcomeKind::AlreadyPresent {
            print_outcome(outcome);
        }
    }
    println!(
        "{}",
        progress
            .complete(batch, step.progress_from, step.progress_to)?
            .dimmed()
    );
    Ok(())
}

fn print_daemon_step(value: &Value, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("failed to render step JSON")?
        );
        return Ok(());
    }
    let identifier = value["identifier"].as_str().unwrap_or("job");
    if value["finished"].as_bool() == Some(true) {
        println!("{} job '{identifier}' finished", "✓".green());
    } else {
        println!(
            "job '{identifier}': phase {} rows {} to {} of {}",
            value["phase"], value["progress_from"], value["progress_to"], value["total"]
        );
    }
    Ok(())
}
