//! `grouplink batch`: step a paged job until it finishes.

use anyhow::{bail, Context, Result};
use clap::Args;
use grouplink_core::{settings, Direction};
use grouplink_sync::batch::Phase;
use grouplink_sync::job::SCOPE_MANUAL;
use grouplink_sync::{run_one_step, JobId, Tally};

use super::step::print_step;
use super::{home, open, print_tally};
use crate::progress::Progress;
use crate::DirectionArg;

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// crm-to-platform or platform-to-crm.
    pub direction: DirectionArg,

    /// Rows per step; defaults to the configured batch count.
    #[arg(long)]
    pub step_size: Option<u64>,

    #[arg(long, default_value = SCOPE_MANUAL)]
    pub scope: String,
}

impl BatchArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let direction: Direction = self.direction.into();
        let step_size = match self.step_size {
            Some(size) => size,
            None => settings::load_at(&home).context("failed to load settings")?.batch_count,
        };
        let ctx = open(&home);
        let job = JobId::new(direction, self.scope);
        let progress = Progress::new()?;

        let mut steps = 0u64;
        let mut tally = Tally::default();
        let mut phase: Option<Phase> = None;
        loop {
            let step = run_one_step(&ctx, &job, step_size).with_context(|| {
                format!("job '{job}' stopped after {steps} steps; rerun to resume")
            })?;
            steps += 1;
            tally.merge(Tally::of(&step.outcomes));

            if step.finished {
                println!(
                    "{}",
                    progress.done(&step.identifier, steps, &tally.to_string())?
                );
                break;
            }
            if phase != Some(step.phase) {
                phase = Some(step.phase);
                println!();
                println!("{}", progress.phase(step.phase.number())?);
                println!("{}", progress.total(step.total)?);
            }
            print_step(&progress, &step, step_size)?;
        }

        print_tally(&tally);
        if tally.failed > 0 {
            bail!("job '{job}' finished with {} failed items", tally.failed);
        }
        Ok(())
    }
}
