use anyhow::{Context, Result};
use clap::Args;
use grouplink_core::Direction;
use grouplink_daemon::request_cancel;
use grouplink_sync::job::SCOPE_MANUAL;
use grouplink_sync::{job_cancel, JobId};

use super::{home, open};
use crate::DirectionArg;

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// crm-to-platform or platform-to-crm.
    pub direction: DirectionArg,

    #[arg(long, default_value = SCOPE_MANUAL)]
    pub scope: String,

    /// Cancel through the running daemon, between its steps.
    #[arg(long)]
    pub daemon: bool,
}

impl CancelArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let direction: Direction = self.direction.into();
        let job = JobId::new(direction, self.scope);

        let cancelled = if self.daemon {
            request_cancel(&home, direction)
                .context("daemon cancel failed")?
                .get("cancelled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        } else {
            job_cancel(&open(&home), &job).with_context(|| format!("failed to cancel '{job}'"))?
        };

        if cancelled {
            println!("cancelled job '{job}'");
        } else {
            println!("job '{job}' is not running");
        }
        Ok(())
    }
}
