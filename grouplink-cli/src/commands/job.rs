//! `grouplink job`: unpaged full sync across every linked pair.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use grouplink_core::{Direction, Side};
use grouplink_sync::{run_full, FullSyncReport, OutcomeKind};

use super::{home, open, print_outcome, print_tally};

#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// Make platform groups match their CRM groups.
    SyncToPlatform,
    /// Make CRM groups match their platform groups.
    SyncToCrm,
}

impl JobCommand {
    fn direction(&self) -> Direction {
        match self {
            JobCommand::SyncToPlatform => Direction::CrmToPlatform,
            JobCommand::SyncToCrm => Direction::PlatformToCrm,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            JobCommand::SyncToPlatform => "sync-to-platform",
            JobCommand::SyncToCrm => "sync-to-crm",
        }
    }
}

pub fn run(command: JobCommand) -> Result<()> {
    let home = home()?;
    let ctx = open(&home);
    let direction = command.direction();

    let report = run_full(&ctx, direction)
        .with_context(|| format!("'{}' job aborted", command.name()))?;
    print_report(&report);

    if !report.is_clean() {
        bail!("'{}' job finished with failures", command.name());
    }
    println!("{} Executed '{}' job.", "✓".green(), command.name());
    Ok(())
}

fn print_report(report: &FullSyncReport) {
    if report.pairs.is_empty() {
        println!("No synced groups found.");
        return;
    }
    for pair in &report.pairs {
        let (source, target) = match report.direction.source() {
            Side::Crm => (
                pair.pair.crm_group.to_string(),
                pair.pair.platform_group.to_string(),
            ),
            Side::Platform => (
                pair.pair.platform_group.to_string(),
                pair.pair.crm_group.to_string(),
            ),
        };
        println!();
        println!(
            "{} {} {}",
            format!("Syncing {} group", report.direction.source()).green(),
            format!("(ID: {source})").yellow(),
            format!("with {} group {target}", report.direction.target()).dimmed(),
        );
        if let Some(error) = &pair.error {
            println!("  {} {}", "!".red().bold(), error.red());
            continue;
        }
        if pair.in_sync() {
            println!("  {}", "Groups are already in sync.".green());
        }
        for outcome in &pair.outcomes {
            if outcome.kind != OutcomeKind::AlreadyPresent {
                print_outcome(outcome);
            }
        }
    }
    println!();
    print_tally(&report.tally());
}
