pub mod batch;
pub mod cancel;
pub mod capabilities;
pub mod daemon;
pub mod group;
pub mod identity;
pub mod job;
pub mod member;
pub mod settings;
pub mod status;
pub mod step;

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use grouplink_sync::{pipeline, ItemOutcome, OutcomeKind, SyncContext, Tally};

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// File-backed engine context with the live bridge attached, so admin
/// writes made through the CLI propagate like any other write.
pub fn open(home: &std::path::Path) -> SyncContext {
    pipeline::open_at(home)
}

/// One colored line per item outcome.
pub fn print_outcome(outcome: &ItemOutcome) {
    let line = outcome.to_string();
    match outcome.kind {
        OutcomeKind::Added => println!("  {}  {}", "+".green(), line.green()),
        OutcomeKind::Removed => println!("  {}  {}", "-".yellow(), line.yellow()),
        OutcomeKind::Failed { .. } => println!("  {}  {}", "!".red().bold(), line.red()),
        OutcomeKind::AlreadyPresent => println!("  {}  {}", "=".dimmed(), line.dimmed()),
        OutcomeKind::Unresolved | OutcomeKind::Preserved | OutcomeKind::NoCounterpartGroup => {
            println!("  {}  {}", "·".blue(), line.blue())
        }
    }
}

pub fn print_tally(tally: &Tally) {
    let line = tally.to_string();
    if tally.failed > 0 {
        println!("{}", line.red());
    } else {
        println!("{line}");
    }
}
