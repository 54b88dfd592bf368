//! `grouplink capabilities`: mirror CRM permissions as platform capabilities.

use std::collections::HashSet;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

use grouplink_sync::capabilities::wanted_capabilities;
use grouplink_sync::sync_capabilities;

use super::{home, open};

#[derive(Subcommand, Debug)]
pub enum CapabilitiesCommand {
    /// Show platform capabilities and the ones CRM permissions call for.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Create a capability for every enabled CRM permission.
    Sync {
        /// Also delete capabilities whose permission is gone since the last
        /// deleting sync.
        #[arg(long)]
        delete_missing: bool,

        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: CapabilitiesCommand) -> Result<()> {
    let home = home()?;
    let ctx = open(&home);
    match command {
        CapabilitiesCommand::List { json } => {
            let wanted = wanted_capabilities(ctx.crm.as_ref(), &ctx.extensions)
                .context("failed to read crm permissions")?;
            let existing = ctx
                .platform
                .capabilities()
                .context("failed to list platform capabilities")?;
            let present: HashSet<&str> = existing.iter().map(String::as_str).collect();
            let missing: Vec<&String> = wanted
                .iter()
                .filter(|name| !present.contains(name.as_str()))
                .collect();

            if json {
                let payload = json!({
                    "capabilities": existing,
                    "wanted": wanted,
                    "missing": missing,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render capabilities JSON")?
                );
                return Ok(());
            }

            let from_crm: HashSet<&str> = wanted.iter().map(String::as_str).collect();
            for name in &existing {
                if from_crm.contains(name.as_str()) {
                    println!("  {}  {name}", "✓".green());
                } else {
                    println!("  {}  {}", "·".dimmed(), name.dimmed());
                }
            }
            for name in &missing {
                println!("  {}  {} (not synced yet)", "+".yellow(), name.yellow());
            }
        }
        CapabilitiesCommand::Sync {
            delete_missing,
            json,
        } => {
            let report = sync_capabilities(&ctx, delete_missing)
                .context("capability sync failed")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report)
                        .context("failed to render capability report JSON")?
                );
                return Ok(());
            }
            for name in &report.created {
                println!("  {}  created capability {name}", "+".green());
            }
            for name in &report.deleted {
                println!("  {}  deleted capability {name}", "-".yellow());
            }
            if report.is_noop() {
                println!("Capabilities are already in sync.");
            } else {
                println!(
                    "{} created, {} deleted, {} unchanged",
                    report.created.len(),
                    report.deleted.len(),
                    report.unchanged
                );
            }
        }
    }
    Ok(())
}
