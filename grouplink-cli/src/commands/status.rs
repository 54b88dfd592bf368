//! `grouplink status`: settings, linked pairs, running jobs and the daemon.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use grouplink_core::{settings, Settings, SyncedGroupPair};
use grouplink_daemon::{request_status, DaemonError};
use grouplink_sync::{BatchState, BatchStore, IdentityResolver};
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use super::{home, open};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusReport {
    settings: Settings,
    pairs: Vec<SyncedGroupPair>,
    jobs: Vec<BatchState>,
    /// Status payload of the running daemon, `null` when it is not running.
    daemon: Option<Value>,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "job")]
    identifier: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "offset")]
    offset: u64,
    #[tabled(rename = "step size")]
    step_size: u64,
    #[tabled(rename = "last step")]
    updated: String,
}

#[derive(Tabled)]
struct PairRow {
    #[tabled(rename = "crm group")]
    crm_group: u64,
    #[tabled(rename = "platform group")]
    platform_group: u64,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let report = build_report(&home)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_report(report);
        Ok(())
    }
}

fn build_report(home: &Path) -> Result<StatusReport> {
    let settings = settings::load_at(home).context("failed to load settings")?;
    let ctx = open(home);
    let pairs = IdentityResolver::new(ctx.crm.as_ref(), &ctx.extensions)
        .list_synced_groups()
        .context("failed to list synced groups")?
        .collect();
    let jobs = BatchStore::at(home)
        .list()
        .context("failed to list running jobs")?;
    let daemon = match request_status(home) {
        Ok(status) => Some(status),
        Err(DaemonError::DaemonNotRunning { .. }) => None,
        Err(err) => return Err(err).context("failed to query daemon status"),
    };
    Ok(StatusReport {
        settings,
        pairs,
        jobs,
        daemon,
    })
}

fn print_report(report: StatusReport) {
    let separator = "■".repeat(56).bright_black().to_string();
    println!(
        "grouplink v{} | interval {} | scheduled {} | batch count {}",
        env!("CARGO_PKG_VERSION"),
        report.settings.interval,
        report.settings.direction,
        report.settings.batch_count,
    );
    match &report.daemon {
        Some(_) => println!("daemon: {}", "running".green().bold()),
        None => println!("daemon: {}", "not running".bright_black()),
    }
    println!("{separator}");

    if report.pairs.is_empty() {
        println!("No synced groups.");
    } else {
        println!("{}", "SYNCED GROUPS".bold());
        let rows: Vec<PairRow> = report
            .pairs
            .iter()
            .map(|pair| PairRow {
                crm_group: pair.crm_group.into(),
                platform_group: pair.platform_group.into(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    println!("{separator}");

    if report.jobs.is_empty() {
        println!("No jobs running.");
        return;
    }
    println!("{}", "RUNNING JOBS".bold());
    let rows: Vec<JobRow> = report
        .jobs
        .into_iter()
        .map(|job| JobRow {
            identifier: job.identifier,
            phase: job.phase.to_string(),
            offset: job.cursor.get(),
            step_size: job.cursor.step_count_get(),
            updated: format!("{} ago", format_age(job.updated_at)),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("Run 'grouplink cancel <direction>' to discard a job's progress.");
}

fn format_age(timestamp: DateTime<Utc>) -> String {
    let secs = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}
