//! `grouplink daemon`: run the scheduler in the foreground, or talk to a
//! running one over its socket.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;

use grouplink_core::settings;
use grouplink_daemon::paths::{socket_path, stderr_log_path, stdout_log_path};
use grouplink_daemon::{request_full, request_status, request_stop, start_blocking, DaemonError};

use super::{home, print_tally};
use crate::DirectionArg;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (scheduler + socket server).
    Start,
    /// Ask a running daemon to shut down.
    Stop,
    /// Show what a running daemon is doing.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Queue a full sync on the running daemon and wait for it.
    Full {
        /// Defaults to the scheduled direction from settings.
        direction: Option<DirectionArg>,
    },
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status { json } => match request_status(&home) {
            Ok(status) if json => println!(
                "{}",
                serde_json::to_string_pretty(&status)
                    .context("failed to render daemon status JSON")?
            ),
            Ok(status) => print_status(&status),
            Err(DaemonError::DaemonNotRunning { .. }) if json => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { socket }) => {
                println!("daemon is not running (no socket at {})", socket.display());
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Full { direction } => {
            let direction = match direction {
                Some(d) => d.0,
                None => settings::load_at(&home)
                    .context("failed to load settings")?
                    .direction,
            };
            let data = request_full(&home, direction)
                .with_context(|| format!("daemon full sync {direction} failed"))?;
            let tally = serde_json::from_value(data["tally"].clone())
                .context("daemon returned a malformed tally")?;
            println!("{} full sync {direction} on the daemon", "✓".green());
            print_tally(&tally);
        }
        DaemonCommand::Logs(args) => {
            if !args.stderr_only {
                print_tail(&stdout_log_path(&home), args.lines)
                    .context("failed to read daemon stdout log")?;
            }
            print_tail(&stderr_log_path(&home), args.lines)
                .context("failed to read daemon stderr log")?;
        }
    }

    Ok(())
}

fn print_status(status: &Value) {
    println!("daemon: {}", "running".green().bold());
    if let Some(settings) = status.get("settings") {
        println!(
            "schedule: {} every {}",
            settings["direction"].as_str().unwrap_or("?"),
            settings["interval"].as_str().unwrap_or("?"),
        );
    }
    let jobs = status["jobs"].as_array().map_or(0, Vec::len);
    println!("jobs in progress: {jobs}");
    match status.get("last_run").filter(|v| !v.is_null()) {
        Some(last) => println!(
            "last run: {} ({}, {} ms){}",
            last["run"].as_str().unwrap_or("?"),
            last["source"].as_str().unwrap_or("?"),
            last["duration_ms"],
            if last["finished"].as_bool() == Some(true) {
                ", finished"
            } else {
                ""
            },
        ),
        None => println!("last run: {}", "none yet".bright_black()),
    }
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
