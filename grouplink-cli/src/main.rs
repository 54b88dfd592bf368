//! grouplink: keep CRM groups and platform groups in step.
//!
//! # Usage
//!
//! ```text
//! grouplink job sync-to-platform | sync-to-crm
//! grouplink step <direction> [--step-size N] [--scope S] [--json] [--daemon]
//! grouplink batch <direction> [--step-size N] [--scope S]
//! grouplink cancel <direction> [--scope S]
//! grouplink status [--json]
//! grouplink settings show | set [--interval I] [--direction D] [--batch-count N]
//! grouplink group list | create | update | delete
//! grouplink member add | remove
//! grouplink identity link --contact C --user U
//! grouplink capabilities list | sync [--delete-missing]
//! grouplink daemon start | stop | status | logs
//! ```

mod commands;
mod progress;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    batch::BatchArgs, cancel::CancelArgs, capabilities::CapabilitiesCommand,
    daemon::DaemonCommand, group::GroupCommand, identity::IdentityCommand, job::JobCommand,
    member::MemberCommand, settings::SettingsCommand, status::StatusArgs, step::StepArgs,
};
use grouplink_core::{Direction, Side};

#[derive(Parser, Debug)]
#[command(
    name = "grouplink",
    version,
    about = "Reconcile group membership between the CRM and the web platform",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Full sync of every linked group pair in one go.
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },

    /// Run one step of a paged job.
    Step(StepArgs),

    /// Run a paged job step by step until it finishes.
    Batch(BatchArgs),

    /// Discard a running job's progress.
    Cancel(CancelArgs),

    /// Show settings, running jobs and the daemon.
    Status(StatusArgs),

    /// Show or change schedule and batch settings.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Administer groups in either registry.
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },

    /// Add or remove a member in either registry.
    Member {
        #[command(subcommand)]
        command: MemberCommand,
    },

    /// Match CRM contacts to platform users.
    Identity {
        #[command(subcommand)]
        command: IdentityCommand,
    },

    /// Mirror CRM permissions as platform capabilities.
    Capabilities {
        #[command(subcommand)]
        command: CapabilitiesCommand,
    },

    /// Run or control the scheduling daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared argument types parsed from CLI strings
// ---------------------------------------------------------------------------

/// `crm-to-platform` / `platform-to-crm` (also `to-platform` / `to-crm`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectionArg(pub Direction);

impl FromStr for DirectionArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl fmt::Display for DirectionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<DirectionArg> for Direction {
    fn from(d: DirectionArg) -> Self {
        d.0
    }
}

/// `crm` or `platform`.
#[derive(Debug, Clone, Copy)]
pub struct SideArg(pub Side);

impl FromStr for SideArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crm" | "a" => Ok(Self(Side::Crm)),
            "platform" | "b" => Ok(Self(Side::Platform)),
            other => Err(format!("unknown side '{other}'; expected: crm, platform")),
        }
    }
}

impl fmt::Display for SideArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Job { command } => commands::job::run(command),
        Commands::Step(args) => args.run(),
        Commands::Batch(args) => args.run(),
        Commands::Cancel(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Settings { command } => commands::settings::run(command),
        Commands::Group { command } => commands::group::run(command),
        Commands::Member { command } => commands::member::run(command),
        Commands::Identity { command } => commands::identity::run(command),
        Commands::Capabilities { command } => commands::capabilities::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
