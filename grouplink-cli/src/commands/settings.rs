//! `grouplink settings`: schedule interval, scheduled direction, batch size.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use grouplink_core::paths::settings_path_at;
use grouplink_core::{settings, Interval, Settings};

use super::home;
use crate::DirectionArg;

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the current settings.
    Show {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Change one or more settings.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// off, 5minutes, 10minutes, 20minutes, halfhourly, hourly, twicedaily, daily.
    #[arg(long)]
    pub interval: Option<Interval>,

    /// Direction of scheduled runs.
    #[arg(long)]
    pub direction: Option<DirectionArg>,

    /// Rows per scheduled step; `0` runs a full sync on every tick.
    #[arg(long)]
    pub batch_count: Option<u64>,
}

pub fn run(command: SettingsCommand) -> Result<()> {
    let home = home()?;
    let mut current = settings::load_at(&home).context("failed to load settings")?;

    match command {
        SettingsCommand::Show { json } => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&current)
                        .context("failed to render settings JSON")?
                );
            } else {
                print_settings(&current);
            }
        }
        SettingsCommand::Set(args) => {
            if args.interval.is_none() && args.direction.is_none() && args.batch_count.is_none() {
                bail!("nothing to change; pass --interval, --direction or --batch-count");
            }
            apply(&mut current, args);
            settings::save_at(&home, &current).context("failed to save settings")?;
            println!("saved {}", settings_path_at(&home).display());
            print_settings(&current);
        }
    }
    Ok(())
}

fn apply(settings: &mut Settings, args: SetArgs) {
    if let Some(interval) = args.interval {
        settings.interval = interval;
    }
    if let Some(direction) = args.direction {
        settings.direction = direction.into();
    }
    if let Some(batch_count) = args.batch_count {
        settings.batch_count = batch_count;
    }
}

fn print_settings(settings: &Settings) {
    println!("interval:    {}", settings.interval);
    println!("direction:   {}", settings.direction);
    println!("batch count: {}", settings.batch_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use grouplink_core::Direction;

    #[test]
    fn apply_changes_only_given_fields() {
        let mut settings = Settings::default();
        apply(
            &mut settings,
            SetArgs {
                interval: Some(Interval::Hourly),
                direction: None,
                batch_count: Some(0),
            },
        );
        assert_eq!(settings.interval, Interval::Hourly);
        assert_eq!(settings.direction, Direction::CrmToPlatform);
        assert_eq!(settings.batch_count, 0);
    }
}
