//! User settings: schedule interval, scheduled direction, batch size.
//!
//! Stored at `<home>/.grouplink/settings.yaml`. Missing keys fall back to
//! their defaults, so older files keep loading after new keys appear.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::paths::{self, settings_path_at, write_atomic};
use crate::types::Direction;

/// Default page size for batched runs.
pub const DEFAULT_BATCH_COUNT: u64 = 25;

/// How often the daemon runs a scheduled step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Interval {
    #[default]
    #[serde(rename = "off")]
    Off,
    #[serde(rename = "5minutes")]
    FiveMinutes,
    #[serde(rename = "10minutes")]
    TenMinutes,
    #[serde(rename = "20minutes")]
    TwentyMinutes,
    #[serde(rename = "halfhourly")]
    HalfHourly,
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "twicedaily")]
    TwiceDaily,
    #[serde(rename = "daily")]
    Daily,
}

impl Interval {
    /// Tick period, or `None` when scheduling is off.
    pub fn period(self) -> Option<Duration> {
        let secs = match self {
            Interval::Off => return None,
            Interval::FiveMinutes => 300,
            Interval::TenMinutes => 600,
            Interval::TwentyMinutes => 1200,
            Interval::HalfHourly => 1800,
            Interval::Hourly => 3600,
            Interval::TwiceDaily => 43_200,
            Interval::Daily => 86_400,
        };
        Some(Duration::from_secs(secs))
    }

    pub fn key(self) -> &'static str {
        match self {
            Interval::Off => "off",
            Interval::FiveMinutes => "5minutes",
            Interval::TenMinutes => "10minutes",
            Interval::TwentyMinutes => "20minutes",
            Interval::HalfHourly => "halfhourly",
            Interval::Hourly => "hourly",
            Interval::TwiceDaily => "twicedaily",
            Interval::Daily => "daily",
        }
    }

    pub fn all() -> [Interval; 8] {
        [
            Interval::Off,
            Interval::FiveMinutes,
            Interval::TenMinutes,
            Interval::TwentyMinutes,
            Interval::HalfHourly,
            Interval::Hourly,
            Interval::TwiceDaily,
            Interval::Daily,
        ]
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Interval::all()
            .into_iter()
            .find(|interval| interval.key() == wanted)
            .ok_or_else(|| {
                let keys: Vec<&str> = Interval::all().iter().map(|i| i.key()).collect();
                format!("unknown interval '{s}'; expected one of: {}", keys.join(", "))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub interval: Interval,
    /// Direction used by scheduled runs.
    #[serde(default)]
    pub direction: Direction,
    /// Page size for scheduled runs; `0` runs a full sync on every tick.
    #[serde(default = "default_batch_count")]
    pub batch_count: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval: Interval::Off,
            direction: Direction::CrmToPlatform,
            batch_count: DEFAULT_BATCH_COUNT,
        }
    }
}

fn default_batch_count() -> u64 {
    DEFAULT_BATCH_COUNT
}

/// Load settings; a missing file yields [`Settings::default`].
pub fn load_at(home: &Path) -> Result<Settings, RegistryError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| RegistryError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, RegistryError> {
    load_at(&paths::home()?)
}

/// Atomically save settings.
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), RegistryError> {
    let yaml = serde_yaml::to_string(settings)?;
    write_atomic(&settings_path_at(home), &yaml)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), RegistryError> {
    save_at(&paths::home()?, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let home = TempDir::new().expect("home");
        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.batch_count, 25);
        assert_eq!(settings.interval, Interval::Off);
    }

    #[test]
    fn partial_file_fills_missing_keys() {
        let home = TempDir::new().expect("home");
        write_atomic(&settings_path_at(home.path()), "interval: 10minutes\n").expect("seed");
        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings.interval, Interval::TenMinutes);
        assert_eq!(settings.batch_count, DEFAULT_BATCH_COUNT);
        assert_eq!(settings.direction, Direction::CrmToPlatform);
    }

    #[test]
    fn save_then_load() {
        let home = TempDir::new().expect("home");
        let settings = Settings {
            interval: Interval::HalfHourly,
            direction: Direction::PlatformToCrm,
            batch_count: 0,
        };
        save_at(home.path(), &settings).expect("save");
        assert_eq!(load_at(home.path()).expect("load"), settings);
    }

    #[test]
    fn corrupt_file_reports_path() {
        let home = TempDir::new().expect("home");
        write_atomic(&settings_path_at(home.path()), "interval: [nope").expect("seed");
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("settings.yaml"));
    }

    #[rstest]
    #[case(Interval::Off, None)]
    #[case(Interval::FiveMinutes, Some(300))]
    #[case(Interval::TenMinutes, Some(600))]
    #[case(Interval::TwentyMinutes, Some(1200))]
    #[case(Interval::HalfHourly, Some(1800))]
    fn interval_periods(#[case] interval: Interval, #[case] secs: Option<u64>) {
        assert_eq!(interval.period(), secs.map(Duration::from_secs));
    }

    #[test]
    fn interval_keys_parse_back() {
        for interval in Interval::all() {
            assert_eq!(interval.key().parse::<Interval>(), Ok(interval));
        }
        assert!("weekly".parse::<Interval>().is_err());
    }
}
