use crate::game_state::ShotClockRule;
use log::*;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;

/// League rules that bound the game state. Everything the state store clamps against that
/// differs between leagues lives here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub max_timeouts: u8,
    pub period_minutes: u8,
    /// Periods in regulation; later periods are overtime. Only used for labelling.
    pub regulation_periods: u16,
    /// Hard cap on the period number, `None` leaves room for any number of overtimes
    pub max_period: Option<u16>,
    pub shot_clock: ShotClockRule,
    pub shot_clock_enabled: bool,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::nba()
    }
}

impl Ruleset {
    pub fn nba() -> Self {
        Self {
            max_timeouts: 7,
            period_minutes: 12,
            regulation_periods: 4,
            max_period: None,
            shot_clock: ShotClockRule::TwentyFour,
            shot_clock_enabled: true,
        }
    }

    pub fn fiba() -> Self {
        Self {
            max_timeouts: 5,
            period_minutes: 10,
            ..Self::nba()
        }
    }

    pub fn ncaa() -> Self {
        Self {
            max_timeouts: 6,
            period_minutes: 20,
            regulation_periods: 2,
            shot_clock: ShotClockRule::Thirty,
            ..Self::nba()
        }
    }

    pub fn high_school() -> Self {
        Self {
            max_timeouts: 5,
            period_minutes: 8,
            shot_clock: ShotClockRule::Thirty,
            ..Self::nba()
        }
    }

    /// Period numbers start at 1 and stop at `max_period` when one is configured
    pub fn clamp_period(&self, period: i64) -> u16 {
        let upper = self.max_period.unwrap_or(u16::MAX).max(1);
        period.clamp(1, upper.into()) as u16
    }

    pub fn clamp_timeouts(&self, timeouts: i64) -> u8 {
        timeouts.clamp(0, self.max_timeouts.into()) as u8
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let rules_file = match read_to_string(path) {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to read ruleset file: {e}");
                return Err(Box::new(e));
            }
        };

        match toml::from_str(&rules_file) {
            Ok(r) => Ok(r),
            Err(e) => {
                error!("Failed to parse ruleset file: {e}");
                Err(Box::new(e))
            }
        }
    }
}
