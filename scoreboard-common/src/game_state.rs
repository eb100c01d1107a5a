use crate::{
    config::Ruleset,
    side::{Clock, TeamSide},
};
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_CLOCK_MINUTES: u8 = 59;
pub const MAX_CLOCK_SECONDS: u8 = 59;
const MAX_GAME_CLOCK_SECS: u16 = MAX_CLOCK_MINUTES as u16 * 60 + MAX_CLOCK_SECONDS as u16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub score: u16,
    pub fouls: u16,
    pub timeouts: u8,
    /// Opaque image data (usually a data URI), never inspected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl Team {
    pub fn new(side: TeamSide, rules: &Ruleset) -> Self {
        Self {
            name: side.to_string().to_uppercase(),
            score: 0,
            fouls: 0,
            timeouts: rules.max_timeouts,
            logo: None,
        }
    }
}

/// The shot clock lengths in use across leagues. Serialized as the plain number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Sequence)]
#[serde(try_from = "u8", into = "u8")]
pub enum ShotClockRule {
    Fourteen,
    TwentyFour,
    Thirty,
}

impl ShotClockRule {
    pub fn seconds(self) -> u8 {
        match self {
            Self::Fourteen => 14,
            Self::TwentyFour => 24,
            Self::Thirty => 30,
        }
    }
}

impl Default for ShotClockRule {
    fn default() -> Self {
        Self::TwentyFour
    }
}

impl From<ShotClockRule> for u8 {
    fn from(rule: ShotClockRule) -> Self {
        rule.seconds()
    }
}

impl TryFrom<u8> for ShotClockRule {
    type Error = InvalidShotClock;

    fn try_from(seconds: u8) -> Result<Self, Self::Error> {
        match seconds {
            14 => Ok(Self::Fourteen),
            24 => Ok(Self::TwentyFour),
            30 => Ok(Self::Thirty),
            other => Err(InvalidShotClock(other)),
        }
    }
}

impl core::fmt::Display for ShotClockRule {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}s", self.seconds())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} is not a valid shot clock length, expected 14, 24 or 30")]
pub struct InvalidShotClock(pub u8);

/// Complete scoreboard state. This is the value that gets persisted and broadcast, so the
/// field names are serialized in camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub home: Team,
    pub away: Team,
    pub period: u16,
    pub game_clock_minutes: u8,
    pub game_clock_seconds: u8,
    pub game_clock_running: bool,
    pub shot_clock_seconds: u8,
    pub default_shot_clock_seconds: ShotClockRule,
    pub shot_clock_enabled: bool,
    pub shot_clock_running: bool,
    pub possession: TeamSide,
    pub game_buzzer_enabled: bool,
    pub shot_buzzer_enabled: bool,
}

impl GameState {
    pub fn new(rules: &Ruleset) -> Self {
        Self {
            home: Team::new(TeamSide::Home, rules),
            away: Team::new(TeamSide::Away, rules),
            period: 1,
            game_clock_minutes: rules.period_minutes.min(MAX_CLOCK_MINUTES),
            game_clock_seconds: 0,
            game_clock_running: false,
            shot_clock_seconds: rules.shot_clock.seconds(),
            default_shot_clock_seconds: rules.shot_clock,
            shot_clock_enabled: rules.shot_clock_enabled,
            shot_clock_running: false,
            possession: TeamSide::Home,
            game_buzzer_enabled: true,
            shot_buzzer_enabled: true,
        }
    }

    pub fn team(&self, side: TeamSide) -> &Team {
        match side {
            TeamSide::Home => &self.home,
            TeamSide::Away => &self.away,
        }
    }

    pub fn team_mut(&mut self, side: TeamSide) -> &mut Team {
        match side {
            TeamSide::Home => &mut self.home,
            TeamSide::Away => &mut self.away,
        }
    }

    pub fn game_clock_total_secs(&self) -> u16 {
        self.game_clock_minutes as u16 * 60 + self.game_clock_seconds as u16
    }

    /// Stores `total` seconds as normalized minutes and seconds, saturating at 59:59
    pub fn set_game_clock_total_secs(&mut self, total: u16) {
        let total = total.min(MAX_GAME_CLOCK_SECS);
        self.game_clock_minutes = (total / 60) as u8;
        self.game_clock_seconds = (total % 60) as u8;
    }

    pub fn remaining_secs(&self, clock: Clock) -> u16 {
        match clock {
            Clock::Game => self.game_clock_total_secs(),
            Clock::Shot => self.shot_clock_seconds.into(),
        }
    }

    pub fn is_running(&self, clock: Clock) -> bool {
        match clock {
            Clock::Game => self.game_clock_running,
            Clock::Shot => self.shot_clock_running && self.shot_clock_enabled,
        }
    }

    pub fn buzzer_enabled(&self, clock: Clock) -> bool {
        match clock {
            Clock::Game => self.game_buzzer_enabled,
            Clock::Shot => self.shot_buzzer_enabled,
        }
    }

    /// Returns a copy with every field pulled back into its valid range
    pub fn normalized(&self, rules: &Ruleset) -> Self {
        let mut state = self.clone();
        for side in [TeamSide::Home, TeamSide::Away] {
            let team = state.team_mut(side);
            team.timeouts = team.timeouts.min(rules.max_timeouts);
        }
        state.period = rules.clamp_period(state.period.into());
        state.game_clock_minutes = state.game_clock_minutes.min(MAX_CLOCK_MINUTES);
        state.game_clock_seconds = state.game_clock_seconds.min(MAX_CLOCK_SECONDS);
        state.shot_clock_seconds = state
            .shot_clock_seconds
            .min(state.default_shot_clock_seconds.seconds());
        if !state.shot_clock_enabled {
            state.shot_clock_running = false;
        }
        state
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(&Ruleset::default())
    }
}
