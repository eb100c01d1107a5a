use scoreboard_common::{
    game_state::{GameState, ShotClockRule},
    side::{Clock, TeamSide},
};

/// A single field of a team record, carrying its new value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamField {
    Name(String),
    Score(u16),
    Fouls(u16),
    Timeouts(u8),
    Logo(Option<String>),
}

/// Every way the game state can change. Numeric parameters are signed so that out of range
/// requests can be clamped rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetTeamField(TeamSide, TeamField),
    AdjustScore(TeamSide, i32),
    AdjustFouls(TeamSide, i32),
    AdjustTimeouts(TeamSide, i32),
    SetPeriod(i32),
    AdjustPeriod(i32),
    SetGameClock { minutes: i32, seconds: i32 },
    AdjustGameClock { minutes: i32, seconds: i32 },
    StartGameClock,
    StopGameClock,
    TogglePossession,
    SetShotClockDefault(ShotClockRule),
    AdjustShotClockSeconds(i32),
    StartShotClock,
    StopShotClock,
    SetShotClockEnabled(bool),
    ToggleBuzzer(Clock),
    TickGameClock,
    TickShotClock,
    ResetGame,
}

impl Action {
    pub fn tick(clock: Clock) -> Self {
        match clock {
            Clock::Game => Self::TickGameClock,
            Clock::Shot => Self::TickShotClock,
        }
    }

    /// The clock this action advances, if it is a tick
    pub fn ticked_clock(&self) -> Option<Clock> {
        match self {
            Self::TickGameClock => Some(Clock::Game),
            Self::TickShotClock => Some(Clock::Shot),
            _ => None,
        }
    }

    /// A possession change restarts the shot clock countdown from its reset value, so the
    /// running timer has to be replaced rather than left on its old cadence.
    pub fn restarts_shot_clock(&self, prev: &GameState) -> bool {
        matches!(self, Self::TogglePossession) && prev.shot_clock_enabled
    }
}
