use log::*;
use scoreboard_common::{
    config::Ruleset,
    game_state::{GameState, MAX_CLOCK_MINUTES, MAX_CLOCK_SECONDS},
    side::Clock,
};

pub mod action;
pub use action::*;

/// The state of one context before and after a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub prev: GameState,
    pub next: GameState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.prev != self.next
    }
}

/// Owns the game state of a single context. All changes go through [`apply`].
#[derive(Debug)]
pub struct StateStore {
    rules: Ruleset,
    state: GameState,
}

impl StateStore {
    pub fn new(rules: Ruleset, state: GameState) -> Self {
        Self { rules, state }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn dispatch(&mut self, action: &Action) -> Transition {
        if action.ticked_clock().is_some() {
            trace!("Applying {action:?}");
        } else {
            info!("Applying {action:?}");
        }
        let next = apply(&self.rules, &self.state, action);
        let prev = std::mem::replace(&mut self.state, next);
        Transition {
            prev,
            next: self.state.clone(),
        }
    }

    /// Unconditionally adopts a state produced elsewhere
    pub fn replace(&mut self, state: GameState) -> Transition {
        let prev = std::mem::replace(&mut self.state, state);
        Transition {
            prev,
            next: self.state.clone(),
        }
    }
}

/// Computes the state that results from applying `action` to `state`. Never fails: any
/// numeric value that would leave its valid range is clamped.
pub fn apply(rules: &Ruleset, state: &GameState, action: &Action) -> GameState {
    let mut next = state.clone();
    match action {
        Action::SetTeamField(side, field) => {
            let team = next.team_mut(*side);
            match field {
                TeamField::Name(name) => team.name.clone_from(name),
                TeamField::Score(score) => team.score = *score,
                TeamField::Fouls(fouls) => team.fouls = *fouls,
                TeamField::Timeouts(timeouts) => {
                    team.timeouts = rules.clamp_timeouts((*timeouts).into())
                }
                TeamField::Logo(logo) => team.logo.clone_from(logo),
            }
        }
        Action::AdjustScore(side, delta) => {
            let team = next.team_mut(*side);
            team.score = adjust_counter(team.score, *delta);
        }
        Action::AdjustFouls(side, delta) => {
            let team = next.team_mut(*side);
            team.fouls = adjust_counter(team.fouls, *delta);
        }
        Action::AdjustTimeouts(side, delta) => {
            let team = next.team_mut(*side);
            team.timeouts = rules.clamp_timeouts(i64::from(team.timeouts) + i64::from(*delta));
        }
        Action::SetPeriod(period) => change_period(rules, &mut next, (*period).into()),
        Action::AdjustPeriod(delta) => {
            let period = i64::from(next.period) + i64::from(*delta);
            change_period(rules, &mut next, period)
        }
        Action::SetGameClock { minutes, seconds } => {
            next.game_clock_minutes = clamp_clock_part((*minutes).into(), MAX_CLOCK_MINUTES);
            next.game_clock_seconds = clamp_clock_part((*seconds).into(), MAX_CLOCK_SECONDS);
        }
        Action::AdjustGameClock { minutes, seconds } => {
            next.game_clock_minutes = clamp_clock_part(
                i64::from(next.game_clock_minutes) + i64::from(*minutes),
                MAX_CLOCK_MINUTES,
            );
            next.game_clock_seconds = clamp_clock_part(
                i64::from(next.game_clock_seconds) + i64::from(*seconds),
                MAX_CLOCK_SECONDS,
            );
        }
        Action::StartGameClock => next.game_clock_running = true,
        Action::StopGameClock => next.game_clock_running = false,
        Action::TogglePossession => {
            next.possession = next.possession.other();
            if next.shot_clock_enabled {
                next.shot_clock_seconds = next.default_shot_clock_seconds.seconds();
                next.shot_clock_running = true;
            }
        }
        Action::SetShotClockDefault(rule) => {
            next.default_shot_clock_seconds = *rule;
            next.shot_clock_seconds = rule.seconds();
        }
        Action::AdjustShotClockSeconds(delta) => {
            next.shot_clock_seconds = (i64::from(next.shot_clock_seconds) + i64::from(*delta))
                .clamp(0, next.default_shot_clock_seconds.seconds().into())
                as u8;
        }
        Action::StartShotClock => next.shot_clock_running = true,
        Action::StopShotClock => next.shot_clock_running = false,
        Action::SetShotClockEnabled(enabled) => {
            // A shot clock that was off never resumes on its own
            if !enabled || !next.shot_clock_enabled {
                next.shot_clock_running = false;
            }
            next.shot_clock_enabled = *enabled;
        }
        Action::ToggleBuzzer(Clock::Game) => next.game_buzzer_enabled = !next.game_buzzer_enabled,
        Action::ToggleBuzzer(Clock::Shot) => next.shot_buzzer_enabled = !next.shot_buzzer_enabled,
        Action::TickGameClock => {
            if next.game_clock_running {
                match next.game_clock_total_secs() {
                    0 => next.game_clock_running = false,
                    total => next.set_game_clock_total_secs(total - 1),
                }
            }
        }
        Action::TickShotClock => {
            if next.is_running(Clock::Shot) {
                match next.shot_clock_seconds {
                    0 => next.shot_clock_running = false,
                    secs => next.shot_clock_seconds = secs - 1,
                }
            }
        }
        Action::ResetGame => next = GameState::new(rules),
    }
    next
}

fn adjust_counter(value: u16, delta: i32) -> u16 {
    (i64::from(value) + i64::from(delta)).clamp(0, u16::MAX.into()) as u16
}

fn clamp_clock_part(value: i64, max: u8) -> u8 {
    value.clamp(0, max.into()) as u8
}

// A new period gets a fresh shot clock that waits for the operator to start it
fn change_period(rules: &Ruleset, state: &mut GameState, period: i64) {
    let period = rules.clamp_period(period);
    if period != state.period {
        state.period = period;
        state.shot_clock_seconds = state.default_shot_clock_seconds.seconds();
        state.shot_clock_running = false;
    }
}
