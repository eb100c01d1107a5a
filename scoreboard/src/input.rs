use crate::store::{Action, TeamField};
use scoreboard_common::{
    game_state::{InvalidShotClock, ShotClockRule},
    side::{Clock, TeamSide},
};
use thiserror::Error;

pub const HELP: &str = "\
score|foul|timeout <home|away> <+N|-N|N>
period <+N|-N|N>
clock <start|stop|MM:SS|+M +S>
shot <start|stop|on|off|+N|-N|default 14|24|30>
possession
buzzer <game|shot>
test <game|shot>
name <home|away> <text>
logo <home|away> <data|none>
reset
quit";

/// A line of operator input, decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Apply(Action),
    TestBuzzer(Clock),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Nothing to do")]
    Empty,
    #[error("Unknown command {0:?}, try `help`")]
    UnknownCommand(String),
    #[error("Missing {0}")]
    Missing(&'static str),
    #[error("Expected home or away, got {0:?}")]
    BadSide(String),
    #[error("Expected game or shot, got {0:?}")]
    BadClock(String),
    #[error("Expected a number, got {0:?}")]
    BadNumber(String),
    #[error("Expected a time like 10:00, got {0:?}")]
    BadTime(String),
    #[error(transparent)]
    BadShotClock(#[from] InvalidShotClock),
    #[error("Unexpected {0:?}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

pub fn parse_command(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Err(ParseError::Empty);
    };

    let parsed = match command.to_lowercase().as_str() {
        "score" | "foul" | "fouls" | "timeout" | "timeouts" => {
            let side = parse_side(words.next())?;
            let value = words.next().ok_or(ParseError::Missing("a value"))?;
            let action = match (command.to_lowercase().chars().next(), is_relative(value)) {
                (Some('s'), true) => Action::AdjustScore(side, parse_number(value)?),
                (Some('s'), false) => {
                    Action::SetTeamField(side, TeamField::Score(parse_number(value)?))
                }
                (Some('f'), true) => Action::AdjustFouls(side, parse_number(value)?),
                (Some('f'), false) => {
                    Action::SetTeamField(side, TeamField::Fouls(parse_number(value)?))
                }
                (_, true) => Action::AdjustTimeouts(side, parse_number(value)?),
                (_, false) => {
                    Action::SetTeamField(side, TeamField::Timeouts(parse_number(value)?))
                }
            };
            Command::Apply(action)
        }
        "period" => {
            let value = words.next().ok_or(ParseError::Missing("a period"))?;
            if is_relative(value) {
                Command::Apply(Action::AdjustPeriod(parse_number(value)?))
            } else {
                Command::Apply(Action::SetPeriod(parse_number(value)?))
            }
        }
        "clock" => Command::Apply(parse_clock(&mut words)?),
        "shot" => Command::Apply(parse_shot(&mut words)?),
        "possession" | "poss" => Command::Apply(Action::TogglePossession),
        "buzzer" => Command::Apply(Action::ToggleBuzzer(parse_clock_name(words.next())?)),
        "test" => Command::TestBuzzer(parse_clock_name(words.next())?),
        "name" => {
            let side = parse_side(words.next())?;
            let name = words.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err(ParseError::Missing("a name"));
            }
            return Ok(Command::Apply(Action::SetTeamField(
                side,
                TeamField::Name(name),
            )));
        }
        "logo" => {
            let side = parse_side(words.next())?;
            let logo = match words.next() {
                None => return Err(ParseError::Missing("logo data")),
                Some("none") => None,
                Some(data) => Some(data.to_string()),
            };
            Command::Apply(Action::SetTeamField(side, TeamField::Logo(logo)))
        }
        "reset" => Command::Apply(Action::ResetGame),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Err(ParseError::UnknownCommand(command.to_string())),
    };

    match words.next() {
        Some(extra) => Err(ParseError::Unexpected(extra.to_string())),
        None => Ok(parsed),
    }
}

fn is_relative(value: &str) -> bool {
    value.starts_with('+') || value.starts_with('-')
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ParseError::BadNumber(value.to_string()))
}

fn parse_side(word: Option<&str>) -> Result<TeamSide> {
    match word.map(str::to_lowercase).as_deref() {
        Some("home") | Some("h") => Ok(TeamSide::Home),
        Some("away") | Some("a") => Ok(TeamSide::Away),
        Some(other) => Err(ParseError::BadSide(other.to_string())),
        None => Err(ParseError::Missing("a team")),
    }
}

fn parse_clock_name(word: Option<&str>) -> Result<Clock> {
    match word.map(str::to_lowercase).as_deref() {
        Some("game") => Ok(Clock::Game),
        Some("shot") => Ok(Clock::Shot),
        Some(other) => Err(ParseError::BadClock(other.to_string())),
        None => Err(ParseError::Missing("a clock")),
    }
}

fn parse_clock<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<Action> {
    let first = words.next().ok_or(ParseError::Missing("a clock setting"))?;
    match first {
        "start" => Ok(Action::StartGameClock),
        "stop" => Ok(Action::StopGameClock),
        _ if is_relative(first) => {
            let seconds = words.next().ok_or(ParseError::Missing("a seconds change"))?;
            Ok(Action::AdjustGameClock {
                minutes: parse_number(first)?,
                seconds: parse_number(seconds)?,
            })
        }
        _ => {
            let (minutes, seconds) = first
                .split_once(':')
                .ok_or_else(|| ParseError::BadTime(first.to_string()))?;
            let bad_time = |_| ParseError::BadTime(first.to_string());
            Ok(Action::SetGameClock {
                minutes: minutes.parse().map_err(bad_time)?,
                seconds: seconds.parse().map_err(bad_time)?,
            })
        }
    }
}

fn parse_shot<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<Action> {
    let first = words.next().ok_or(ParseError::Missing("a shot clock setting"))?;
    match first {
        "start" => Ok(Action::StartShotClock),
        "stop" => Ok(Action::StopShotClock),
        "on" => Ok(Action::SetShotClockEnabled(true)),
        "off" => Ok(Action::SetShotClockEnabled(false)),
        "default" => {
            let seconds = words.next().ok_or(ParseError::Missing("a shot clock length"))?;
            let rule = ShotClockRule::try_from(parse_number::<u8>(seconds)?)?;
            Ok(Action::SetShotClockDefault(rule))
        }
        _ if is_relative(first) => Ok(Action::AdjustShotClockSeconds(parse_number(first)?)),
        _ => Err(ParseError::Unexpected(first.to_string())),
    }
}
