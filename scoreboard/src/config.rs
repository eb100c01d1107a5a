use crate::{broadcast::TOPIC, persistence::STORAGE_KEY, sound_controller::SoundSettings};
use clap::ValueEnum;
use derivative::Derivative;
use enum_derive_2018::EnumDisplay;
use macro_attr_2018::macro_attr;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
pub use scoreboard_common::config::Ruleset;

macro_attr! {
    #[derive(Debug, Clone, Copy, Derivative, PartialEq, Eq, Serialize, Deserialize, ValueEnum, EnumDisplay!)]
    #[derivative(Default)]
    pub enum League {
        #[derivative(Default)]
        Nba,
        Fiba,
        Ncaa,
        HighSchool,
        Custom,
    }
}

impl League {
    /// The preset rules of the league, `None` for `Custom`
    pub fn ruleset(self) -> Option<Ruleset> {
        match self {
            Self::Nba => Some(Ruleset::nba()),
            Self::Fiba => Some(Ruleset::fiba()),
            Self::Ncaa => Some(Ruleset::ncaa()),
            Self::HighSchool => Some(Ruleset::high_school()),
            Self::Custom => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
pub struct StorageSettings {
    /// Defaults to the platform's local data directory
    pub dir: Option<PathBuf>,
    #[derivative(Default(value = "STORAGE_KEY.to_string()"))]
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
pub struct BroadcastSettings {
    #[derivative(Default(value = "64"))]
    pub capacity: usize,
    #[derivative(Default(value = "TOPIC.to_string()"))]
    pub topic: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub league: League,
    /// Only used with the `Custom` league
    pub ruleset: Ruleset,
    pub storage: StorageSettings,
    pub sound: SoundSettings,
    pub broadcast: BroadcastSettings,
}

impl Config {
    pub fn rules(&self) -> Ruleset {
        self.league
            .ruleset()
            .unwrap_or_else(|| self.ruleset.clone())
    }
}
