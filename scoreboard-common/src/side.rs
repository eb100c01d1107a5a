use derivative::Derivative;
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};

#[derive(Derivative, Serialize, Deserialize, Sequence)]
#[derivative(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    #[derivative(Default)]
    Home,
    Away,
}

impl TeamSide {
    pub fn other(self) -> Self {
        match self {
            Self::Home => Self::Away,
            Self::Away => Self::Home,
        }
    }
}

impl core::fmt::Display for TeamSide {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            Self::Home => write!(f, "Home"),
            Self::Away => write!(f, "Away"),
        }
    }
}

/// One of the two countdowns on the board, each with its own buzzer
#[derive(Derivative, Serialize, Deserialize, Sequence)]
#[derivative(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Clock {
    #[derivative(Default)]
    Game,
    Shot,
}

impl core::fmt::Display for Clock {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            Self::Game => write!(f, "Game Clock"),
            Self::Shot => write!(f, "Shot Clock"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use enum_iterator::all;

    #[test]
    fn test_other_side() {
        assert_eq!(TeamSide::Home.other(), TeamSide::Away);
        assert_eq!(TeamSide::Away.other(), TeamSide::Home);
        for side in all::<TeamSide>() {
            assert_eq!(side.other().other(), side);
        }
    }

    #[test]
    fn test_side_serde() {
        assert_eq!(serde_json::to_string(&TeamSide::Home).unwrap(), "\"home\"");
        assert_eq!(
            serde_json::from_str::<TeamSide>("\"away\"").unwrap(),
            TeamSide::Away
        );
        assert!(serde_json::from_str::<TeamSide>("\"black\"").is_err());
    }
}
