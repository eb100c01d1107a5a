use crate::side::Clock;
use core::ops::{Index, IndexMut};
use derivative::Derivative;

/// Per-clock storage, used wherever the game and shot clocks are handled symmetrically
#[derive(Derivative)]
#[derivative(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockBundle<T> {
    pub game: T,
    pub shot: T,
}

impl<T> ClockBundle<T> {
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Clock, &mut T)> {
        [(Clock::Game, &mut self.game), (Clock::Shot, &mut self.shot)].into_iter()
    }
}

impl<T> Index<Clock> for ClockBundle<T> {
    type Output = T;

    fn index(&self, clock: Clock) -> &Self::Output {
        match clock {
            Clock::Game => &self.game,
            Clock::Shot => &self.shot,
        }
    }
}

impl<T> IndexMut<Clock> for ClockBundle<T> {
    fn index_mut(&mut self, clock: Clock) -> &mut Self::Output {
        match clock {
            Clock::Game => &mut self.game,
            Clock::Shot => &mut self.shot,
        }
    }
}
