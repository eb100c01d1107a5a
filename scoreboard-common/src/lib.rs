pub mod side;

pub mod bundles;

pub mod game_state;

pub mod config;
