use scoreboard_common::{config::Ruleset, game_state::GameState, side::TeamSide};

pub fn format_game_clock(state: &GameState) -> String {
    format!(
        "{:02}:{:02}",
        state.game_clock_minutes, state.game_clock_seconds
    )
}

pub fn format_shot_clock(state: &GameState) -> String {
    if state.shot_clock_enabled {
        format!("{:02}", state.shot_clock_seconds)
    } else {
        "--".to_string()
    }
}

/// Quarters or halves during regulation, numbered overtimes after it
pub fn period_label(period: u16, rules: &Ruleset) -> String {
    let regulation = rules.regulation_periods;
    if period > regulation {
        return format!("OT{}", period - regulation);
    }
    let prefix = match regulation {
        2 => "H",
        4 => "Q",
        _ => "P",
    };
    format!("{prefix}{period}")
}

fn team_label(state: &GameState, side: TeamSide) -> String {
    let marker = if state.possession == side { "*" } else { "" };
    format!("{}{marker}", state.team(side).name)
}

/// Renders the whole board on a single line, possession is marked with `*`
pub fn render_line(state: &GameState, rules: &Ruleset) -> String {
    let (home, away) = (&state.home, &state.away);
    format!(
        "{} {:02} - {:02} {} | {} {} | SHOT {} | FOULS {}-{} | TIMEOUTS {}-{}",
        team_label(state, TeamSide::Home),
        home.score,
        away.score,
        team_label(state, TeamSide::Away),
        period_label(state.period, rules),
        format_game_clock(state),
        format_shot_clock(state),
        home.fouls,
        away.fouls,
        home.timeouts,
        away.timeouts,
    )
}
