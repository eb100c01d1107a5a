use clap::Parser;
use log::*;
#[cfg(debug_assertions)]
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::{
    append::rolling_file::{
        RollingFileAppender,
        policy::compound::{
            CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
        },
    },
    config::{Appender, Config as LogConfig, Logger, Root},
    encode::pattern::PatternEncoder,
};
use scoreboard_common::{game_state::GameState, side::Clock};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
    task::{self, JoinHandle},
    time::Instant,
};

mod broadcast;
mod clock_engine;
mod context;
mod input;
mod persistence;
mod sound_controller;
mod store;
mod view;

mod config;
use config::{Config, Ruleset};

use broadcast::BroadcastHub;
use context::{ContextDeps, Role, ScoreboardContext};
use input::{Command, HELP, parse_command};
use persistence::{FileStore, KeyValueStore, Persistence};
use sound_controller::{BuzzerSink, BuzzerTestArm, SoundController};
use store::Action;

const APP_NAME: &str = "scoreboard";
const DATA_DIR_NAME: &str = "basketball-scoreboard";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(
        long = "window",
        action(clap::ArgAction::Append),
        default_values = ["", "display=true"]
    )]
    /// Open a scoreboard window for this query string, `display=true` makes it a display
    windows: Vec<String>,

    #[clap(long, value_enum)]
    /// League whose rules to use, overrides the config file
    league: Option<config::League>,

    #[clap(long)]
    /// TOML file with custom rules, overrides the league
    rules: Option<PathBuf>,

    #[clap(long)]
    /// Discard the saved game and start a new one
    new_game: bool,

    #[clap(long)]
    /// Directory the game state is saved in, default is platform dependent
    storage_dir: Option<PathBuf>,

    #[clap(long, short, action(clap::ArgAction::Count))]
    /// Increase the log verbosity
    verbose: u8,

    #[clap(long)]
    /// Directory within which log files will be placed, default is platform dependent
    log_location: Option<PathBuf>,

    #[clap(long, default_value = "5000000")]
    /// Max size in bytes that a log file is allowed to reach before being rolled over
    log_max_file_size: u64,

    #[clap(long, default_value = "3")]
    /// Number of archived logs to keep
    num_old_logs: u32,
}

fn data_local_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(directories::BaseDirs::new()
        .ok_or("Could not find a per-user data directory")?
        .data_local_dir()
        .to_path_buf())
}

fn init_logging(args: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let log_base_path = match &args.log_location {
        Some(path) => path.clone(),
        None => data_local_dir()?.join(format!("{DATA_DIR_NAME}-logs")),
    };
    let log_path = log_base_path.join(format!("{APP_NAME}-log.txt"));
    let archived_log_path = log_base_path.join(format!("{APP_NAME}-log-{{}}.txt.gz"));

    // Only log to the console in debug mode
    #[cfg(debug_assertions)]
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("[{d} {h({l:5})} {M}] {m}{n}")))
        .build();

    let roller = FixedWindowRoller::builder().build(
        archived_log_path
            .to_str()
            .ok_or("Log path is not valid unicode")?,
        args.num_old_logs,
    )?;
    let file_policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(args.log_max_file_size)),
        Box::new(roller),
    );
    let file_appender = RollingFileAppender::builder()
        .append(true)
        .encoder(Box::new(PatternEncoder::new("[{d} {l:5} {M}] {m}{n}")))
        .build(&log_path, Box::new(file_policy))?;

    let root = Root::builder().appender("file_appender");
    #[cfg(debug_assertions)]
    let root = root.appender("console");
    let root = root.build(LevelFilter::Error);

    let log_config = LogConfig::builder()
        .appender(Appender::builder().build("file_appender", Box::new(file_appender)));
    #[cfg(debug_assertions)]
    let log_config = log_config.appender(Appender::builder().build("console", Box::new(console)));

    let log_config = log_config
        .logger(Logger::builder().build(APP_NAME, log_level))
        .logger(Logger::builder().build("scoreboard_common", log_level))
        .build(root)?;

    log4rs::init_config(log_config)?;
    log_panics::init();

    #[cfg(debug_assertions)]
    eprintln!("Log path: {}", log_path.display());

    Ok(())
}

fn load_config() -> Config {
    match confy::get_configuration_file_path(APP_NAME, None) {
        Ok(path) => info!("Reading config file from {path:?}"),
        Err(e) => warn!("Couldn't locate the config file: {e}"),
    }

    match confy::load(APP_NAME, None) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file, overwriting with default. Error: {e}");
            let config = Config::default();
            if let Err(e) = confy::store(APP_NAME, None, &config) {
                error!("Failed to write the default config file: {e}");
            }
            config
        }
    }
}

fn spawn_renderer(
    label: String,
    mut state_rx: watch::Receiver<GameState>,
    rules: Ruleset,
) -> JoinHandle<()> {
    task::spawn(async move {
        loop {
            let line = view::render_line(&state_rx.borrow_and_update(), &rules);
            println!("[{label}] {line}");
            if state_rx.changed().await.is_err() {
                break;
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    init_logging(&args)?;
    info!("Starting Scoreboard");

    let config = load_config();

    let rules = match &args.rules {
        Some(path) => Ruleset::load_from_file(path)?,
        None => match args.league {
            Some(league) => league.ruleset().unwrap_or_else(|| config.ruleset.clone()),
            None => config.rules(),
        },
    };
    info!("Using rules {rules:?}");

    let storage_dir = match args.storage_dir.clone().or_else(|| config.storage.dir.clone()) {
        Some(dir) => dir,
        None => data_local_dir()?.join(DATA_DIR_NAME),
    };
    let file_store = FileStore::new(storage_dir);
    info!("Saving game state in {}", file_store.dir().display());
    let store: Arc<dyn KeyValueStore> = Arc::new(file_store);
    let new_persistence = || Persistence::new(store.clone(), &config.storage.key, rules.clone());

    if args.new_game {
        info!("Discarding the saved game");
        new_persistence().clear();
    }

    let hub = BroadcastHub::new(config.broadcast.capacity);
    let sound = Arc::new(SoundController::new(config.sound.clone()));

    let contexts: Vec<ScoreboardContext> = args
        .windows
        .iter()
        .map(|query| {
            ScoreboardContext::open(
                Role::from_query(query),
                ContextDeps {
                    rules: rules.clone(),
                    persistence: new_persistence(),
                    hub: hub.clone(),
                    topic: config.broadcast.topic.clone(),
                    sound: sound.clone(),
                    tick_interval: clock_engine::TICK_INTERVAL,
                },
            )
        })
        .collect();

    let has_display = contexts.iter().any(|c| c.role() == Role::Display);
    let renderers: Vec<JoinHandle<()>> = contexts
        .iter()
        .enumerate()
        .filter(|(_, c)| c.role() == Role::Display || !has_display)
        .map(|(i, c)| spawn_renderer(format!("{} {}", c.role(), i + 1), c.watch(), rules.clone()))
        .collect();

    let controller = contexts.iter().find(|c| c.role() == Role::Controller);
    if controller.is_none() {
        warn!("No controller window is open, the game can't be changed");
    }

    let mut test_arm = BuzzerTestArm::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(Command::Help) => println!("{HELP}"),
            Ok(Command::TestBuzzer(clock)) => test_buzzer(&mut test_arm, sound.as_ref(), clock),
            Ok(Command::Apply(action)) => match controller {
                Some(controller) => {
                    if action == Action::StartShotClock && !controller.state().shot_clock_enabled {
                        println!("The shot clock is off, turn it on with `shot on`");
                    } else {
                        controller.dispatch(action);
                    }
                }
                None => println!("There is no controller window to send that to"),
            },
            Err(input::ParseError::Empty) => {}
            Err(e) => println!("{e}"),
        }
    }

    info!("Shutting down");
    for renderer in renderers {
        renderer.abort();
    }
    for context in contexts {
        context.close().await;
    }

    Ok(())
}

fn test_buzzer(arm: &mut BuzzerTestArm, sound: &dyn BuzzerSink, clock: Clock) {
    if arm.press(clock, Instant::now()) {
        sound.trigger_buzzer(clock);
    } else {
        println!(
            "Sure? Test the {clock} buzzer again within {}s to sound it",
            BuzzerTestArm::WINDOW.as_secs()
        );
    }
}
