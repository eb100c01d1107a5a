use crate::store::Transition;
use enum_iterator::all;
use log::*;
use scoreboard_common::{bundles::ClockBundle, game_state::GameState, side::Clock};
use tokio::{
    sync::mpsc::UnboundedSender,
    task::{self, JoinHandle},
    time::{Duration, Instant, MissedTickBehavior, interval_at},
};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// One elapsed interval of a running clock. `generation` identifies the timer that produced
/// it, so ticks from a timer that has since been stopped can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub clock: Clock,
    pub generation: u64,
}

/// Decides when an expiring clock should sound its buzzer: once when the time runs out,
/// then not again until the clock has had time on it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuzzerLatch {
    played: bool,
}

impl BuzzerLatch {
    pub fn update(&mut self, remaining: u16, ticked: bool) -> bool {
        if remaining > 0 {
            self.played = false;
            false
        } else if ticked && !self.played {
            self.played = true;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Runs the countdown timers of the controlling context
#[derive(Debug)]
pub struct ClockEngine {
    tick_tx: UnboundedSender<Tick>,
    interval: Duration,
    timers: ClockBundle<Option<Timer>>,
    latches: ClockBundle<BuzzerLatch>,
    next_generation: u64,
}

impl ClockEngine {
    pub fn new(tick_tx: UnboundedSender<Tick>, interval: Duration) -> Self {
        Self {
            tick_tx,
            interval,
            timers: Default::default(),
            latches: Default::default(),
            next_generation: 0,
        }
    }

    pub fn is_active(&self, clock: Clock) -> bool {
        self.timers[clock].is_some()
    }

    /// Brings the timers in line with `next`
    pub fn reconcile(&mut self, prev: &GameState, next: &GameState, restart_shot: bool) {
        if prev.period != next.period {
            self.cancel(Clock::Game);
            self.cancel(Clock::Shot);
        }
        if restart_shot {
            self.cancel(Clock::Shot);
        }

        for clock in all::<Clock>() {
            if next.is_running(clock) {
                if !self.is_active(clock) {
                    self.start(clock);
                }
            } else {
                self.cancel(clock);
            }
        }
    }

    /// Returns `true` if `tick` came from the live timer of its clock
    pub fn accept(&self, tick: &Tick) -> bool {
        let live = self.timers[tick.clock]
            .as_ref()
            .is_some_and(|timer| timer.generation == tick.generation);
        if !live {
            trace!("Dropping stale tick {tick:?}");
        }
        live
    }

    /// Updates the buzzer latches and returns the clocks whose buzzer should sound
    pub fn observe(&mut self, transition: &Transition, ticked: Option<Clock>) -> Vec<Clock> {
        let next = &transition.next;
        let mut buzzers = vec![];
        for (clock, latch) in self.latches.iter_mut() {
            if latch.update(next.remaining_secs(clock), ticked == Some(clock)) {
                if next.buzzer_enabled(clock) {
                    info!("{clock} expired");
                    buzzers.push(clock);
                } else {
                    info!("{clock} expired, buzzer is disabled");
                }
            }
        }
        buzzers
    }

    pub fn shutdown(&mut self) {
        for clock in all::<Clock>() {
            self.cancel(clock);
        }
    }

    fn start(&mut self, clock: Clock) {
        let generation = self.next_generation;
        self.next_generation += 1;
        debug!("Starting {clock} timer (generation {generation})");

        let tx = self.tick_tx.clone();
        let period = self.interval;
        let handle = task::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(Tick { clock, generation }).is_err() {
                    break;
                }
            }
        });

        self.timers[clock] = Some(Timer { generation, handle });
    }

    fn cancel(&mut self, clock: Clock) {
        if let Some(timer) = self.timers[clock].take() {
            debug!("Stopping {clock} timer (generation {})", timer.generation);
            timer.handle.abort();
        }
    }
}

impl Drop for ClockEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{Action, StateStore};
    use more_asserts::*;
    use scoreboard_common::config::Ruleset;
    use tokio::{
        sync::mpsc::{UnboundedReceiver, unbounded_channel},
        time::{advance, timeout},
    };

    fn engine() -> (ClockEngine, UnboundedReceiver<Tick>) {
        let (tx, rx) = unbounded_channel();
        (ClockEngine::new(tx, TICK_INTERVAL), rx)
    }

    fn running(clock: Clock) -> GameState {
        let mut state = GameState::default();
        match clock {
            Clock::Game => state.game_clock_running = true,
            Clock::Shot => state.shot_clock_running = true,
        }
        state
    }

    #[test]
    fn test_latch() {
        let mut latch = BuzzerLatch::default();
        assert!(!latch.update(2, true));
        assert!(!latch.update(1, true));
        assert!(latch.update(0, true));
        assert!(!latch.update(0, true));
        assert!(!latch.update(0, false));

        assert!(!latch.update(5, false));
        assert!(!latch.update(0, false));
        assert!(latch.update(0, true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_cadence() {
        let (mut engine, mut rx) = engine();
        let start = Instant::now();
        engine.reconcile(&GameState::default(), &running(Clock::Game), false);
        assert!(engine.is_active(Clock::Game));
        assert!(!engine.is_active(Clock::Shot));

        for n in 1..=3u32 {
            let tick = rx.recv().await.unwrap();
            assert_eq!(tick.clock, Clock::Game);
            assert!(engine.accept(&tick));
            assert_ge!(start.elapsed(), TICK_INTERVAL * n);
            assert_lt!(start.elapsed(), TICK_INTERVAL * (n + 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_ticks() {
        let (mut engine, mut rx) = engine();
        let on = running(Clock::Game);
        let off = GameState::default();

        engine.reconcile(&off, &on, false);
        let first = rx.recv().await.unwrap();
        assert!(engine.accept(&first));

        engine.reconcile(&on, &off, false);
        assert!(!engine.is_active(Clock::Game));
        assert!(!engine.accept(&first));
        assert!(timeout(TICK_INTERVAL * 5, rx.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_rejects_old_generation() {
        let (mut engine, mut rx) = engine();
        let on = running(Clock::Shot);
        let off = GameState::default();

        engine.reconcile(&off, &on, false);
        let old = rx.recv().await.unwrap();
        engine.reconcile(&on, &off, false);
        engine.reconcile(&off, &on, false);

        assert!(!engine.accept(&old));
        let fresh = rx.recv().await.unwrap();
        assert_ne!(fresh.generation, old.generation);
        assert!(engine.accept(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_shot_gives_fresh_cadence() {
        let (mut engine, mut rx) = engine();
        let on = running(Clock::Shot);
        let start = Instant::now();

        engine.reconcile(&GameState::default(), &on, false);
        advance(Duration::from_millis(700)).await;
        engine.reconcile(&on, &on, true);

        let tick = rx.recv().await.unwrap();
        assert!(engine.accept(&tick));
        assert_ge!(start.elapsed(), Duration::from_millis(1700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_shot_clock_never_runs() {
        let (mut engine, _rx) = engine();
        let mut state = running(Clock::Shot);
        state.shot_clock_enabled = false;
        engine.reconcile(&GameState::default(), &state, false);
        assert!(!engine.is_active(Clock::Shot));
    }

    #[tokio::test(start_paused = true)]
    async fn test_period_change_restarts_timers() {
        let (mut engine, mut rx) = engine();
        let mut prev = running(Clock::Game);
        prev.shot_clock_running = true;
        engine.reconcile(&GameState::default(), &prev, false);
        let old = rx.recv().await.unwrap();

        let mut next = prev.clone();
        next.period = 2;
        next.shot_clock_running = false;
        engine.reconcile(&prev, &next, false);

        assert!(engine.is_active(Clock::Game));
        assert!(!engine.is_active(Clock::Shot));
        assert!(!engine.accept(&old));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_expiry() {
        let (mut engine, _rx) = engine();
        let mut store = StateStore::new(Ruleset::default(), GameState::default());
        store.dispatch(&Action::SetGameClock {
            minutes: 0,
            seconds: 2,
        });
        store.dispatch(&Action::StartGameClock);

        let mut sounded = vec![];
        for _ in 0..4 {
            let transition = store.dispatch(&Action::TickGameClock);
            sounded.extend(engine.observe(&transition, Some(Clock::Game)));
        }
        assert_eq!(sounded, vec![Clock::Game]);
        assert!(!store.state().game_clock_running);

        let transition = store.dispatch(&Action::ToggleBuzzer(Clock::Game));
        assert!(engine.observe(&transition, None).is_empty());
        let transition = store.dispatch(&Action::SetGameClock {
            minutes: 0,
            seconds: 1,
        });
        assert!(engine.observe(&transition, None).is_empty());
        store.dispatch(&Action::StartGameClock);
        let transition = store.dispatch(&Action::TickGameClock);
        assert_eq!(transition.next.game_clock_total_secs(), 0);
        assert!(engine.observe(&transition, Some(Clock::Game)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let (mut engine, mut rx) = engine();
        let mut state = running(Clock::Game);
        state.shot_clock_running = true;
        engine.reconcile(&GameState::default(), &state, false);
        engine.shutdown();
        assert!(!engine.is_active(Clock::Game));
        assert!(!engine.is_active(Clock::Shot));
        assert!(timeout(TICK_INTERVAL * 3, rx.recv()).await.is_err());
    }
}
