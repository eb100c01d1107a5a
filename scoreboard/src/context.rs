use crate::{
    broadcast::{BroadcastAdapter, BroadcastHub, ClockAuthority, Subscription},
    clock_engine::{ClockEngine, Tick},
    persistence::Persistence,
    sound_controller::BuzzerSink,
    store::{Action, StateStore},
};
use derivative::Derivative;
use enum_derive_2018::EnumDisplay;
use log::*;
use macro_attr_2018::macro_attr;
use scoreboard_common::{config::Ruleset, game_state::GameState, side::Clock};
use std::{future::pending, sync::Arc};
use tokio::{
    select,
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
        watch,
    },
    task::{self, JoinHandle},
    time::Duration,
};

// Only a controller edits the game state and runs the clocks
macro_attr! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Derivative, EnumDisplay!)]
    #[derivative(Default)]
    pub enum Role {
        #[derivative(Default)]
        Controller,
        Display,
    }
}

impl Role {
    /// Reads the role from a URL style query string, `display=true` selects a display
    pub fn from_query(query: &str) -> Self {
        let display = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(key, _)| *key == "display")
            .is_some_and(|(_, value)| value == "true");

        if display {
            Self::Display
        } else {
            Self::Controller
        }
    }
}

/// The resources a context is built from, each owned by the context once opened
pub struct ContextDeps {
    pub rules: Ruleset,
    pub persistence: Persistence,
    pub hub: BroadcastHub,
    pub topic: String,
    pub sound: Arc<dyn BuzzerSink>,
    pub tick_interval: Duration,
}

#[derive(Debug)]
enum Event {
    Dispatch(Action),
    Remote(GameState),
    Close,
}

/// Handle on one running context
#[derive(Debug)]
pub struct ScoreboardContext {
    role: Role,
    event_tx: UnboundedSender<Event>,
    state_rx: watch::Receiver<GameState>,
    handle: Option<JoinHandle<()>>,
}

impl ScoreboardContext {
    pub fn open(role: Role, deps: ContextDeps) -> Self {
        let ContextDeps {
            rules,
            persistence,
            hub,
            topic,
            sound,
            tick_interval,
        } = deps;

        let state = persistence.load();
        info!("Opening {role} context in period {}", state.period);

        let (event_tx, event_rx) = unbounded_channel();
        let (state_tx, state_rx) = watch::channel(state.clone());

        let mut broadcast = BroadcastAdapter::new(hub.clone(), topic.clone());
        let remote_tx = event_tx.clone();
        let subscription = broadcast.subscribe(move |state| {
            if remote_tx.send(Event::Remote(state)).is_err() {
                trace!("Context closed, dropping remote state");
            }
        });

        let (tick_tx, tick_rx) = match role {
            Role::Controller => {
                let (tick_tx, tick_rx) = unbounded_channel();
                (Some(tick_tx), Some(tick_rx))
            }
            Role::Display => (None, None),
        };

        let mut runtime = ContextRuntime {
            role,
            store: StateStore::new(rules, state),
            persistence,
            broadcast,
            subscription,
            hub,
            topic,
            tick_tx,
            tick_interval,
            authority: None,
            engine: None,
            sound,
            state_tx,
        };
        runtime.claim_clocks();
        let handle = task::spawn(runtime.run_loop(event_rx, tick_rx));

        Self {
            role,
            event_tx,
            state_rx,
            handle: Some(handle),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn dispatch(&self, action: Action) {
        if self.role == Role::Display {
            warn!("Display contexts can't change the game, ignoring {action:?}");
            return;
        }
        if self.event_tx.send(Event::Dispatch(action)).is_err() {
            error!("Context has stopped, action dropped");
        }
    }

    pub fn state(&self) -> GameState {
        self.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<GameState> {
        self.state_rx.clone()
    }

    /// Stops the clocks, leaves the broadcast topic and waits for the context to finish
    pub async fn close(mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.event_tx.send(Event::Close).is_err() {
            handle.abort();
        }
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                error!("{} context failed: {e}", self.role);
            }
        }
    }
}

impl Drop for ScoreboardContext {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct ContextRuntime {
    role: Role,
    store: StateStore,
    persistence: Persistence,
    broadcast: BroadcastAdapter,
    subscription: Option<Subscription>,
    hub: BroadcastHub,
    topic: String,
    tick_tx: Option<UnboundedSender<Tick>>,
    tick_interval: Duration,
    // Held together: only the holder of the topic's clock authority runs an engine
    authority: Option<ClockAuthority>,
    engine: Option<ClockEngine>,
    sound: Arc<dyn BuzzerSink>,
    state_tx: watch::Sender<GameState>,
}

impl ContextRuntime {
    async fn run_loop(
        mut self,
        mut event_rx: UnboundedReceiver<Event>,
        mut tick_rx: Option<UnboundedReceiver<Tick>>,
    ) {
        let hub = self.hub.clone();
        loop {
            let waiting_for_clocks = self.tick_tx.is_some() && self.engine.is_none();
            select! {
                event = event_rx.recv() => {
                    match event {
                        Some(Event::Dispatch(action)) => self.apply_local(action, None),
                        Some(Event::Remote(state)) => self.apply_remote(state),
                        Some(Event::Close) | None => break,
                    }
                }
                Some(tick) = next_tick(&mut tick_rx) => self.handle_tick(tick),
                _ = hub.clock_authority_released(), if waiting_for_clocks => self.claim_clocks(),
            }
        }
        self.teardown();
    }

    /// Starts running the clocks if this is a controller and no other context runs them
    fn claim_clocks(&mut self) {
        if self.engine.is_some() {
            return;
        }
        let Some(tick_tx) = self.tick_tx.as_ref() else {
            return;
        };
        match self.hub.claim_clock_authority(&self.topic) {
            Ok(Some(authority)) => {
                info!("{} context is running the clocks", self.role);
                let mut engine = ClockEngine::new(tick_tx.clone(), self.tick_interval);
                let state = self.store.state();
                engine.reconcile(state, state, false);
                self.engine = Some(engine);
                self.authority = Some(authority);
            }
            Ok(None) => trace!("Another {} context is running the clocks", self.role),
            Err(e) => error!("Couldn't claim the clocks, leaving them to others: {e}"),
        }
    }

    fn handle_tick(&mut self, tick: Tick) {
        let accepted = self
            .engine
            .as_ref()
            .is_some_and(|engine| engine.accept(&tick));
        if accepted {
            self.apply_local(Action::tick(tick.clock), Some(tick.clock));
        }
    }

    fn apply_local(&mut self, action: Action, ticked: Option<Clock>) {
        self.claim_clocks();
        let restart_shot = action.restarts_shot_clock(self.store.state());
        let transition = self.store.dispatch(&action);
        if !transition.changed() {
            return;
        }

        self.persistence.save(&transition.next);
        self.broadcast.publish_state(&transition.next);
        self.state_tx.send_replace(transition.next.clone());

        if let Some(engine) = self.engine.as_mut() {
            engine.reconcile(&transition.prev, &transition.next, restart_shot);
            for clock in engine.observe(&transition, ticked) {
                self.sound.trigger_buzzer(clock);
            }
        }
    }

    fn apply_remote(&mut self, state: GameState) {
        let transition = self.store.replace(state);
        if !transition.changed() {
            return;
        }
        debug!("{} context adopted a remote state", self.role);
        self.state_tx.send_replace(transition.next.clone());

        self.claim_clocks();
        if let Some(engine) = self.engine.as_mut() {
            let restart_shot = transition.prev.possession != transition.next.possession
                && transition.next.is_running(Clock::Shot);
            engine.reconcile(&transition.prev, &transition.next, restart_shot);
            engine.observe(&transition, None);
        }
    }

    fn teardown(&mut self) {
        info!("Closing {} context", self.role);
        if let Some(mut engine) = self.engine.take() {
            engine.shutdown();
        }
        self.authority = None;
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.broadcast.close();
    }
}

async fn next_tick(tick_rx: &mut Option<UnboundedReceiver<Tick>>) -> Option<Tick> {
    match tick_rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}
