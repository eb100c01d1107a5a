use log::*;
use scoreboard_common::game_state::GameState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    future::pending,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};
use thiserror::Error;
use tokio::{
    sync::{
        Notify,
        broadcast::{self, error::RecvError},
    },
    task::{self, JoinHandle},
};

pub const TOPIC: &str = "basketball-scoreboard";

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Broadcast channels aren't available")]
    Unavailable,
    #[error("The broadcast channel has been closed")]
    Closed,
    #[error("The broadcast hub's lock was poisoned")]
    Poisoned,
    #[error("Couldn't encode the broadcast message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BroadcastError>;

/// The message exchanged between contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Envelope {
    #[serde(rename = "STATE_UPDATE")]
    StateUpdate { state: GameState },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Message {
    origin: ChannelId,
    payload: Value,
}

#[derive(Debug)]
struct HubInner {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<Message>>>,
    clock_owners: Mutex<HashSet<String>>,
    released: Notify,
    next_id: AtomicU64,
}

/// Connects the contexts of one origin. Clones refer to the same hub.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    inner: Option<Arc<HubInner>>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Some(Arc::new(HubInner {
                capacity: capacity.max(1),
                topics: Mutex::new(HashMap::new()),
                clock_owners: Mutex::new(HashSet::new()),
                released: Notify::new(),
                next_id: AtomicU64::new(0),
            })),
        }
    }

    /// A hub on which every `open` fails, leaving each context standalone
    pub fn unavailable() -> Self {
        Self { inner: None }
    }

    pub fn open(&self, topic: &str) -> Result<BroadcastChannel> {
        let inner = self.inner.as_ref().ok_or(BroadcastError::Unavailable)?;
        let tx = {
            let mut topics = inner.topics.lock().map_err(|_| BroadcastError::Poisoned)?;
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(inner.capacity).0)
                .clone()
        };
        let id = ChannelId(inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("Opened broadcast channel {id} on {topic:?}");

        Ok(BroadcastChannel {
            id,
            topic: topic.to_string(),
            tx: Some(tx),
        })
    }

    /// Grants the right to run the clocks of `topic`. Returns `None` while another context
    /// holds it. Every claim on an unavailable hub succeeds, since its contexts can't see
    /// each other.
    pub fn claim_clock_authority(&self, topic: &str) -> Result<Option<ClockAuthority>> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(Some(ClockAuthority {
                inner: None,
                topic: topic.to_string(),
            }));
        };
        let mut owners = inner
            .clock_owners
            .lock()
            .map_err(|_| BroadcastError::Poisoned)?;
        if !owners.insert(topic.to_string()) {
            return Ok(None);
        }
        debug!("Granted the clock authority of {topic:?}");
        Ok(Some(ClockAuthority {
            inner: Some(inner.clone()),
            topic: topic.to_string(),
        }))
    }

    /// Completes when some clock authority on this hub is released
    pub async fn clock_authority_released(&self) {
        match self.inner.as_ref() {
            Some(inner) => inner.released.notified().await,
            None => pending().await,
        }
    }
}

/// Held by the one context of a topic that runs the clocks. Dropping it lets another
/// context claim them.
#[derive(Debug)]
pub struct ClockAuthority {
    inner: Option<Arc<HubInner>>,
    topic: String,
}

impl Drop for ClockAuthority {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        match inner.clock_owners.lock() {
            Ok(mut owners) => {
                owners.remove(&self.topic);
            }
            Err(_) => error!("Couldn't release the clock authority of {:?}", self.topic),
        }
        debug!("Released the clock authority of {:?}", self.topic);
        inner.released.notify_waiters();
    }
}

/// One context's handle on a topic
#[derive(Debug)]
pub struct BroadcastChannel {
    id: ChannelId,
    topic: String,
    tx: Option<broadcast::Sender<Message>>,
}

impl BroadcastChannel {
    #[cfg(test)]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Delivers `payload` to every other handle on the topic. Having nobody listening is not
    /// an error.
    pub fn publish(&self, payload: Value) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(BroadcastError::Closed)?;
        if tx
            .send(Message {
                origin: self.id,
                payload,
            })
            .is_err()
        {
            trace!("Nobody is listening on {:?}", self.topic);
        }
        Ok(())
    }

    pub fn listen(&self) -> Result<Listener> {
        let tx = self.tx.as_ref().ok_or(BroadcastError::Closed)?;
        Ok(Listener {
            id: self.id,
            rx: tx.subscribe(),
        })
    }

    /// Returns `false` if the channel was already closed
    pub fn close(&mut self) -> bool {
        if self.tx.take().is_some() {
            debug!("Closed broadcast channel {} on {:?}", self.id, self.topic);
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
pub struct Listener {
    id: ChannelId,
    rx: broadcast::Receiver<Message>,
}

impl Listener {
    /// Waits for the next message from another handle. Returns `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if msg.origin == self.id => continue,
                Ok(msg) => return Some(msg.payload),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Listener {} fell behind, skipped {skipped} messages", self.id);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Stops the forwarding task when dropped
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Publishes and receives whole game state snapshots for one context
#[derive(Debug)]
pub struct BroadcastAdapter {
    hub: BroadcastHub,
    topic: String,
    channel: Option<BroadcastChannel>,
    standalone: bool,
    closed: bool,
}

impl BroadcastAdapter {
    pub fn new(hub: BroadcastHub, topic: impl Into<String>) -> Self {
        Self {
            hub,
            topic: topic.into(),
            channel: None,
            standalone: false,
            closed: false,
        }
    }

    /// True when broadcasting failed and this context carries on alone
    #[cfg(test)]
    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn channel(&mut self) -> Option<&BroadcastChannel> {
        if self.closed || self.standalone {
            return None;
        }
        if self.channel.is_none() {
            match self.hub.open(&self.topic) {
                Ok(channel) => self.channel = Some(channel),
                Err(e) => {
                    error!("Couldn't open the broadcast channel, running standalone: {e}");
                    self.standalone = true;
                    return None;
                }
            }
        }
        self.channel.as_ref()
    }

    pub fn publish_state(&mut self, state: &GameState) {
        let Some(channel) = self.channel() else {
            return;
        };
        let result = serde_json::to_value(Envelope::StateUpdate {
            state: state.clone(),
        })
        .map_err(BroadcastError::from)
        .and_then(|payload| channel.publish(payload));

        if let Err(e) = result {
            error!("Failed to broadcast the game state, running standalone: {e}");
            self.standalone = true;
        }
    }

    /// Calls `handler` with every snapshot published by other contexts, in publish order
    pub fn subscribe<F>(&mut self, mut handler: F) -> Option<Subscription>
    where
        F: FnMut(GameState) + Send + 'static,
    {
        let mut listener = match self.channel()?.listen() {
            Ok(listener) => listener,
            Err(e) => {
                error!("Couldn't listen for broadcasts, running standalone: {e}");
                self.standalone = true;
                return None;
            }
        };

        let handle = task::spawn(async move {
            while let Some(payload) = listener.recv().await {
                match serde_json::from_value::<Envelope>(payload) {
                    Ok(Envelope::StateUpdate { state }) => handler(state),
                    Ok(Envelope::Unrecognized) => trace!("Ignoring unrecognized broadcast"),
                    Err(e) => warn!("Ignoring malformed broadcast: {e}"),
                }
            }
        });

        Some(Subscription {
            handle: Some(handle),
        })
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }
}

impl Drop for BroadcastAdapter {
    fn drop(&mut self) {
        self.close();
    }
}
