use derivative::Derivative;
use log::*;
use scoreboard_common::{bundles::ClockBundle, side::Clock};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::{
    sync::mpsc::{UnboundedSender, unbounded_channel},
    task::{self, JoinHandle},
    time::{Duration, Instant},
};

const TERMINAL_BELL: &[u8] = b"\x07";

/// Receives the request to sound a clock's buzzer
pub trait BuzzerSink: Send + Sync {
    fn trigger_buzzer(&self, clock: Clock);
}

/// A descending sweep, the sound a buzzer makes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuzzerTone {
    pub start_hz: f32,
    pub end_hz: f32,
    pub duration: Duration,
}

impl BuzzerTone {
    pub fn for_clock(clock: Clock) -> Self {
        match clock {
            Clock::Game => Self {
                start_hz: 400.0,
                end_hz: 200.0,
                duration: Duration::from_millis(500),
            },
            Clock::Shot => Self {
                start_hz: 800.0,
                end_hz: 600.0,
                duration: Duration::from_millis(200),
            },
        }
    }
}

impl core::fmt::Display for BuzzerTone {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "{}Hz -> {}Hz over {}ms",
            self.start_hz,
            self.end_hz,
            self.duration.as_millis()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
pub struct SoundSettings {
    #[derivative(Default(value = "true"))]
    pub sound_enabled: bool,
    pub terminal_bell: bool,
}

#[derive(Debug)]
enum SoundMessage {
    TriggerBuzzer(Clock),
}

pub struct SoundController {
    msg_tx: UnboundedSender<SoundMessage>,
    handle: Option<JoinHandle<()>>,
}

impl SoundController {
    pub fn new(settings: SoundSettings) -> Self {
        Self::with_output(settings, Box::new(std::io::stderr()))
    }

    fn with_output(settings: SoundSettings, mut output: Box<dyn Write + Send>) -> Self {
        let (msg_tx, mut msg_rx) = unbounded_channel();

        let handle = task::spawn(async move {
            while let Some(SoundMessage::TriggerBuzzer(clock)) = msg_rx.recv().await {
                if !settings.sound_enabled {
                    debug!("Sound is disabled, not sounding the {clock} buzzer");
                    continue;
                }
                info!("Sounding the {clock} buzzer ({})", BuzzerTone::for_clock(clock));
                if settings.terminal_bell {
                    if let Err(e) = output.write_all(TERMINAL_BELL).and_then(|_| output.flush()) {
                        warn!("Couldn't ring the terminal bell: {e}");
                    }
                }
            }
        });

        Self {
            msg_tx,
            handle: Some(handle),
        }
    }
}

impl BuzzerSink for SoundController {
    fn trigger_buzzer(&self, clock: Clock) {
        if self.msg_tx.send(SoundMessage::TriggerBuzzer(clock)).is_err() {
            error!("Sound controller has stopped, {clock} buzzer dropped");
        }
    }
}

impl Drop for SoundController {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Guards the manual buzzer test: the first press arms it, a second press within
/// [`BuzzerTestArm::WINDOW`] sounds it.
#[derive(Debug, Default)]
pub struct BuzzerTestArm {
    armed: ClockBundle<Option<Instant>>,
}

impl BuzzerTestArm {
    pub const WINDOW: Duration = Duration::from_secs(3);

    /// Returns `true` when the press should sound the buzzer
    pub fn press(&mut self, clock: Clock, now: Instant) -> bool {
        match self.armed[clock].take() {
            Some(armed_at) if now.duration_since(armed_at) < Self::WINDOW => true,
            _ => {
                self.armed[clock] = Some(now);
                false
            }
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self, clock: Clock, now: Instant) -> bool {
        self.armed[clock].is_some_and(|armed_at| now.duration_since(armed_at) < Self::WINDOW)
    }
}
