//! Timestep playback: a timer that walks the timeline one step per tick,
//! independent of how long the per-step result fetches take.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::task::TaskGuard;

/// Playback speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackSpeed {
    #[default]
    X1,
    X2,
    X5,
}

impl PlaybackSpeed {
    pub fn multiplier(self) -> u32 {
        match self {
            PlaybackSpeed::X1 => 1,
            PlaybackSpeed::X2 => 2,
            PlaybackSpeed::X5 => 5,
        }
    }

    /// Tick period: 500ms at 1x, floored at 50ms.
    pub fn period(self) -> Duration {
        Duration::from_millis((500 / u64::from(self.multiplier())).max(50))
    }
}

struct PlaybackShared {
    current: AtomicU32,
    playing: AtomicBool,
}

/// Drives timestep advancement on a timer.
///
/// Emits each new step on a watch channel; the compositor and the host view
/// subscribe. Exactly one timer task exists at a time: `play` replaces the
/// previous one before starting, so a speed change can never leave a stale
/// cadence running alongside the new one.
pub struct PlaybackController {
    shared: Arc<PlaybackShared>,
    tx: watch::Sender<u32>,
    speed: PlaybackSpeed,
    max_step: u32,
    enabled: bool,
    timer: Option<TaskGuard>,
}

impl PlaybackController {
    pub fn new(max_step: u32) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(PlaybackShared {
                current: AtomicU32::new(0),
                playing: AtomicBool::new(false),
            }),
            tx,
            speed: PlaybackSpeed::default(),
            max_step,
            enabled: true,
            timer: None,
        }
    }

    /// Subscribe to timestep-change events.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.tx.subscribe()
    }

    pub fn current_step(&self) -> u32 {
        self.shared.current.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    pub fn max_step(&self) -> u32 {
        self.max_step
    }

    /// Jump straight to a step (scrubbing). Clamped to the timeline bound;
    /// play state is untouched.
    pub fn seek(&self, step: u32) {
        let step = step.min(self.max_step);
        self.shared.current.store(step, Ordering::SeqCst);
        let _ = self.tx.send(step);
    }

    /// Start the tick timer, or restart it at the current speed if already
    /// playing. Refused while disabled.
    pub fn play(&mut self) {
        if !self.enabled {
            return;
        }

        // Drop any previous timer before spawning: one cadence at a time.
        self.timer = None;
        self.shared.playing.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let tx = self.tx.clone();
        let period = self.speed.period();
        let max_step = self.max_step;

        self.timer = Some(TaskGuard::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of a fresh interval resolves immediately; consume
            // it so the step advances one full period from now.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let next = shared.current.load(Ordering::SeqCst) + 1;
                if next > max_step {
                    debug!(max_step, "Playback reached the timeline bound");
                    shared.playing.store(false, Ordering::SeqCst);
                    break;
                }
                shared.current.store(next, Ordering::SeqCst);
                let _ = tx.send(next);
            }
        }));
    }

    /// Stop the timer, preserving the current position.
    pub fn pause(&mut self) {
        self.timer = None;
        self.shared.playing.store(false, Ordering::SeqCst);
    }

    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Stop and rewind to step 0, emitting the change.
    pub fn reset(&mut self) {
        self.pause();
        self.shared.current.store(0, Ordering::SeqCst);
        let _ = self.tx.send(0);
    }

    /// Change speed. While playing this restarts the timer at the new
    /// cadence instead of letting the old one run out its period.
    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        if self.speed == speed {
            return;
        }
        self.speed = speed;
        if self.is_playing() {
            self.play();
        }
    }

    /// Enable or disable playback (disabled while the run has no results to
    /// scrub). Disabling forces a stop.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.pause();
        }
    }
}
