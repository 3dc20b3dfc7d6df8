//! Time-boxed blinking alert shown after a positive obstacle vote.

use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_BLINK_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_TOGGLE_PERIOD: Duration = Duration::from_millis(500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPhase {
    On,
    Off,
}

impl BlinkPhase {
    fn flipped(self) -> Self {
        match self {
            BlinkPhase::On => BlinkPhase::Off,
            BlinkPhase::Off => BlinkPhase::On,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlinkSession {
    active: bool,
    last_toggle: Instant,
    phase: BlinkPhase,
    period: Duration,
}

impl BlinkSession {
    pub fn new(period: Duration) -> Self {
        Self {
            active: false,
            last_toggle: Instant::now(),
            phase: BlinkPhase::Off,
            period,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn phase(&self) -> BlinkPhase {
        self.phase
    }

    /// Returns `false` when a session was already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.active {
            debug!("Blinking already active");
            return false;
        }
        self.active = true;
        self.phase = BlinkPhase::Off;
        self.last_toggle = now;
        info!("Started blinking");
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.active {
            debug!("Blinking not active");
            return false;
        }
        self.active = false;
        self.phase = BlinkPhase::Off;
        info!("Stopped blinking");
        true
    }

    /// Flip the phase once a full period has passed. Returns the phase to display,
    /// or `None` when the LEDs should be left as they are.
    pub fn tick(&mut self, now: Instant) -> Option<BlinkPhase> {
        if !self.active || now.saturating_duration_since(self.last_toggle) < self.period {
            return None;
        }
        self.phase = self.phase.flipped();
        self.last_toggle = now;
        Some(self.phase)
    }
}

impl Default for BlinkSession {
    fn default() -> Self {
        Self::new(DEFAULT_TOGGLE_PERIOD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The full duration elapsed.
    Expired,
    /// `still_active` returned false before the duration elapsed.
    Aborted,
}

/// Block for up to `duration`, checking `still_active` every `poll`.
pub fn watch_duration(
    duration: Duration,
    poll: Duration,
    mut still_active: impl FnMut() -> bool,
) -> WatchOutcome {
    let started = Instant::now();
    loop {
        let elapsed = started.elapsed();
        if elapsed >= duration {
            return WatchOutcome::Expired;
        }
        if !still_active() {
            return WatchOutcome::Aborted;
        }
        std::thread::sleep(poll.min(duration - elapsed));
    }
}
