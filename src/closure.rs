//! Debounced automatic door closure.

use crate::state::ProcessState;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_CLOSE_DWELL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureDecision {
    /// No proximity event in progress.
    Reset,
    /// Front sensor just entered the red zone.
    Started,
    /// Still in the red zone; either the dwell has not elapsed or closing is not allowed.
    Holding,
    /// Dwell satisfied while parking: send the close command now.
    Close,
}

#[derive(Debug, Clone)]
pub struct CloseDebounce {
    start: Option<Instant>,
    dwell: Duration,
}

impl CloseDebounce {
    pub fn new(dwell: Duration) -> Self {
        Self { start: None, dwell }
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.start
    }

    pub fn clear(&mut self) {
        self.start = None;
    }

    pub fn evaluate(
        &mut self,
        front_distance: Option<f64>,
        red_threshold: Option<f64>,
        process: ProcessState,
        close_already_sent: bool,
        now: Instant,
    ) -> ClosureDecision {
        let (Some(front), Some(red)) = (front_distance, red_threshold) else {
            self.clear();
            return ClosureDecision::Reset;
        };
        if front <= 0.0 {
            self.clear();
            return ClosureDecision::Reset;
        }

        if front > red {
            if self.start.take().is_some() {
                debug!(front_cm = front, red_cm = red, "Front left red zone, closure timer reset");
            }
            return ClosureDecision::Reset;
        }

        let Some(start) = self.start else {
            debug!(front_cm = front, red_cm = red, "Front entered red zone, closure timer started");
            self.start = Some(now);
            return ClosureDecision::Started;
        };

        let held = now.saturating_duration_since(start);
        if held >= self.dwell && process == ProcessState::Parking && !close_already_sent {
            info!(held_ms = held.as_millis() as u64, "Red proximity held, closing door");
            ClosureDecision::Close
        } else {
            ClosureDecision::Holding
        }
    }
}

impl Default for CloseDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_CLOSE_DWELL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Option<f64> = Some(3.0);

    #[test]
    fn closes_after_dwell_while_parking() {
        let mut debounce = CloseDebounce::default();
        let t0 = Instant::now();

        let parking = ProcessState::Parking;
        assert_eq!(debounce.evaluate(Some(2.0), RED, parking, false, t0), ClosureDecision::Started);
        assert_eq!(
            debounce.evaluate(Some(2.0), RED, parking, false, t0 + Duration::from_secs(4)),
            ClosureDecision::Holding
        );
        assert_eq!(
            debounce.evaluate(Some(2.0), RED, parking, false, t0 + Duration::from_secs(5)),
            ClosureDecision::Close
        );
    }

    #[test]
    fn never_closes_twice() {
        let mut debounce = CloseDebounce::default();
        let t0 = Instant::now();
        debounce.evaluate(Some(2.0), RED, ProcessState::Parking, false, t0);

        let decision =
            debounce.evaluate(Some(2.0), RED, ProcessState::Parking, true, t0 + Duration::from_secs(9));

        assert_eq!(decision, ClosureDecision::Holding);
    }

    #[test]
    fn gap_resets_timer() {
        let mut debounce = CloseDebounce::default();
        let t0 = Instant::now();
        let parking = ProcessState::Parking;

        debounce.evaluate(Some(2.0), RED, parking, false, t0);
        assert_eq!(
            debounce.evaluate(Some(5.0), RED, parking, false, t0 + Duration::from_secs(3)),
            ClosureDecision::Reset
        );
        assert_eq!(debounce.started_at(), None);

        let reentry = t0 + Duration::from_secs(4);
        assert_eq!(debounce.evaluate(Some(2.0), RED, parking, false, reentry), ClosureDecision::Started);
        assert_eq!(
            debounce.evaluate(Some(2.0), RED, parking, false, t0 + Duration::from_secs(6)),
            ClosureDecision::Holding
        );
        assert_eq!(debounce.started_at(), Some(reentry));
    }

    #[test]
    fn exiting_never_closes() {
        let mut debounce = CloseDebounce::default();
        let t0 = Instant::now();
        debounce.evaluate(Some(1.0), RED, ProcessState::Exiting, false, t0);

        let decision =
            debounce.evaluate(Some(1.0), RED, ProcessState::Exiting, false, t0 + Duration::from_secs(30));

        assert_eq!(decision, ClosureDecision::Holding);
    }

    #[test]
    fn unavailable_or_non_positive_front_clears_timer() {
        let mut debounce = CloseDebounce::default();
        let t0 = Instant::now();
        debounce.evaluate(Some(2.0), RED, ProcessState::Parking, false, t0);

        assert_eq!(
            debounce.evaluate(None, RED, ProcessState::Parking, false, t0),
            ClosureDecision::Reset
        );
        assert_eq!(debounce.started_at(), None);

        debounce.evaluate(Some(2.0), RED, ProcessState::Parking, false, t0);
        debounce.evaluate(Some(0.0), RED, ProcessState::Parking, false, t0);
        assert_eq!(debounce.started_at(), None);

        debounce.evaluate(Some(2.0), None, ProcessState::Parking, false, t0);
        assert_eq!(debounce.started_at(), None);
    }
}
