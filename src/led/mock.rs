use crate::fusion::Rgb;
use crate::led::{LedDriver, LedError};
use crate::sensor::SensorId;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedEvent {
    Segment(SensorId, Rgb),
    Show,
    Clear,
}

#[derive(Debug, Default)]
struct RecordedStrip {
    staged: [Option<Rgb>; 3],
    shown: [Option<Rgb>; 3],
    events: Vec<LedEvent>,
    fail: bool,
}

fn slot(segment: SensorId) -> usize {
    match segment {
        SensorId::Front => 0,
        SensorId::Left => 1,
        SensorId::Right => 2,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingLedsHandle {
    inner: Arc<Mutex<RecordedStrip>>,
}

impl RecordingLedsHandle {
    fn lock(&self) -> MutexGuard<'_, RecordedStrip> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Colour currently displayed on a segment (brightness applied).
    pub fn shown(&self, segment: SensorId) -> Rgb {
        self.lock().shown[slot(segment)].unwrap_or(Rgb::OFF)
    }

    pub fn is_dark(&self) -> bool {
        SensorId::ALL
            .iter()
            .all(|segment| self.shown(*segment) == Rgb::OFF)
    }

    pub fn events(&self) -> Vec<LedEvent> {
        self.lock().events.clone()
    }

    pub fn count(&self, event: LedEvent) -> usize {
        self.lock().events.iter().filter(|e| **e == event).count()
    }

    /// Make every following driver call fail.
    pub fn set_failing(&self, fail: bool) {
        self.lock().fail = fail;
    }
}

/// LED driver that records what would have been shown.
#[derive(Debug, Default)]
pub struct RecordingLeds {
    handle: RecordingLedsHandle,
}

impl RecordingLeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> RecordingLedsHandle {
        self.handle.clone()
    }
}

impl LedDriver for RecordingLeds {
    fn set_segment(&mut self, segment: SensorId, color: Rgb, brightness: u8) -> Result<(), LedError> {
        let mut strip = self.handle.lock();
        if strip.fail {
            return Err(LedError::Unavailable("mock failure".to_string()));
        }
        let scaled = color.scaled(brightness);
        strip.staged[slot(segment)] = Some(scaled);
        strip.events.push(LedEvent::Segment(segment, scaled));
        Ok(())
    }

    fn show(&mut self) -> Result<(), LedError> {
        let mut strip = self.handle.lock();
        if strip.fail {
            return Err(LedError::Unavailable("mock failure".to_string()));
        }
        strip.shown = strip.staged;
        strip.events.push(LedEvent::Show);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), LedError> {
        let mut strip = self.handle.lock();
        if strip.fail {
            return Err(LedError::Unavailable("mock failure".to_string()));
        }
        strip.staged = [None; 3];
        strip.shown = [None; 3];
        strip.events.push(LedEvent::Clear);
        Ok(())
    }
}
