use crate::error::AppError;
use crate::sensor::{DistanceSensor, MeasureError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct MockSensorState {
    script: VecDeque<Result<f64, MeasureError>>,
    fallback: Result<f64, MeasureError>,
    calls: usize,
    setup_ok: bool,
}

/// Shared view of a mock sensor, kept by tests to steer readings after the sensor
/// has been moved into the controller.
#[derive(Debug, Clone)]
pub struct MockSensorHandle {
    inner: Arc<Mutex<MockSensorState>>,
}

impl MockSensorHandle {
    fn lock(&self) -> MutexGuard<'_, MockSensorState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the steady-state reading. `None` makes every attempt time out.
    pub fn set_distance(&self, distance: Option<f64>) {
        let mut state = self.lock();
        state.fallback = distance.ok_or(MeasureError::TimedOut);
    }

    pub fn push(&self, outcome: Result<f64, MeasureError>) {
        self.lock().script.push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.lock().calls
    }
}

pub struct MockSensor {
    handle: MockSensorHandle,
}

impl MockSensor {
    fn from_state(script: Vec<Result<f64, MeasureError>>, fallback: Result<f64, MeasureError>) -> Self {
        Self {
            handle: MockSensorHandle {
                inner: Arc::new(Mutex::new(MockSensorState {
                    script: script.into(),
                    fallback,
                    calls: 0,
                    setup_ok: true,
                })),
            },
        }
    }

    pub fn fixed(distance: f64) -> Self {
        Self::from_state(Vec::new(), Ok(distance))
    }

    pub fn failing(error: MeasureError) -> Self {
        Self::from_state(Vec::new(), Err(error))
    }

    /// Replays `script` in order, then keeps returning the last scripted outcome.
    pub fn scripted(script: Vec<Result<f64, MeasureError>>) -> Self {
        let fallback = script
            .last()
            .cloned()
            .unwrap_or(Err(MeasureError::TimedOut));
        Self::from_state(script, fallback)
    }

    pub fn with_failing_setup(self) -> Self {
        self.handle.lock().setup_ok = false;
        self
    }

    pub fn handle(&self) -> MockSensorHandle {
        self.handle.clone()
    }
}

impl DistanceSensor for MockSensor {
    fn setup(&mut self) -> Result<(), AppError> {
        if self.handle.lock().setup_ok {
            Ok(())
        } else {
            Err(AppError::Sensor("mock setup failed".to_string()))
        }
    }

    fn measure(&mut self) -> Result<f64, MeasureError> {
        let mut state = self.handle.lock();
        state.calls += 1;
        match state.script.pop_front() {
            Some(outcome) => outcome,
            None => state.fallback.clone(),
        }
    }
}
