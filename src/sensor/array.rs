use crate::error::AppError;
use crate::sensor::{DistanceSensor, MeasureError, SensorId};
use crate::state::DistanceSnapshot;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per sensor and cycle, including the first one.
    pub attempts: u32,
    /// Pause after a failed attempt.
    pub retry_delay: Duration,
    /// Pause after each sensor to avoid echo cross-talk.
    pub settle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// The three bay sensors, measured one after another.
pub struct SensorArray {
    sensors: Vec<(SensorId, Box<dyn DistanceSensor + Send>)>,
    policy: RetryPolicy,
}

impl SensorArray {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            sensors: Vec::with_capacity(SensorId::ALL.len()),
            policy,
        }
    }

    pub fn with_sensor(mut self, id: SensorId, sensor: Box<dyn DistanceSensor + Send>) -> Self {
        self.sensors.retain(|(existing, _)| *existing != id);
        self.sensors.push((id, sensor));
        self.sensors.sort_by_key(|(existing, _)| *existing);
        self
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn setup_all(&mut self) -> Result<(), AppError> {
        for (id, sensor) in &mut self.sensors {
            sensor.setup().inspect_err(|err| {
                error!(sensor = %id, error = %err, "Sensor setup failed");
            })?;
        }
        info!(count = self.sensors.len(), "All sensors initialized");
        Ok(())
    }

    /// Measure every sensor with retries. Sensors that keep failing, or that are not
    /// configured, are reported as unavailable.
    pub fn measure_all(&mut self) -> DistanceSnapshot {
        let mut snapshot = DistanceSnapshot::empty();
        for (id, sensor) in &mut self.sensors {
            let value = measure_with_retry(*id, sensor.as_mut(), &self.policy);
            snapshot.set(*id, value);
            if !self.policy.settle_delay.is_zero() {
                std::thread::sleep(self.policy.settle_delay);
            }
        }
        snapshot
    }
}

fn measure_with_retry(
    id: SensorId,
    sensor: &mut (dyn DistanceSensor + Send),
    policy: &RetryPolicy,
) -> Option<f64> {
    let attempts = policy.attempts.max(1);
    let mut last_error: Option<MeasureError> = None;

    for attempt in 1..=attempts {
        match sensor.measure() {
            Ok(distance) => {
                debug!(sensor = %id, distance_cm = distance, "Distance measured");
                return Some(distance);
            }
            Err(err) => {
                warn!(sensor = %id, attempt, error = %err, "Measurement attempt failed");
                last_error = Some(err);
                if attempt < attempts && !policy.retry_delay.is_zero() {
                    std::thread::sleep(policy.retry_delay);
                }
            }
        }
    }

    error!(
        sensor = %id,
        attempts,
        error = ?last_error,
        "Sensor unavailable after retries"
    );
    None
}
