use crate::config::SensorSettings;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod array;
pub mod mock;
pub mod ultrasonic;
pub mod vl53l1x;

pub use array::{RetryPolicy, SensorArray};

/// Position of a distance sensor in the bay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorId {
    Front,
    Left,
    Right,
}

impl SensorId {
    pub const ALL: [SensorId; 3] = [SensorId::Front, SensorId::Left, SensorId::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorId::Front => "front",
            SensorId::Left => "left",
            SensorId::Right => "right",
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single failed measurement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    #[error("echo timed out")]
    TimedOut,
    #[error("invalid pulse width")]
    InvalidPulse,
    #[error("driver failure: {0}")]
    Driver(String),
}

pub trait DistanceSensor {
    /// Prepare the hardware. Called once before the first measurement.
    fn setup(&mut self) -> Result<(), AppError>;
    /// Distance to the nearest object in centimetres.
    fn measure(&mut self) -> Result<f64, MeasureError>;
}

impl DistanceSensor for Box<dyn DistanceSensor + Send> {
    fn setup(&mut self) -> Result<(), AppError> {
        (**self).setup()
    }
    fn measure(&mut self) -> Result<f64, MeasureError> {
        (**self).measure()
    }
}

/// Build the driver described by a `[sensors.<name>]` section.
pub fn build_sensor(
    sensor: SensorId,
    settings: &SensorSettings,
) -> Result<Box<dyn DistanceSensor + Send>, AppError> {
    match settings {
        SensorSettings::Ultrasonic { trig_pin, echo_pin } => Ok(Box::new(
            ultrasonic::UltrasonicSensor::new(sensor, *trig_pin, *echo_pin)?,
        )),
        SensorSettings::Vl53l1x { i2c_address } => {
            Ok(Box::new(vl53l1x::Vl53l1xSensor::new(sensor, *i2c_address)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_names_match_topic_segments() {
        let names: Vec<&str> = SensorId::ALL.iter().map(|id| id.as_str()).collect();
        assert_eq!(names, vec!["front", "left", "right"]);
    }

    #[test]
    fn measure_error_messages_are_readable() {
        assert_eq!(MeasureError::TimedOut.to_string(), "echo timed out");
        assert_eq!(
            MeasureError::Driver("bus busy".to_string()).to_string(),
            "driver failure: bus busy"
        );
    }
}
