//! HC-SR04 style ultrasonic sensor driven by two GPIO lines.

use crate::error::AppError;
use crate::sensor::{DistanceSensor, MeasureError, SensorId};

#[cfg(target_os = "linux")]
use rppal::gpio::{Gpio, InputPin, OutputPin};
#[cfg(target_os = "linux")]
use std::time::{Duration, Instant};
#[cfg(target_os = "linux")]
use tracing::{debug, info};

#[cfg(target_os = "linux")]
const TRIGGER_PULSE: Duration = Duration::from_micros(10);
#[cfg(target_os = "linux")]
const ECHO_TIMEOUT: Duration = Duration::from_millis(50);
#[cfg(target_os = "linux")]
const MAX_PULSE: Duration = Duration::from_millis(40);
#[cfg(target_os = "linux")]
const STABILIZATION: Duration = Duration::from_secs(2);

/// Half the speed of sound in cm/s: the echo covers the distance twice.
pub const CM_PER_SECOND: f64 = 17_150.0;

/// Convert an echo pulse width into a distance rounded to two decimals.
pub fn pulse_to_cm(pulse_secs: f64) -> f64 {
    (pulse_secs * CM_PER_SECOND * 100.0).round() / 100.0
}

#[cfg(target_os = "linux")]
pub struct UltrasonicSensor {
    id: SensorId,
    trigger: OutputPin,
    echo: InputPin,
}

#[cfg(target_os = "linux")]
impl UltrasonicSensor {
    pub fn new(id: SensorId, trig_pin: u8, echo_pin: u8) -> Result<Self, AppError> {
        let gpio = Gpio::new().map_err(|err| AppError::Gpio(err.to_string()))?;
        let trigger = gpio
            .get(trig_pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_output_low();
        let echo = gpio
            .get(echo_pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_input();
        Ok(Self { id, trigger, echo })
    }

    fn wait_while(&self, level_high: bool) -> Result<Instant, MeasureError> {
        let deadline = Instant::now() + ECHO_TIMEOUT;
        let mut edge = Instant::now();
        while self.echo.is_high() == level_high {
            edge = Instant::now();
            if edge > deadline {
                debug!(sensor = %self.id, waiting_for_high = !level_high, "Echo timeout");
                return Err(MeasureError::TimedOut);
            }
        }
        Ok(edge)
    }
}

#[cfg(target_os = "linux")]
impl DistanceSensor for UltrasonicSensor {
    fn setup(&mut self) -> Result<(), AppError> {
        self.trigger.set_low();
        std::thread::sleep(STABILIZATION);
        info!(sensor = %self.id, "Ultrasonic sensor initialized");
        Ok(())
    }

    fn measure(&mut self) -> Result<f64, MeasureError> {
        self.trigger.set_high();
        std::thread::sleep(TRIGGER_PULSE);
        self.trigger.set_low();

        let pulse_start = self.wait_while(false)?;
        let pulse_end = self.wait_while(true)?;

        let pulse = pulse_end.saturating_duration_since(pulse_start);
        if pulse.is_zero() || pulse > MAX_PULSE {
            return Err(MeasureError::InvalidPulse);
        }
        Ok(pulse_to_cm(pulse.as_secs_f64()))
    }
}

#[cfg(not(target_os = "linux"))]
pub struct UltrasonicSensor;

#[cfg(not(target_os = "linux"))]
impl UltrasonicSensor {
    pub fn new(_id: SensorId, _trig_pin: u8, _echo_pin: u8) -> Result<Self, AppError> {
        Err(AppError::Sensor(
            "ultrasonic driver requires Linux/Raspberry Pi".to_string(),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl DistanceSensor for UltrasonicSensor {
    fn setup(&mut self) -> Result<(), AppError> {
        Err(AppError::Sensor(
            "ultrasonic driver requires Linux/Raspberry Pi".to_string(),
        ))
    }

    fn measure(&mut self) -> Result<f64, MeasureError> {
        Err(MeasureError::Driver(
            "ultrasonic driver requires Linux/Raspberry Pi".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_width_maps_to_centimetres() {
        assert_eq!(pulse_to_cm(0.001), 17.15);
        assert_eq!(pulse_to_cm(0.0001234), 2.12);
    }
}
