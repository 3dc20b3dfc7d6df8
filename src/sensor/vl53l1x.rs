use crate::error::AppError;
use crate::sensor::{DistanceSensor, MeasureError, SensorId};

#[cfg(target_os = "linux")]
use rppal::i2c::I2c;
#[cfg(target_os = "linux")]
use tracing::info;
#[cfg(target_os = "linux")]
use vl53l1x_uld::{IOVoltage, RangeStatus, VL53L1X};

/// Time-of-flight sensor already strapped to its own 7-bit I2C address.
#[cfg(target_os = "linux")]
pub struct Vl53l1xSensor {
    id: SensorId,
    address: u8,
    driver: VL53L1X<I2c>,
    io_voltage: IOVoltage,
}

#[cfg(target_os = "linux")]
impl Vl53l1xSensor {
    pub fn new(id: SensorId, address: u8) -> Result<Self, AppError> {
        let i2c = I2c::new().map_err(|err| AppError::I2c(err.to_string()))?;
        Ok(Self {
            id,
            address,
            driver: VL53L1X::new(i2c, address),
            // Default to 2.8V IO
            io_voltage: IOVoltage::Volt2_8,
        })
    }
}

#[cfg(target_os = "linux")]
impl DistanceSensor for Vl53l1xSensor {
    fn setup(&mut self) -> Result<(), AppError> {
        self.driver
            .init(self.io_voltage)
            .map_err(|err| AppError::Sensor(format!("{}: init: {err:?}", self.id)))?;
        self.driver
            .start_ranging()
            .map_err(|err| AppError::Sensor(format!("{}: start ranging: {err:?}", self.id)))?;
        info!(
            sensor = %self.id,
            address = format_args!("{:#04x}", self.address),
            "Time-of-flight sensor initialized"
        );
        Ok(())
    }

    fn measure(&mut self) -> Result<f64, MeasureError> {
        let result = self
            .driver
            .get_result()
            .map_err(|err| MeasureError::Driver(format!("{err:?}")))?;
        // Clear interrupt to trigger next measurement
        self.driver
            .clear_interrupt()
            .map_err(|err| MeasureError::Driver(format!("clear_interrupt: {err:?}")))?;

        if !matches!(result.status, RangeStatus::Valid) {
            return Err(MeasureError::InvalidPulse);
        }
        Ok(f64::from(result.distance_mm) / 10.0)
    }
}

#[cfg(not(target_os = "linux"))]
pub struct Vl53l1xSensor;

#[cfg(not(target_os = "linux"))]
impl Vl53l1xSensor {
    pub fn new(_id: SensorId, _address: u8) -> Result<Self, AppError> {
        Err(AppError::Sensor(
            "VL53L1X driver requires Linux/Raspberry Pi".to_string(),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl DistanceSensor for Vl53l1xSensor {
    fn setup(&mut self) -> Result<(), AppError> {
        Err(AppError::Sensor(
            "VL53L1X driver requires Linux/Raspberry Pi".to_string(),
        ))
    }

    fn measure(&mut self) -> Result<f64, MeasureError> {
        Err(MeasureError::Driver(
            "VL53L1X driver requires Linux/Raspberry Pi".to_string(),
        ))
    }
}
