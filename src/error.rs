use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("sensor error: {0}")]
    Sensor(String),
    #[error("led error: {0}")]
    Led(String),
    #[error("camera error: {0}")]
    Camera(String),
    #[error("bus error: {0}")]
    Bus(#[from] crate::bus::BusError),
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("settings rejected: {0}")]
    Settings(#[from] crate::thresholds::SettingsError),
    #[error("state lock poisoned")]
    StateLock,
    #[error("blocking task failed: {0}")]
    Task(String),
}
