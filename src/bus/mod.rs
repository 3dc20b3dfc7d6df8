use crate::sensor::SensorId;
use serde::Deserialize;
use thiserror::Error;

pub mod mock;
pub mod mqtt;
pub mod telemetry;

pub use telemetry::Telemetry;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("broker refused connection: {0}")]
    Refused(String),
    #[error("gave up connecting after {attempts} attempts: {last}")]
    ConnectExhausted { attempts: u32, last: String },
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Outbound side of the message bus.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BusError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Topics {
    pub settings: String,
    pub door_command: String,
    pub door_state: String,
    pub user_presence: String,
    pub obstacle: String,
    pub process_state: String,
    pub system_enabled: String,
    pub sensor_prefix: String,
    pub unauthorized_access: String,
}

impl Topics {
    pub fn sensor_distance(&self, sensor: SensorId) -> String {
        format!("{}/{}/distance", self.sensor_prefix, sensor)
    }

    pub fn sensor_availability(&self, sensor: SensorId) -> String {
        format!("{}/{}/availability", self.sensor_prefix, sensor)
    }

    /// Topics the gateway consumes.
    pub fn inbound(&self) -> [&str; 4] {
        [
            &self.settings,
            &self.door_command,
            &self.door_state,
            &self.user_presence,
        ]
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            settings: "garage/parking/settings".to_string(),
            door_command: "garage/parking/garage_door/command".to_string(),
            door_state: "garage/parking/garage_door/state".to_string(),
            user_presence: "homeassistant/status/user_is_home".to_string(),
            obstacle: "garage/parking/ai_detection".to_string(),
            process_state: "garage/parking/process_state".to_string(),
            system_enabled: "garage/parking/system_enabled".to_string(),
            sensor_prefix: "garage/parking/sensor".to_string(),
            unauthorized_access: "garage/parking/unauthorized_access".to_string(),
        }
    }
}
