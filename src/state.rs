use crate::sensor::SensorId;
use serde::Serialize;
use std::fmt;

/// One sensor's value for a single tick. `None` means the sensor was unavailable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub sensor_id: SensorId,
    pub value: Option<f64>,
}

impl SensorReading {
    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }
}

/// Latest distances for the three bay sensors, in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceSnapshot {
    front: Option<f64>,
    left: Option<f64>,
    right: Option<f64>,
}

impl DistanceSnapshot {
    /// A snapshot with every sensor unavailable.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(front: Option<f64>, left: Option<f64>, right: Option<f64>) -> Self {
        Self { front, left, right }
    }

    pub fn get(&self, sensor: SensorId) -> Option<f64> {
        match sensor {
            SensorId::Front => self.front,
            SensorId::Left => self.left,
            SensorId::Right => self.right,
        }
    }

    pub fn set(&mut self, sensor: SensorId, value: Option<f64>) {
        match sensor {
            SensorId::Front => self.front = value,
            SensorId::Left => self.left = value,
            SensorId::Right => self.right = value,
        }
    }

    pub fn readings(&self) -> [SensorReading; 3] {
        SensorId::ALL.map(|sensor_id| SensorReading {
            sensor_id,
            value: self.get(sensor_id),
        })
    }

    pub fn all_available(&self) -> bool {
        self.readings().iter().all(SensorReading::is_available)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    #[default]
    Idle,
    Parking,
    Exiting,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Idle => "IDLE",
            ProcessState::Parking => "PARKING",
            ProcessState::Exiting => "EXITING",
        }
    }

    pub fn is_idle(self) -> bool {
        matches!(self, ProcessState::Idle)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObstacleState {
    Detected,
    Clear,
    #[default]
    Idle,
}

impl ObstacleState {
    pub fn as_str(self) -> &'static str {
        match self {
            ObstacleState::Detected => "DETECTED",
            ObstacleState::Clear => "CLEAR",
            ObstacleState::Idle => "IDLE",
        }
    }
}

impl fmt::Display for ObstacleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command on the garage door command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorCommand {
    Open,
    Close,
}

impl DoorCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            DoorCommand::Open => "OPEN",
            DoorCommand::Close => "CLOSE",
        }
    }
}

impl fmt::Display for DoorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
