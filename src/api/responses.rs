use crate::fusion::Zone;
use crate::metrics::MetricsSnapshot;
use crate::sensor::SensorId;
use crate::state::{ObstacleState, ProcessState};
use crate::thresholds::SensorDistances;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusSuccessResponse {
    pub process: ProcessState,
    pub obstacle: ObstacleState,
    pub system_enabled: bool,
    pub settings_enabled: bool,
    pub user_is_home: bool,
    pub garage_door_open: bool,
    pub blinking: bool,
    pub close_command_sent: bool,
    pub sensors: Vec<SensorDistanceResponse>,
    pub thresholds: ThresholdsResponse,
    pub metrics: MetricsSnapshot,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SensorDistanceResponse {
    pub sensor: SensorId,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_cm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdsResponse {
    pub red: SensorDistances,
    pub orange: SensorDistances,
    pub brightness: u8,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalError,
}
