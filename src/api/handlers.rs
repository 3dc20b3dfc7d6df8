use crate::api::responses::{
    ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse, SensorDistanceResponse,
    StatusSuccessResponse, ThresholdsResponse,
};
use crate::controller::{ControllerStatus, ProcessController};
use crate::error::AppError;
use crate::fusion;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum StatusResponse {
    Success(Box<StatusSuccessResponse>),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for StatusResponse {
    fn into_response(self) -> Response {
        match self {
            StatusResponse::Success(body) => (StatusCode::OK, Json(*body)).into_response(),
            StatusResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_status(State(controller): State<ProcessController>) -> impl IntoResponse {
    build_status_response(read_status(controller).await, SystemTime::now())
}

pub enum HealthResponse {
    Success(HealthSuccessResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(controller): State<ProcessController>) -> impl IntoResponse {
    build_health_response(read_status(controller).await, SystemTime::now())
}

/// Controller status, read on the blocking pool. A start holds the state lock
/// through its stabilization delay.
pub async fn read_status(controller: ProcessController) -> Result<ControllerStatus, AppError> {
    tokio::task::spawn_blocking(move || controller.status())
        .await
        .map_err(|err| AppError::Task(err.to_string()))?
}

fn build_status_response(
    status: Result<ControllerStatus, AppError>,
    now: SystemTime,
) -> StatusResponse {
    let status = match status {
        Ok(status) => status,
        Err(err) => {
            let (status, body) = internal_error("/api/status", &err.to_string());
            return StatusResponse::Error { status, body };
        }
    };
    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(err) => {
            let (status, body) = internal_error("/api/status", &err.to_string());
            return StatusResponse::Error { status, body };
        }
    };

    let sensors = fusion::zones(&status.distances, &status.thresholds)
        .into_iter()
        .map(|(sensor, zone)| {
            let distance_cm = status.distances.get(sensor);
            SensorDistanceResponse {
                sensor,
                available: distance_cm.is_some(),
                distance_cm,
                zone,
            }
        })
        .collect();

    StatusResponse::Success(Box::new(StatusSuccessResponse {
        process: status.process,
        obstacle: status.obstacle,
        system_enabled: status.system_enabled,
        settings_enabled: status.settings_enabled,
        user_is_home: status.user_is_home,
        garage_door_open: status.garage_door_open,
        blinking: status.blinking,
        close_command_sent: status.close_command_sent,
        sensors,
        thresholds: ThresholdsResponse {
            red: status.thresholds.red_distances(),
            orange: status.thresholds.orange_distances(),
            brightness: status.thresholds.brightness(),
        },
        metrics: status.metrics,
        timestamp,
    }))
}

fn build_health_response(
    status: Result<ControllerStatus, AppError>,
    now: SystemTime,
) -> HealthResponse {
    let status = match status {
        Ok(status) => status,
        Err(err) => {
            let (status, body) = internal_error("/api/health", &err.to_string());
            return HealthResponse::Error { status, body };
        }
    };
    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(err) => {
            let (status, body) = internal_error("/api/health", &err.to_string());
            return HealthResponse::Error { status, body };
        }
    };
    HealthResponse::Success(HealthSuccessResponse {
        status: derive_health_status(&status),
        timestamp,
    })
}

/// Degraded when the system is active but a sensor is not reporting.
fn derive_health_status(status: &ControllerStatus) -> HealthStatus {
    if status.system_enabled && !status.distances.all_available() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

fn internal_error(route: &str, message: &str) -> (StatusCode, ErrorResponse) {
    error!(route, message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        "1970-01-01T00:00:00Z".to_string()
    });
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    )
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}
