//! Routes inbound bus messages to the controller through a topic dispatch table.

use crate::bus::Topics;
use crate::controller::ProcessController;
use crate::error::AppError;
use crate::state::DoorCommand;
use crate::thresholds::{SettingsError, SettingsUpdate};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no handler for topic {0}")]
    UnknownTopic(String),
    #[error("invalid {kind} payload {payload:?}")]
    InvalidPayload { kind: &'static str, payload: String },
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Controller(#[from] AppError),
}

type Handler = fn(&ProcessController, &str) -> Result<(), GatewayError>;

pub fn parse_door_command(payload: &str) -> Result<DoorCommand, GatewayError> {
    match payload.trim().to_ascii_uppercase().as_str() {
        "OPEN" => Ok(DoorCommand::Open),
        "CLOSE" => Ok(DoorCommand::Close),
        _ => Err(GatewayError::InvalidPayload {
            kind: "door command",
            payload: payload.to_string(),
        }),
    }
}

pub fn parse_presence(payload: &str) -> Result<bool, GatewayError> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "home" | "1" => Ok(true),
        "off" | "false" | "not_home" | "0" => Ok(false),
        _ => Err(GatewayError::InvalidPayload {
            kind: "user presence",
            payload: payload.to_string(),
        }),
    }
}

pub fn parse_door_state(payload: &str) -> Result<bool, GatewayError> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "open" | "on" => Ok(true),
        "closed" | "off" => Ok(false),
        _ => Err(GatewayError::InvalidPayload {
            kind: "door state",
            payload: payload.to_string(),
        }),
    }
}

fn handle_settings(controller: &ProcessController, payload: &str) -> Result<(), GatewayError> {
    let update = SettingsUpdate::parse(payload)?;
    controller.apply_settings(&update)?;
    Ok(())
}

fn handle_door_command(controller: &ProcessController, payload: &str) -> Result<(), GatewayError> {
    let command = parse_door_command(payload)?;
    controller.on_door_command(command)?;
    Ok(())
}

fn handle_presence(controller: &ProcessController, payload: &str) -> Result<(), GatewayError> {
    controller.on_user_presence(parse_presence(payload)?)?;
    Ok(())
}

fn handle_door_state(controller: &ProcessController, payload: &str) -> Result<(), GatewayError> {
    controller.on_door_state(parse_door_state(payload)?)?;
    Ok(())
}

pub struct Gateway {
    controller: ProcessController,
    routes: HashMap<String, Handler>,
}

impl Gateway {
    pub fn new(controller: ProcessController, topics: &Topics) -> Self {
        let mut routes: HashMap<String, Handler> = HashMap::new();
        routes.insert(topics.settings.clone(), handle_settings);
        routes.insert(topics.door_command.clone(), handle_door_command);
        routes.insert(topics.user_presence.clone(), handle_presence);
        routes.insert(topics.door_state.clone(), handle_door_state);
        Self { controller, routes }
    }

    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Result<(), GatewayError> {
        let handler = self
            .routes
            .get(topic)
            .ok_or_else(|| GatewayError::UnknownTopic(topic.to_string()))?;
        let payload = std::str::from_utf8(payload).map_err(|_| GatewayError::InvalidPayload {
            kind: "utf-8",
            payload: String::from_utf8_lossy(payload).into_owned(),
        })?;
        debug!(topic, payload, "Dispatching message");
        handler(&self.controller, payload)
    }

    /// Dispatch and log; used by the delivery loop, which has nobody to report to.
    pub fn handle(&self, topic: &str, payload: &[u8]) {
        if let Err(err) = self.dispatch(topic, payload) {
            warn!(topic, error = %err, "Message rejected");
        }
    }
}
