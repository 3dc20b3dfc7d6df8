//! Outbound state messages. Publication is fire-and-forget: failures are logged only.

use crate::bus::{Publisher, Topics};
use crate::sensor::SensorId;
use crate::state::{DistanceSnapshot, ObstacleState, ProcessState};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const UNAUTHORIZED_NOTICE: &str = "Attempt to open garage door denied. User is not home.";
pub const CLOSE_COMMAND: &str = "CLOSE";
const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

#[derive(Clone)]
pub struct Telemetry {
    publisher: Arc<dyn Publisher>,
    topics: Arc<Topics>,
}

impl Telemetry {
    pub fn new(publisher: Arc<dyn Publisher>, topics: Topics) -> Self {
        Self {
            publisher,
            topics: Arc::new(topics),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    fn send(&self, topic: &str, payload: &str, retain: bool) {
        if let Err(err) = self.publisher.publish(topic, payload, retain) {
            warn!(topic, error = %err, "Publish failed");
        }
    }

    pub fn process_state(&self, state: ProcessState) {
        self.send(&self.topics.process_state, state.as_str(), true);
        debug!(state = %state, "Published process state");
    }

    pub fn obstacle(&self, state: ObstacleState) {
        self.send(&self.topics.obstacle, state.as_str(), true);
        info!(state = %state, "Published obstacle state");
    }

    pub fn system_enabled(&self, enabled: bool) {
        let payload = if enabled { "ON" } else { "OFF" };
        self.send(&self.topics.system_enabled, payload, true);
        info!(enabled, "Published system enabled");
    }

    pub fn door_state(&self, open: bool) {
        let payload = if open { "open" } else { "closed" };
        self.send(&self.topics.door_state, payload, true);
        info!(state = payload, "Published garage door state");
    }

    pub fn close_door(&self) {
        self.send(&self.topics.door_command, CLOSE_COMMAND, false);
        info!("Sent close command to garage door");
    }

    pub fn unauthorized_access(&self) {
        self.send(&self.topics.unauthorized_access, UNAUTHORIZED_NOTICE, false);
        warn!("Published unauthorized door open attempt");
    }

    /// Distance plus availability per sensor; unavailable readings only go offline.
    pub fn distances(&self, snapshot: &DistanceSnapshot) {
        for reading in snapshot.readings() {
            let availability = self.topics.sensor_availability(reading.sensor_id);
            match reading.value {
                Some(distance) => {
                    let topic = self.topics.sensor_distance(reading.sensor_id);
                    self.send(&topic, &format!("{distance:.2}"), false);
                    self.send(&availability, ONLINE, false);
                }
                None => self.send(&availability, OFFLINE, false),
            }
        }
    }

    pub fn sensors_offline(&self) {
        for sensor in SensorId::ALL {
            self.send(&self.topics.sensor_availability(sensor), OFFLINE, false);
        }
    }
}
