//! MQTT transport over the blocking rumqttc client.

use crate::bus::{BusError, Publisher};
use rumqttc::{Client, ConnectReturnCode, Connection, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const ERROR_PAUSE: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_attempts: u32,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "garage-parking-assistant".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            connect_attempts: 5,
        }
    }
}

/// Delay before retry number `attempt` (1-based): 1 s doubling, capped at 30 s.
pub fn backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    INITIAL_BACKOFF
        .saturating_mul(1u32 << exponent)
        .min(MAX_BACKOFF)
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: Client,
}

impl MqttPublisher {
    pub fn disconnect(&self) {
        match self.client.disconnect() {
            Ok(()) => info!("Disconnected from MQTT broker"),
            Err(err) => warn!(error = %err, "MQTT disconnect failed"),
        }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BusError> {
        // Never block: the delivery thread itself publishes while handling commands.
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .map_err(|err| BusError::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }
}

/// Inbound half: owns the event loop until handed to the delivery thread.
pub struct MqttInbox {
    client: Client,
    connection: Connection,
    subscriptions: Vec<String>,
}

impl MqttInbox {
    /// Drive the event loop on its own thread, passing every inbound publish to `handler`.
    pub fn spawn_delivery<F>(self, handler: F, stop: Arc<AtomicBool>) -> JoinHandle<()>
    where
        F: Fn(&str, &[u8]) + Send + 'static,
    {
        let MqttInbox {
            client,
            mut connection,
            subscriptions,
        } = self;
        std::thread::spawn(move || {
            for event in connection.iter() {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                match event {
                    Ok(Event::Incoming(Packet::Publish(message))) => {
                        debug!(topic = %message.topic, bytes = message.payload.len(), "MQTT message received");
                        handler(&message.topic, &message.payload);
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Reconnected to MQTT broker");
                        subscribe_all(&client, &subscriptions);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "MQTT connection error");
                        std::thread::sleep(ERROR_PAUSE);
                    }
                }
            }
            debug!("MQTT delivery thread exiting");
        })
    }
}

fn subscribe_all(client: &Client, subscriptions: &[String]) {
    for topic in subscriptions {
        match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
            Ok(()) => debug!(topic = %topic, "Subscribed"),
            Err(err) => warn!(topic = %topic, error = %err, "Subscribe failed"),
        }
    }
}

fn wait_for_connack(connection: &mut Connection) -> Result<(), BusError> {
    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(BusError::Refused(format!("{:?}", ack.code)))
                };
            }
            Ok(_) => continue,
            Err(err) => return Err(BusError::Connection(err.to_string())),
        }
    }
    Err(BusError::Connection("event loop closed".to_string()))
}

/// Connect with bounded exponential backoff, then subscribe to `subscriptions`.
pub fn connect(
    settings: &MqttSettings,
    subscriptions: Vec<String>,
) -> Result<(MqttPublisher, MqttInbox), BusError> {
    let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        options.set_credentials(username, password);
    }
    let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);

    let attempts = settings.connect_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match wait_for_connack(&mut connection) {
            Ok(()) => {
                info!(host = %settings.host, port = settings.port, attempt, "Connected to MQTT broker");
                subscribe_all(&client, &subscriptions);
                let publisher = MqttPublisher {
                    client: client.clone(),
                };
                let inbox = MqttInbox {
                    client,
                    connection,
                    subscriptions,
                };
                return Ok((publisher, inbox));
            }
            Err(err) => {
                last_error = err.to_string();
                if attempt < attempts {
                    let delay = backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "MQTT connect failed"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
    error!(host = %settings.host, port = settings.port, attempts, "Giving up on MQTT broker");
    Err(BusError::ConnectExhausted {
        attempts,
        last: last_error,
    })
}
