mod common;

use common::Bench;
use garage_parking_assistant::detection::mock::MockVote;
use garage_parking_assistant::gateway::{Gateway, GatewayError};
use garage_parking_assistant::sensor::SensorId;
use garage_parking_assistant::state::ProcessState;
use std::error::Error;

#[test]
fn inbound_messages_drive_the_procedure() -> Result<(), Box<dyn Error>> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();
    let gateway = Gateway::new(bench.controller.clone(), &topics);

    gateway.dispatch(&topics.user_presence, b"home")?;
    gateway.dispatch(&topics.door_command, b"OPEN")?;

    assert_eq!(bench.controller.process()?, ProcessState::Parking);
    assert_eq!(bench.last(&topics.system_enabled), Some("ON".to_string()));
    assert_eq!(bench.last(&topics.door_state), Some("open".to_string()));

    gateway.dispatch(&topics.door_command, b"close")?;
    assert_eq!(bench.controller.process()?, ProcessState::Idle);
    assert_eq!(bench.last(&topics.system_enabled), Some("OFF".to_string()));
    Ok(())
}

#[test]
fn unknown_topic_is_rejected() {
    let bench = Bench::new(50.0, MockVote::Clear);
    let gateway = Gateway::new(bench.controller.clone(), &bench.topics());

    let result = gateway.dispatch("garage/parking/unknown", b"OPEN");

    assert!(matches!(result, Err(GatewayError::UnknownTopic(topic)) if topic == "garage/parking/unknown"));
}

#[test]
fn unknown_door_command_changes_nothing() -> Result<(), Box<dyn Error>> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();
    let gateway = Gateway::new(bench.controller.clone(), &topics);
    gateway.dispatch(&topics.user_presence, b"on")?;

    let result = gateway.dispatch(&topics.door_command, b"STOP");

    assert!(matches!(result, Err(GatewayError::InvalidPayload { .. })));
    assert_eq!(bench.controller.process()?, ProcessState::Idle);
    assert!(bench.publisher.on_topic(&topics.door_state).is_empty());
    Ok(())
}

#[test]
fn settings_message_updates_thresholds() -> Result<(), Box<dyn Error>> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();
    let gateway = Gateway::new(bench.controller.clone(), &topics);

    gateway.dispatch(
        &topics.settings,
        br#"{"red_distance_threshold_left": 5, "orange_distance_threshold_left": 20, "brightness": 80, "unknown": 1}"#,
    )?;

    let thresholds = bench.controller.thresholds()?;
    assert_eq!(thresholds.red(SensorId::Left), 5.0);
    assert_eq!(thresholds.orange(SensorId::Left), 20.0);
    assert_eq!(thresholds.red(SensorId::Front), 3.0);
    assert_eq!(thresholds.brightness(), 80);
    Ok(())
}

#[test]
fn invalid_settings_are_rejected_whole() -> Result<(), Box<dyn Error>> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();
    let gateway = Gateway::new(bench.controller.clone(), &topics);
    let before = bench.controller.thresholds()?;

    let red_above_orange = gateway.dispatch(
        &topics.settings,
        br#"{"red_distance_threshold_front": 12, "brightness": 90}"#,
    );
    let malformed = gateway.dispatch(&topics.settings, b"{not json");

    assert!(red_above_orange.is_err());
    assert!(matches!(malformed, Err(GatewayError::Settings(_))));
    assert_eq!(bench.controller.thresholds()?, before);
    Ok(())
}

#[test]
fn disabling_through_settings_stops_the_procedure() -> Result<(), Box<dyn Error>> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();
    let gateway = Gateway::new(bench.controller.clone(), &topics);
    gateway.dispatch(&topics.user_presence, b"on")?;
    gateway.dispatch(&topics.door_command, b"OPEN")?;

    gateway.dispatch(&topics.settings, br#"{"enabled": false}"#)?;
    assert!(!bench.controller.system_enabled()?);
    bench.controller.tick()?;

    assert_eq!(bench.controller.process()?, ProcessState::Idle);
    assert!(bench.leds.is_dark());
    assert_eq!(
        bench.last(&topics.sensor_availability(SensorId::Right)),
        Some("offline".to_string())
    );
    Ok(())
}

#[test]
fn handle_swallows_rejected_messages() -> Result<(), Box<dyn Error>> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();
    let gateway = Gateway::new(bench.controller.clone(), &topics);

    gateway.handle(&topics.user_presence, b"\xff\xfe");
    gateway.handle(&topics.door_state, b"ajar");
    gateway.handle(&topics.door_state, b"open");

    assert!(bench.controller.status()?.garage_door_open);
    assert!(!bench.controller.status()?.user_is_home);
    Ok(())
}
