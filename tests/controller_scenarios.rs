mod common;

use common::{Bench, fast_timing, wait_until};
use garage_parking_assistant::bus::telemetry::UNAUTHORIZED_NOTICE;
use garage_parking_assistant::controller::Timing;
use garage_parking_assistant::detection::mock::MockVote;
use garage_parking_assistant::error::AppError;
use garage_parking_assistant::fusion::Rgb;
use garage_parking_assistant::led::mock::LedEvent;
use garage_parking_assistant::sensor::SensorId;
use garage_parking_assistant::state::{DoorCommand, ObstacleState, ProcessState};
use garage_parking_assistant::thresholds::SettingsUpdate;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn open_door(bench: &Bench) -> Result<(), AppError> {
    bench.controller.on_user_presence(true)?;
    bench.controller.on_door_command(DoorCommand::Open)
}

#[test]
fn vehicle_in_bay_starts_exiting_without_detection() -> Result<(), AppError> {
    let bench = Bench::new(2.0, MockVote::Obstacle);
    let topics = bench.topics();

    open_door(&bench)?;

    assert_eq!(bench.controller.process()?, ProcessState::Exiting);
    assert_eq!(bench.last(&topics.process_state), Some("EXITING".to_string()));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(bench.frames.captures(), 0);
    assert_eq!(bench.classifier.calls(), 0);

    bench.controller.tick()?;
    assert_eq!(bench.frames.captures(), 0);
    Ok(())
}

#[test]
fn empty_bay_starts_parking_and_detection() -> Result<(), AppError> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();

    open_door(&bench)?;

    assert_eq!(bench.controller.process()?, ProcessState::Parking);
    assert_eq!(bench.last(&topics.process_state), Some("PARKING".to_string()));
    assert!(wait_until(WAIT, || bench.classifier.calls() == 3));
    assert!(wait_until(WAIT, || {
        bench.last(&topics.obstacle).as_deref() == Some("CLEAR")
    }));
    assert_eq!(bench.controller.status()?.obstacle, ObstacleState::Clear);
    Ok(())
}

#[test]
fn second_start_does_not_measure_again() -> Result<(), AppError> {
    let bench = Bench::new(50.0, MockVote::Clear);
    open_door(&bench)?;
    let measured = bench.front.calls();

    bench.controller.start_procedure()?;
    bench.controller.on_door_command(DoorCommand::Open)?;

    assert_eq!(bench.front.calls(), measured);
    assert_eq!(bench.controller.process()?, ProcessState::Parking);
    Ok(())
}

#[test]
fn red_proximity_closes_the_door_once() -> Result<(), AppError> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();
    open_door(&bench)?;

    bench.front.set_distance(Some(2.0));
    bench.controller.tick()?;
    std::thread::sleep(fast_timing().close_dwell + Duration::from_millis(10));
    bench.controller.tick()?;
    bench.controller.tick()?;
    bench.controller.tick()?;

    assert_eq!(bench.publisher.on_topic(&topics.door_command), vec!["CLOSE".to_string()]);
    assert_eq!(bench.last(&topics.system_enabled), Some("OFF".to_string()));
    assert!(!bench.controller.system_enabled()?);
    assert_eq!(bench.controller.process()?, ProcessState::Idle);
    assert_eq!(bench.controller.metrics().close_commands, 1);
    Ok(())
}

#[test]
fn leaving_red_zone_restarts_the_closure_timer() -> Result<(), AppError> {
    let timing = Timing {
        close_dwell: Duration::from_millis(100),
        ..fast_timing()
    };
    let bench = Bench::with_timing(50.0, MockVote::Clear, timing);
    let topics = bench.topics();
    open_door(&bench)?;

    bench.front.set_distance(Some(2.0));
    bench.controller.tick()?;
    std::thread::sleep(Duration::from_millis(60));
    bench.front.set_distance(Some(5.0));
    bench.controller.tick()?;
    std::thread::sleep(Duration::from_millis(60));
    bench.front.set_distance(Some(2.0));
    bench.controller.tick()?;

    assert!(bench.publisher.on_topic(&topics.door_command).is_empty());
    assert_eq!(bench.controller.process()?, ProcessState::Parking);

    std::thread::sleep(Duration::from_millis(120));
    bench.controller.tick()?;
    assert_eq!(bench.publisher.on_topic(&topics.door_command), vec!["CLOSE".to_string()]);
    Ok(())
}

#[test]
fn exiting_never_auto_closes() -> Result<(), AppError> {
    let bench = Bench::new(2.0, MockVote::Clear);
    let topics = bench.topics();
    open_door(&bench)?;

    bench.controller.tick()?;
    std::thread::sleep(fast_timing().close_dwell + Duration::from_millis(10));
    bench.controller.tick()?;

    assert!(bench.publisher.on_topic(&topics.door_command).is_empty());
    assert_eq!(bench.controller.process()?, ProcessState::Exiting);
    Ok(())
}

#[test]
fn open_while_user_away_is_refused() -> Result<(), AppError> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();

    bench.controller.on_door_command(DoorCommand::Open)?;

    assert_eq!(
        bench.publisher.on_topic(&topics.unauthorized_access),
        vec![UNAUTHORIZED_NOTICE.to_string()]
    );
    assert_eq!(bench.controller.process()?, ProcessState::Idle);
    assert!(!bench.controller.status()?.garage_door_open);
    assert_eq!(bench.front.calls(), 0);
    Ok(())
}

#[test]
fn missing_reading_turns_segment_off_and_goes_offline() -> Result<(), AppError> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();
    open_door(&bench)?;

    bench.left.set_distance(None);
    bench.front.set_distance(Some(7.0));
    bench.controller.tick()?;

    assert_eq!(bench.leds.shown(SensorId::Left), Rgb::OFF);
    assert_eq!(bench.leds.shown(SensorId::Front), Rgb::ORANGE.scaled(20));
    assert_eq!(bench.leds.shown(SensorId::Right), Rgb::GREEN.scaled(20));
    assert_eq!(
        bench.last(&topics.sensor_availability(SensorId::Left)),
        Some("offline".to_string())
    );
    assert_eq!(
        bench.last(&topics.sensor_distance(SensorId::Front)),
        Some("7.00".to_string())
    );
    assert_eq!(bench.controller.distances()?.get(SensorId::Left), None);
    Ok(())
}

#[test]
fn obstacle_blinks_then_detection_resumes() -> Result<(), AppError> {
    let timing = Timing {
        blink_duration: Duration::from_millis(300),
        ..fast_timing()
    };
    let bench = Bench::with_timing(50.0, MockVote::Obstacle, timing);
    let topics = bench.topics();
    open_door(&bench)?;

    assert!(wait_until(WAIT, || bench.controller.is_blinking().unwrap_or(false)));
    assert_eq!(bench.last(&topics.obstacle), Some("DETECTED".to_string()));

    bench.controller.tick()?;
    assert_eq!(
        bench.last(&topics.sensor_availability(SensorId::Front)),
        Some("offline".to_string())
    );
    assert_eq!(bench.leds.shown(SensorId::Front), Rgb::BLUE.scaled(20));

    assert!(wait_until(WAIT, || bench.classifier.calls() >= 6));
    assert!(bench.controller.metrics().obstacle_detections >= 1);

    bench.controller.on_door_command(DoorCommand::Close)?;
    assert_eq!(bench.controller.process()?, ProcessState::Idle);
    assert_eq!(bench.last(&topics.obstacle), Some("IDLE".to_string()));
    Ok(())
}

#[test]
fn closing_the_door_during_blink_stops_everything() -> Result<(), AppError> {
    let timing = Timing {
        blink_duration: Duration::from_millis(300),
        ..fast_timing()
    };
    let bench = Bench::with_timing(50.0, MockVote::Obstacle, timing);
    open_door(&bench)?;
    assert!(wait_until(WAIT, || bench.controller.is_blinking().unwrap_or(false)));

    bench.controller.on_door_command(DoorCommand::Close)?;
    bench.controller.tick()?;

    assert!(!bench.controller.is_blinking()?);
    assert!(bench.leds.is_dark());
    assert!(bench.leds.count(LedEvent::Clear) >= 1);
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(bench.classifier.calls(), 3);
    Ok(())
}

#[test]
fn reopening_during_blink_ignores_the_earlier_blink() -> Result<(), AppError> {
    let timing = Timing {
        stabilization: Duration::from_millis(350),
        blink_duration: Duration::from_millis(600),
        blink_poll: Duration::from_millis(300),
        ..fast_timing()
    };
    let bench = Bench::with_timing(50.0, MockVote::Obstacle, timing);
    open_door(&bench)?;
    assert!(wait_until(WAIT, || bench.controller.is_blinking().unwrap_or(false)));
    assert_eq!(bench.classifier.calls(), 3);

    bench.controller.on_door_command(DoorCommand::Close)?;
    bench.controller.on_door_command(DoorCommand::Open)?;
    assert!(wait_until(WAIT, || {
        bench.classifier.calls() == 6 && bench.controller.is_blinking().unwrap_or(false)
    }));

    // Past the first blink's expiry, still inside the second one.
    std::thread::sleep(Duration::from_millis(350));
    assert_eq!(bench.classifier.calls(), 6);
    assert!(bench.controller.is_blinking()?);
    assert_eq!(bench.controller.process()?, ProcessState::Parking);
    Ok(())
}

#[test]
fn settings_update_repaints_the_leds_immediately() -> Result<(), AppError> {
    let bench = Bench::new(50.0, MockVote::Clear);
    open_door(&bench)?;
    assert_eq!(bench.leds.shown(SensorId::Front), Rgb::GREEN.scaled(20));

    bench
        .controller
        .apply_settings(&SettingsUpdate::parse(r#"{"brightness": 80}"#)?)?;
    assert_eq!(bench.leds.shown(SensorId::Front), Rgb::GREEN.scaled(80));

    bench.controller.apply_settings(&SettingsUpdate::parse(
        r#"{"orange_distance_threshold_left": 60}"#,
    )?)?;
    assert_eq!(bench.leds.shown(SensorId::Left), Rgb::ORANGE.scaled(80));
    assert_eq!(bench.leds.shown(SensorId::Right), Rgb::GREEN.scaled(80));
    Ok(())
}

#[test]
fn settings_update_leaves_dormant_leds_dark() -> Result<(), AppError> {
    let bench = Bench::new(50.0, MockVote::Clear);

    bench
        .controller
        .apply_settings(&SettingsUpdate::parse(r#"{"brightness": 80}"#)?)?;

    assert!(bench.leds.is_dark());
    assert_eq!(bench.front.calls(), 0);
    Ok(())
}

#[test]
fn presence_and_door_edges_publish_enabled_once() -> Result<(), AppError> {
    let bench = Bench::new(50.0, MockVote::Clear);
    let topics = bench.topics();

    bench.controller.on_door_state(true)?;
    bench.controller.on_user_presence(true)?;
    bench.controller.on_user_presence(true)?;
    bench.controller.on_door_state(false)?;
    bench.controller.on_door_state(false)?;

    assert_eq!(
        bench.publisher.on_topic(&topics.system_enabled),
        vec!["ON".to_string(), "OFF".to_string()]
    );
    Ok(())
}

#[test]
fn control_loop_stops_on_flag() -> Result<(), AppError> {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    let bench = Bench::new(50.0, MockVote::Clear);
    open_door(&bench)?;
    let stop = Arc::new(AtomicBool::new(false));

    let handle = bench.controller.spawn_loop(Arc::clone(&stop), |err| {
        panic!("control loop failed: {err}");
    });
    assert!(wait_until(WAIT, || bench.controller.metrics().cycles >= 3));
    stop.store(true, Ordering::Relaxed);

    assert!(handle.join().is_ok());
    Ok(())
}

#[test]
fn stop_procedure_is_idempotent() -> Result<(), AppError> {
    let bench = Bench::new(2.0, MockVote::Clear);
    let topics = bench.topics();
    open_door(&bench)?;

    bench.controller.stop_procedure()?;
    bench.controller.stop_procedure()?;

    assert_eq!(bench.controller.process()?, ProcessState::Idle);
    let states = bench.publisher.on_topic(&topics.process_state);
    assert_eq!(states, vec!["EXITING".to_string(), "IDLE".to_string()]);
    assert!(bench.controller.system_enabled()?);
    Ok(())
}
