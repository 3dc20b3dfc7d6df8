#![allow(dead_code)]

use garage_parking_assistant::bus::mock::RecordingPublisher;
use garage_parking_assistant::bus::{Telemetry, Topics};
use garage_parking_assistant::controller::{Bay, ControllerParts, ProcessController, Timing};
use garage_parking_assistant::detection::mock::{MockFrameSource, MockVote, ScriptedClassifier};
use garage_parking_assistant::detection::{VoteCoordinator, VoteSettings};
use garage_parking_assistant::led::Indicator;
use garage_parking_assistant::led::mock::{RecordingLeds, RecordingLedsHandle};
use garage_parking_assistant::sensor::mock::{MockSensor, MockSensorHandle};
use garage_parking_assistant::sensor::{RetryPolicy, SensorArray, SensorId};
use garage_parking_assistant::thresholds::Thresholds;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn fast_timing() -> Timing {
    Timing {
        active_interval: Duration::from_millis(5),
        dormant_interval: Duration::from_millis(5),
        stabilization: Duration::ZERO,
        blink_duration: Duration::from_millis(50),
        blink_poll: Duration::from_millis(5),
        blink_toggle: Duration::ZERO,
        restore_settle: Duration::ZERO,
        close_dwell: Duration::from_millis(30),
        metrics_interval: Duration::from_secs(60),
    }
}

/// A controller wired to mock hardware, with handles to steer and inspect it.
pub struct Bench {
    pub controller: ProcessController,
    pub publisher: Arc<RecordingPublisher>,
    pub leds: RecordingLedsHandle,
    pub front: MockSensorHandle,
    pub left: MockSensorHandle,
    pub right: MockSensorHandle,
    pub frames: Arc<MockFrameSource>,
    pub classifier: Arc<ScriptedClassifier>,
}

impl Bench {
    pub fn new(distance: f64, vote: MockVote) -> Self {
        Self::with_timing(distance, vote, fast_timing())
    }

    pub fn with_timing(distance: f64, vote: MockVote, timing: Timing) -> Self {
        let policy = RetryPolicy {
            attempts: 1,
            retry_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
        };
        let front = MockSensor::fixed(distance);
        let left = MockSensor::fixed(distance);
        let right = MockSensor::fixed(distance);
        let handles = (front.handle(), left.handle(), right.handle());
        let sensors = SensorArray::new(policy)
            .with_sensor(SensorId::Front, Box::new(front))
            .with_sensor(SensorId::Left, Box::new(left))
            .with_sensor(SensorId::Right, Box::new(right));

        let leds = RecordingLeds::new();
        let led_handle = leds.handle();
        let frames = Arc::new(MockFrameSource::blank());
        let classifier = Arc::new(ScriptedClassifier::always(vote));
        let publisher = Arc::new(RecordingPublisher::new());

        let controller = ProcessController::new(ControllerParts {
            bay: Bay::new(sensors, Indicator::new(Box::new(leds))),
            detection: VoteCoordinator::new(
                frames.clone(),
                classifier.clone(),
                VoteSettings {
                    frames: 3,
                    stagger: Duration::ZERO,
                },
            ),
            telemetry: Telemetry::new(publisher.clone(), Topics::default()),
            thresholds: Thresholds::default(),
            timing,
            settings_enabled: true,
        });

        Self {
            controller,
            publisher,
            leds: led_handle,
            front: handles.0,
            left: handles.1,
            right: handles.2,
            frames,
            classifier,
        }
    }

    pub fn topics(&self) -> Topics {
        Topics::default()
    }

    pub fn last(&self, topic: &str) -> Option<String> {
        self.publisher.last_payload(topic)
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
