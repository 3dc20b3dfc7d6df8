//! The parking process state machine.
//!
//! Locks are always taken in the order state, detection guard, bay, thresholds.
//! The bay lock covers the sensors, the last snapshot and the LED strip, so every
//! LED write happens under it.

use crate::blink::{self, BlinkSession, WatchOutcome};
use crate::bus::Telemetry;
use crate::closure::{ClosureDecision, CloseDebounce};
use crate::detection::VoteCoordinator;
use crate::error::AppError;
use crate::fusion;
use crate::led::Indicator;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::sensor::{SensorArray, SensorId};
use crate::state::{DistanceSnapshot, DoorCommand, ObstacleState, ProcessState};
use crate::thresholds::{SettingsUpdate, ThresholdStore, Thresholds};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Tick period while enabled.
    pub active_interval: Duration,
    /// Tick period while disabled.
    pub dormant_interval: Duration,
    /// Pause between the first measurement and the vehicle-present check.
    pub stabilization: Duration,
    pub blink_duration: Duration,
    pub blink_poll: Duration,
    pub blink_toggle: Duration,
    /// Pause after restoring the distance LEDs before detecting again.
    pub restore_settle: Duration,
    pub close_dwell: Duration,
    pub metrics_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_millis(500),
            dormant_interval: Duration::from_secs(5),
            stabilization: Duration::from_secs(1),
            blink_duration: blink::DEFAULT_BLINK_DURATION,
            blink_poll: blink::DEFAULT_POLL_INTERVAL,
            blink_toggle: blink::DEFAULT_TOGGLE_PERIOD,
            restore_settle: Duration::from_millis(500),
            close_dwell: crate::closure::DEFAULT_CLOSE_DWELL,
            metrics_interval: crate::metrics::DEFAULT_REPORT_INTERVAL,
        }
    }
}

/// Everything guarded by the state lock.
#[derive(Debug)]
struct ControlState {
    process: ProcessState,
    obstacle: ObstacleState,
    user_is_home: bool,
    garage_door_open: bool,
    settings_enabled: bool,
    system_enabled: bool,
    close_command_sent: bool,
    debounce: CloseDebounce,
    blink: BlinkSession,
    /// Bumped on every procedure start. Vote callbacks and blink watchers carry
    /// the value they were started under and go quiet once it moves on.
    session: u64,
}

/// Hardware and data guarded by the distances lock.
pub struct Bay {
    sensors: SensorArray,
    snapshot: DistanceSnapshot,
    indicator: Indicator,
}

impl Bay {
    pub fn new(sensors: SensorArray, indicator: Indicator) -> Self {
        Self {
            sensors,
            snapshot: DistanceSnapshot::empty(),
            indicator,
        }
    }
}

pub struct ControllerParts {
    pub bay: Bay,
    pub detection: VoteCoordinator,
    pub telemetry: Telemetry,
    pub thresholds: Thresholds,
    pub timing: Timing,
    pub settings_enabled: bool,
}

struct Shared {
    state: Mutex<ControlState>,
    bay: Mutex<Bay>,
    thresholds: ThresholdStore,
    detection: VoteCoordinator,
    telemetry: Telemetry,
    timing: Timing,
    metrics: Metrics,
}

/// Point-in-time view of the controller for the status API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerStatus {
    pub process: ProcessState,
    pub obstacle: ObstacleState,
    pub system_enabled: bool,
    pub settings_enabled: bool,
    pub user_is_home: bool,
    pub garage_door_open: bool,
    pub blinking: bool,
    pub close_command_sent: bool,
    pub distances: DistanceSnapshot,
    pub thresholds: Thresholds,
    pub metrics: MetricsSnapshot,
}

#[derive(Clone)]
pub struct ProcessController {
    shared: Arc<Shared>,
}

impl ProcessController {
    pub fn new(parts: ControllerParts) -> Self {
        let ControllerParts {
            bay,
            detection,
            telemetry,
            thresholds,
            timing,
            settings_enabled,
        } = parts;
        let state = ControlState {
            process: ProcessState::Idle,
            obstacle: ObstacleState::Idle,
            user_is_home: false,
            garage_door_open: false,
            settings_enabled,
            system_enabled: false,
            close_command_sent: false,
            debounce: CloseDebounce::new(timing.close_dwell),
            blink: BlinkSession::new(timing.blink_toggle),
            session: 0,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                bay: Mutex::new(bay),
                thresholds: ThresholdStore::new(thresholds),
                detection,
                telemetry,
                timing,
                metrics: Metrics::new(timing.metrics_interval),
            }),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ControlState>, AppError> {
        self.shared.state.lock().map_err(|_| AppError::StateLock)
    }

    fn lock_bay(&self) -> Result<MutexGuard<'_, Bay>, AppError> {
        self.shared.bay.lock().map_err(|_| AppError::StateLock)
    }

    pub fn process(&self) -> Result<ProcessState, AppError> {
        Ok(self.lock_state()?.process)
    }

    pub fn system_enabled(&self) -> Result<bool, AppError> {
        Ok(self.lock_state()?.system_enabled)
    }

    pub fn is_blinking(&self) -> Result<bool, AppError> {
        Ok(self.lock_state()?.blink.is_active())
    }

    pub fn distances(&self) -> Result<DistanceSnapshot, AppError> {
        Ok(self.lock_bay()?.snapshot)
    }

    pub fn thresholds(&self) -> Result<Thresholds, AppError> {
        self.shared.thresholds.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn status(&self) -> Result<ControllerStatus, AppError> {
        let state = self.lock_state()?;
        let distances = self.lock_bay()?.snapshot;
        Ok(ControllerStatus {
            process: state.process,
            obstacle: state.obstacle,
            system_enabled: state.system_enabled,
            settings_enabled: state.settings_enabled,
            user_is_home: state.user_is_home,
            garage_door_open: state.garage_door_open,
            blinking: state.blink.is_active(),
            close_command_sent: state.close_command_sent,
            distances,
            thresholds: self.shared.thresholds.snapshot()?,
            metrics: self.shared.metrics.snapshot(),
        })
    }

    pub fn on_door_command(&self, command: DoorCommand) -> Result<(), AppError> {
        let mut state = self.lock_state()?;
        let telemetry = &self.shared.telemetry;
        match command {
            DoorCommand::Open => {
                if !state.user_is_home {
                    warn!("Door open requested while user is away, ignoring");
                    telemetry.unauthorized_access();
                    return Ok(());
                }
                state.garage_door_open = true;
                telemetry.door_state(true);
                self.refresh_enabled(&mut state);
                if state.system_enabled {
                    self.start_locked(&mut state)
                } else {
                    info!("System disabled, procedure not started");
                    Ok(())
                }
            }
            DoorCommand::Close => {
                state.garage_door_open = false;
                telemetry.door_state(false);
                self.refresh_enabled(&mut state);
                self.stop_locked(&mut state);
                Ok(())
            }
        }
    }

    pub fn on_user_presence(&self, home: bool) -> Result<(), AppError> {
        let mut state = self.lock_state()?;
        info!(home, "User presence updated");
        state.user_is_home = home;
        self.refresh_enabled(&mut state);
        Ok(())
    }

    pub fn on_door_state(&self, open: bool) -> Result<(), AppError> {
        let mut state = self.lock_state()?;
        info!(open, "Garage door state updated");
        state.garage_door_open = open;
        self.refresh_enabled(&mut state);
        Ok(())
    }

    /// Validate and apply a settings message. A rejected update changes nothing.
    pub fn apply_settings(&self, update: &SettingsUpdate) -> Result<(), AppError> {
        let mut state = self.lock_state()?;
        self.shared.thresholds.apply(update)?;
        if let Some(enabled) = update.enabled {
            info!(enabled, "Master switch updated");
            state.settings_enabled = enabled;
            self.refresh_enabled(&mut state);
        }
        if state.system_enabled && !state.blink.is_active() {
            self.repaint_zones()?;
        }
        Ok(())
    }

    /// Redraw the last snapshot with the current thresholds and brightness.
    fn repaint_zones(&self) -> Result<(), AppError> {
        let mut bay = self.lock_bay()?;
        let snapshot = bay.snapshot;
        let thresholds = self.shared.thresholds.snapshot()?;
        if let Err(err) = bay.indicator.show_zones(&snapshot, &thresholds) {
            warn!(error = %err, "LED repaint failed");
        }
        Ok(())
    }

    fn refresh_enabled(&self, state: &mut ControlState) {
        let enabled = state.settings_enabled && state.user_is_home && state.garage_door_open;
        debug!(
            settings_enabled = state.settings_enabled,
            user_is_home = state.user_is_home,
            garage_door_open = state.garage_door_open,
            enabled,
            "System enabled recomputed"
        );
        if enabled != state.system_enabled {
            state.system_enabled = enabled;
            self.shared.telemetry.system_enabled(enabled);
        }
    }

    pub fn start_procedure(&self) -> Result<(), AppError> {
        let mut state = self.lock_state()?;
        self.start_locked(&mut state)
    }

    pub fn stop_procedure(&self) -> Result<(), AppError> {
        let mut state = self.lock_state()?;
        self.stop_locked(&mut state);
        Ok(())
    }

    fn start_locked(&self, state: &mut ControlState) -> Result<(), AppError> {
        if !state.process.is_idle() {
            debug!(process = %state.process, "Procedure already active");
            return Ok(());
        }
        state.session = state.session.wrapping_add(1);
        info!(session = state.session, "Garage door open, starting procedure");
        let snapshot = self.measure_and_drive()?;
        std::thread::sleep(self.shared.timing.stabilization);

        let orange = self.shared.thresholds.snapshot()?.orange_distances();
        state.close_command_sent = false;
        state.debounce.clear();
        if fusion::vehicle_present(&snapshot, &orange) {
            state.process = ProcessState::Exiting;
            info!("Vehicle in the bay, exiting");
            self.shared.telemetry.process_state(ProcessState::Exiting);
        } else {
            state.process = ProcessState::Parking;
            info!("Bay empty, parking");
            self.shared.telemetry.process_state(ProcessState::Parking);
            self.start_detection(state.session);
        }
        Ok(())
    }

    fn stop_locked(&self, state: &mut ControlState) {
        if state.process.is_idle() {
            debug!("Procedure not active");
            return;
        }
        info!(process = %state.process, "Stopping procedure");
        state.process = ProcessState::Idle;
        state.obstacle = ObstacleState::Idle;
        self.shared.telemetry.process_state(ProcessState::Idle);
        self.shared.telemetry.obstacle(ObstacleState::Idle);
        self.shared.detection.stop();
        state.debounce.clear();
        state.close_command_sent = false;
        state.blink.stop();
    }

    /// Caller holds the state lock.
    fn start_detection(&self, session: u64) {
        let controller = self.clone();
        self.shared.detection.start(Box::new(move |detected| {
            controller.on_obstacle_vote(session, detected)
        }));
    }

    fn measure_and_drive(&self) -> Result<DistanceSnapshot, AppError> {
        let mut bay = self.lock_bay()?;
        let snapshot = bay.sensors.measure_all();
        bay.snapshot = snapshot;
        let thresholds = self.shared.thresholds.snapshot()?;
        if let Err(err) = bay.indicator.show_zones(&snapshot, &thresholds) {
            warn!(error = %err, "LED update failed");
        }
        Ok(snapshot)
    }

    /// One control cycle. Returns how long to sleep before the next one.
    pub fn tick(&self) -> Result<Duration, AppError> {
        self.shared.metrics.record_cycle();
        self.shared.metrics.log_if_due(Instant::now());

        let timing = self.shared.timing;
        let telemetry = &self.shared.telemetry;
        let mut state = self.lock_state()?;

        if !state.system_enabled {
            self.stop_locked(&mut state);
            let mut bay = self.lock_bay()?;
            if let Err(err) = bay.indicator.clear() {
                warn!(error = %err, "LED clear failed");
            }
            bay.snapshot = DistanceSnapshot::empty();
            telemetry.distances(&bay.snapshot);
            debug!("System disabled, LEDs off");
            return Ok(timing.dormant_interval);
        }

        if state.blink.is_active() {
            telemetry.sensors_offline();
            if let Some(phase) = state.blink.tick(Instant::now()) {
                let brightness = self.shared.thresholds.snapshot()?.brightness();
                let mut bay = self.lock_bay()?;
                if let Err(err) = bay.indicator.show_blink(phase, brightness) {
                    warn!(error = %err, "LED blink update failed");
                }
            }
            return Ok(timing.active_interval);
        }

        let snapshot = self.measure_and_drive()?;
        telemetry.distances(&snapshot);
        telemetry.process_state(state.process);

        let red_front = self.shared.thresholds.snapshot()?.red(SensorId::Front);
        let process = state.process;
        let already_sent = state.close_command_sent;
        let decision = state.debounce.evaluate(
            snapshot.get(SensorId::Front),
            Some(red_front),
            process,
            already_sent,
            Instant::now(),
        );
        if decision == ClosureDecision::Close {
            telemetry.close_door();
            self.shared.metrics.record_close();
            state.close_command_sent = true;
            state.system_enabled = false;
            telemetry.system_enabled(false);
        }
        Ok(timing.active_interval)
    }

    /// Run `tick` on a dedicated thread until `stop` is set or a tick fails.
    pub fn spawn_loop<F>(&self, stop: Arc<AtomicBool>, on_fatal: F) -> JoinHandle<()>
    where
        F: FnOnce(AppError) + Send + 'static,
    {
        let controller = self.clone();
        std::thread::spawn(move || {
            info!("Control loop started");
            while !stop.load(Ordering::Relaxed) {
                match controller.tick() {
                    Ok(interval) => sleep_unless_stopped(interval, &stop),
                    Err(err) => {
                        error!(error = %err, "Control loop failed");
                        on_fatal(err);
                        return;
                    }
                }
            }
            info!("Control loop stopped");
        })
    }

    fn on_obstacle_vote(&self, session: u64, detected: bool) {
        if let Err(err) = self.handle_obstacle_vote(session, detected) {
            error!(error = %err, "Failed to handle obstacle result");
        }
    }

    fn handle_obstacle_vote(&self, session: u64, detected: bool) -> Result<(), AppError> {
        let mut state = self.lock_state()?;
        if state.session != session || state.process != ProcessState::Parking {
            debug!(detected, session, process = %state.process, "Obstacle result discarded");
            return Ok(());
        }
        if !detected {
            state.obstacle = ObstacleState::Clear;
            self.shared.telemetry.obstacle(ObstacleState::Clear);
            return Ok(());
        }

        state.obstacle = ObstacleState::Detected;
        self.shared.telemetry.obstacle(ObstacleState::Detected);
        self.shared.metrics.record_obstacle();
        if state.blink.start(Instant::now()) {
            let controller = self.clone();
            std::thread::spawn(move || controller.watch_blink(session));
        }
        Ok(())
    }

    /// True while the procedure started as `session` is still running.
    fn procedure_active(&self, session: u64) -> bool {
        self.lock_state()
            .map(|state| state.session == session && !state.process.is_idle())
            .unwrap_or(false)
    }

    fn watch_blink(&self, session: u64) {
        let timing = self.shared.timing;
        let outcome = blink::watch_duration(timing.blink_duration, timing.blink_poll, || {
            self.procedure_active(session)
        });
        if outcome == WatchOutcome::Aborted {
            debug!(session, "Procedure ended during blinking");
            return;
        }
        if let Err(err) = self.finish_blink(session) {
            error!(error = %err, "Failed to end blinking");
        }
    }

    fn finish_blink(&self, session: u64) -> Result<(), AppError> {
        {
            let mut state = self.lock_state()?;
            if state.session != session {
                debug!(session, "Blink belongs to an earlier procedure");
                return Ok(());
            }
            state.blink.stop();
            self.repaint_zones()?;
        }
        std::thread::sleep(self.shared.timing.restore_settle);

        let state = self.lock_state()?;
        if state.session == session
            && state.process == ProcessState::Parking
            && state.system_enabled
        {
            info!("Blinking over, checking for obstacles again");
            self.start_detection(session);
        }
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), AppError> {
        let mut state = self.lock_state()?;
        self.stop_locked(&mut state);
        state.blink.stop();
        let mut bay = self.lock_bay()?;
        if let Err(err) = bay.indicator.clear() {
            warn!(error = %err, "LED clear failed");
        }
        bay.snapshot = DistanceSnapshot::empty();
        self.shared.telemetry.sensors_offline();
        info!("Controller shut down");
        Ok(())
    }
}

fn sleep_unless_stopped(interval: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + interval;
    loop {
        let now = Instant::now();
        if now >= deadline || stop.load(Ordering::Relaxed) {
            return;
        }
        std::thread::sleep(STOP_POLL.min(deadline - now));
    }
}
