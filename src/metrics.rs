use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub obstacle_detections: u64,
    pub close_commands: u64,
}

/// Runtime counters, reported to the log at a fixed interval.
#[derive(Debug)]
pub struct Metrics {
    cycles: AtomicU64,
    obstacle_detections: AtomicU64,
    close_commands: AtomicU64,
    report_interval: Duration,
    last_report: Mutex<Instant>,
}

impl Metrics {
    pub fn new(report_interval: Duration) -> Self {
        Self {
            cycles: AtomicU64::new(0),
            obstacle_detections: AtomicU64::new(0),
            close_commands: AtomicU64::new(0),
            report_interval,
            last_report: Mutex::new(Instant::now()),
        }
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_obstacle(&self) {
        self.obstacle_detections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close(&self) {
        self.close_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            obstacle_detections: self.obstacle_detections.load(Ordering::Relaxed),
            close_commands: self.close_commands.load(Ordering::Relaxed),
        }
    }

    /// Log the counters when the report interval has passed. Returns whether it logged.
    pub fn log_if_due(&self, now: Instant) -> bool {
        let Ok(mut last) = self.last_report.lock() else {
            return false;
        };
        if now.saturating_duration_since(*last) < self.report_interval {
            return false;
        }
        *last = now;
        let snapshot = self.snapshot();
        info!(
            cycles = snapshot.cycles,
            obstacle_detections = snapshot.obstacle_detections,
            close_commands = snapshot.close_commands,
            "Metrics report"
        );
        true
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL)
    }
}
