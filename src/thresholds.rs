//! Per-sensor distance thresholds and LED brightness, updated from settings messages.

use crate::error::AppError;
use crate::sensor::SensorId;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_RED_CM: f64 = 3.0;
pub const DEFAULT_ORANGE_CM: f64 = 10.0;
pub const DEFAULT_BRIGHTNESS: u8 = 20;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("malformed settings payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{color} threshold for {sensor} must be a finite, non-negative distance, got {value}")]
    InvalidDistance {
        color: &'static str,
        sensor: SensorId,
        value: f64,
    },
    #[error("red threshold {red} for {sensor} exceeds orange threshold {orange}")]
    RedAboveOrange {
        sensor: SensorId,
        red: f64,
        orange: f64,
    },
    #[error("threshold store lock poisoned")]
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorDistances {
    pub front: f64,
    pub left: f64,
    pub right: f64,
}

impl SensorDistances {
    pub fn uniform(value: f64) -> Self {
        Self {
            front: value,
            left: value,
            right: value,
        }
    }

    pub fn get(&self, sensor: SensorId) -> f64 {
        match sensor {
            SensorId::Front => self.front,
            SensorId::Left => self.left,
            SensorId::Right => self.right,
        }
    }

    fn set(&mut self, sensor: SensorId, value: f64) {
        match sensor {
            SensorId::Front => self.front = value,
            SensorId::Left => self.left = value,
            SensorId::Right => self.right = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    red: SensorDistances,
    orange: SensorDistances,
    brightness: u8,
}

impl Thresholds {
    pub fn new(
        red: SensorDistances,
        orange: SensorDistances,
        brightness: u8,
    ) -> Result<Self, SettingsError> {
        let thresholds = Self {
            red,
            orange,
            brightness,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn red(&self, sensor: SensorId) -> f64 {
        self.red.get(sensor)
    }

    pub fn orange(&self, sensor: SensorId) -> f64 {
        self.orange.get(sensor)
    }

    pub fn red_distances(&self) -> SensorDistances {
        self.red
    }

    pub fn orange_distances(&self) -> SensorDistances {
        self.orange
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    fn validate(&self) -> Result<(), SettingsError> {
        for sensor in SensorId::ALL {
            let red = self.red(sensor);
            let orange = self.orange(sensor);
            for (color, value) in [("red", red), ("orange", orange)] {
                if !value.is_finite() || value < 0.0 {
                    return Err(SettingsError::InvalidDistance {
                        color,
                        sensor,
                        value,
                    });
                }
            }
            if red > orange {
                return Err(SettingsError::RedAboveOrange {
                    sensor,
                    red,
                    orange,
                });
            }
        }
        Ok(())
    }

    /// Returns a copy with `update` applied, or an error if the result would be invalid.
    pub fn with_update(&self, update: &SettingsUpdate) -> Result<Self, SettingsError> {
        let mut next = *self;
        for sensor in SensorId::ALL {
            if let Some(value) = update.red(sensor) {
                next.red.set(sensor, value);
            }
            if let Some(value) = update.orange(sensor) {
                next.orange.set(sensor, value);
            }
        }
        if let Some(brightness) = update.brightness {
            next.brightness = brightness;
        }
        next.validate()?;
        Ok(next)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            red: SensorDistances::uniform(DEFAULT_RED_CM),
            orange: SensorDistances::uniform(DEFAULT_ORANGE_CM),
            brightness: DEFAULT_BRIGHTNESS,
        }
    }
}

/// Recognized keys of a settings message. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SettingsUpdate {
    pub red_distance_threshold_front: Option<f64>,
    pub red_distance_threshold_left: Option<f64>,
    pub red_distance_threshold_right: Option<f64>,
    pub orange_distance_threshold_front: Option<f64>,
    pub orange_distance_threshold_left: Option<f64>,
    pub orange_distance_threshold_right: Option<f64>,
    pub brightness: Option<u8>,
    pub enabled: Option<bool>,
}

impl SettingsUpdate {
    pub fn parse(payload: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn red(&self, sensor: SensorId) -> Option<f64> {
        match sensor {
            SensorId::Front => self.red_distance_threshold_front,
            SensorId::Left => self.red_distance_threshold_left,
            SensorId::Right => self.red_distance_threshold_right,
        }
    }

    pub fn orange(&self, sensor: SensorId) -> Option<f64> {
        match sensor {
            SensorId::Front => self.orange_distance_threshold_front,
            SensorId::Left => self.orange_distance_threshold_left,
            SensorId::Right => self.orange_distance_threshold_right,
        }
    }

    pub fn touches_thresholds(&self) -> bool {
        SensorId::ALL
            .iter()
            .any(|sensor| self.red(*sensor).is_some() || self.orange(*sensor).is_some())
            || self.brightness.is_some()
    }
}

#[derive(Debug)]
pub struct ThresholdStore {
    inner: RwLock<Thresholds>,
}

impl ThresholdStore {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            inner: RwLock::new(thresholds),
        }
    }

    pub fn snapshot(&self) -> Result<Thresholds, AppError> {
        self.inner
            .read()
            .map(|guard| *guard)
            .map_err(|_| AppError::StateLock)
    }

    /// Apply an update atomically; on error the previous values are kept.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<Thresholds, SettingsError> {
        if !update.touches_thresholds() {
            debug!("Settings update carries no threshold or brightness change");
        }
        let mut guard = self.inner.write().map_err(|_| SettingsError::Store)?;
        let next = guard.with_update(update)?;
        *guard = next;
        info!(
            red = ?next.red,
            orange = ?next.orange,
            brightness = next.brightness,
            "Thresholds updated"
        );
        Ok(next)
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}
