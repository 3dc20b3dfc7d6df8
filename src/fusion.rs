//! Distance fusion: zone colours per sensor and the "vehicle present" judgment.

use crate::sensor::SensorId;
use crate::state::DistanceSnapshot;
use crate::thresholds::{SensorDistances, Thresholds};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const OFF: Rgb = Rgb(0, 0, 0);
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const ORANGE: Rgb = Rgb(255, 165, 0);
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const BLUE: Rgb = Rgb(0, 0, 255);

    /// Scale each channel by `brightness / 255`.
    pub fn scaled(self, brightness: u8) -> Rgb {
        let scale = |channel: u8| ((u16::from(channel) * u16::from(brightness)) / 255) as u8;
        Rgb(scale(self.0), scale(self.1), scale(self.2))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Red,
    Orange,
    Green,
}

impl Zone {
    pub fn color(self) -> Rgb {
        match self {
            Zone::Red => Rgb::RED,
            Zone::Orange => Rgb::ORANGE,
            Zone::Green => Rgb::GREEN,
        }
    }
}

pub fn classify(distance: f64, red: f64, orange: f64) -> Zone {
    if distance <= red {
        Zone::Red
    } else if distance <= orange {
        Zone::Orange
    } else {
        Zone::Green
    }
}

/// Zone per sensor; `None` for unavailable sensors, whose indicator stays off.
pub fn zones(snapshot: &DistanceSnapshot, thresholds: &Thresholds) -> [(SensorId, Option<Zone>); 3] {
    SensorId::ALL.map(|sensor| {
        let zone = snapshot
            .get(sensor)
            .map(|distance| classify(distance, thresholds.red(sensor), thresholds.orange(sensor)));
        (sensor, zone)
    })
}

/// True only when every sensor reports a distance within its orange threshold.
/// Any unavailable or out-of-range reading means no vehicle is confirmed.
pub fn vehicle_present(snapshot: &DistanceSnapshot, orange: &SensorDistances) -> bool {
    for sensor in SensorId::ALL {
        let Some(distance) = snapshot.get(sensor) else {
            debug!(sensor = %sensor, "Reading unavailable, vehicle not confirmed");
            return false;
        };
        let limit = orange.get(sensor);
        if distance > limit {
            debug!(sensor = %sensor, distance_cm = distance, limit_cm = limit, "Sensor reads clear");
            return false;
        }
    }
    info!("All sensors report a close object");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orange() -> SensorDistances {
        SensorDistances::uniform(10.0)
    }

    #[test]
    fn classify_uses_inclusive_bounds() {
        assert_eq!(classify(3.0, 3.0, 10.0), Zone::Red);
        assert_eq!(classify(3.1, 3.0, 10.0), Zone::Orange);
        assert_eq!(classify(10.0, 3.0, 10.0), Zone::Orange);
        assert_eq!(classify(10.5, 3.0, 10.0), Zone::Green);
    }

    #[test]
    fn unavailable_sensor_has_no_zone() {
        let snapshot = DistanceSnapshot::new(Some(2.0), None, Some(50.0));

        let zones = zones(&snapshot, &Thresholds::default());

        assert_eq!(zones[0], (SensorId::Front, Some(Zone::Red)));
        assert_eq!(zones[1], (SensorId::Left, None));
        assert_eq!(zones[2], (SensorId::Right, Some(Zone::Green)));
    }

    #[test]
    fn vehicle_present_when_all_within_orange() {
        let snapshot = DistanceSnapshot::new(Some(2.0), Some(2.0), Some(10.0));
        assert!(vehicle_present(&snapshot, &orange()));
    }

    #[test]
    fn vehicle_absent_when_any_sensor_missing() {
        for sensor in SensorId::ALL {
            let mut snapshot = DistanceSnapshot::new(Some(2.0), Some(2.0), Some(2.0));
            snapshot.set(sensor, None);
            assert!(!vehicle_present(&snapshot, &orange()), "{sensor} missing");
        }
    }

    #[test]
    fn worse_readings_never_create_presence() {
        let base = DistanceSnapshot::new(Some(50.0), Some(50.0), Some(50.0));
        assert!(!vehicle_present(&base, &orange()));

        for sensor in SensorId::ALL {
            let mut near = DistanceSnapshot::new(Some(5.0), Some(5.0), Some(5.0));
            assert!(vehicle_present(&near, &orange()));
            near.set(sensor, Some(10.01));
            assert!(!vehicle_present(&near, &orange()), "{sensor} over threshold");
        }
    }

    #[test]
    fn brightness_scales_channels() {
        assert_eq!(Rgb::ORANGE.scaled(255), Rgb::ORANGE);
        assert_eq!(Rgb::ORANGE.scaled(0), Rgb::OFF);
        assert_eq!(Rgb::RED.scaled(20), Rgb(20, 0, 0));
    }
}
