use crate::blink::BlinkPhase;
use crate::fusion::{self, Rgb};
use crate::sensor::SensorId;
use crate::state::DistanceSnapshot;
use crate::thresholds::Thresholds;
use serde::Deserialize;
use thiserror::Error;

pub mod mock;
pub mod ws2812;

pub const DEFAULT_PIXEL_COUNT: usize = 37;
pub const BLINK_COLOR: Rgb = Rgb::BLUE;

#[derive(Debug, Error)]
pub enum LedError {
    #[error("spi write failed: {0}")]
    Spi(String),
    #[error("segment {segment} range {start}..{end} does not fit {pixel_count} pixels")]
    Layout {
        segment: SensorId,
        start: usize,
        end: usize,
        pixel_count: usize,
    },
    #[error("led driver unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SegmentRange {
    pub start: usize,
    pub end: usize,
}

/// Pixel ranges lighting up next to each sensor. Segments are named after the sensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLayout {
    pub pixel_count: usize,
    pub front: SegmentRange,
    pub left: SegmentRange,
    pub right: SegmentRange,
}

impl SegmentLayout {
    pub fn range(&self, segment: SensorId) -> SegmentRange {
        match segment {
            SensorId::Front => self.front,
            SensorId::Left => self.left,
            SensorId::Right => self.right,
        }
    }

    pub fn validate(&self) -> Result<(), LedError> {
        for segment in SensorId::ALL {
            let range = self.range(segment);
            if range.start > range.end || range.end > self.pixel_count {
                return Err(LedError::Layout {
                    segment,
                    start: range.start,
                    end: range.end,
                    pixel_count: self.pixel_count,
                });
            }
        }
        Ok(())
    }
}

impl Default for SegmentLayout {
    fn default() -> Self {
        Self {
            pixel_count: DEFAULT_PIXEL_COUNT,
            left: SegmentRange { start: 0, end: 11 },
            front: SegmentRange { start: 14, end: 22 },
            right: SegmentRange { start: 25, end: 37 },
        }
    }
}

pub trait LedDriver: Send {
    /// Stage a colour for a segment; nothing changes on the strip until `show`.
    fn set_segment(&mut self, segment: SensorId, color: Rgb, brightness: u8) -> Result<(), LedError>;
    fn show(&mut self) -> Result<(), LedError>;
    /// Turn every pixel off immediately.
    fn clear(&mut self) -> Result<(), LedError>;
}

/// The bay indicator: three segments driven from distance zones or a blink frame.
pub struct Indicator {
    driver: Box<dyn LedDriver>,
}

impl Indicator {
    pub fn new(driver: Box<dyn LedDriver>) -> Self {
        Self { driver }
    }

    /// Colour each segment by its sensor's zone; unavailable sensors stay dark.
    pub fn show_zones(
        &mut self,
        snapshot: &DistanceSnapshot,
        thresholds: &Thresholds,
    ) -> Result<(), LedError> {
        for (segment, zone) in fusion::zones(snapshot, thresholds) {
            match zone {
                Some(zone) => {
                    self.driver
                        .set_segment(segment, zone.color(), thresholds.brightness())?
                }
                None => self.driver.set_segment(segment, Rgb::OFF, 0)?,
            }
        }
        self.driver.show()
    }

    pub fn show_blink(&mut self, phase: BlinkPhase, brightness: u8) -> Result<(), LedError> {
        match phase {
            BlinkPhase::On => self.fill(BLINK_COLOR, brightness),
            BlinkPhase::Off => self.clear(),
        }
    }

    pub fn fill(&mut self, color: Rgb, brightness: u8) -> Result<(), LedError> {
        for segment in SensorId::ALL {
            self.driver.set_segment(segment, color, brightness)?;
        }
        self.driver.show()
    }

    pub fn clear(&mut self) -> Result<(), LedError> {
        self.driver.clear()
    }
}
