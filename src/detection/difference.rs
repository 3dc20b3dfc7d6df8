//! Background-difference obstacle classifier.

use crate::detection::{DetectionError, ObstacleClassifier};
use image::{GrayImage, Luma, RgbImage};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    morphology::{dilate, erode},
    region_labelling::{Connectivity, connected_components},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// 5x5 rectangular structuring element.
const KERNEL_RADIUS: u8 = 2;
const OPEN_ITERATIONS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Roi {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Roi {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    fn crop(&self, frame: &RgbImage) -> Result<RgbImage, DetectionError> {
        let fits = self.right <= frame.width() && self.bottom <= frame.height();
        if !fits || self.width() == 0 || self.height() == 0 {
            return Err(DetectionError::FrameTooSmall {
                width: frame.width(),
                height: frame.height(),
            });
        }
        let view = image::imageops::crop_imm(frame, self.left, self.top, self.width(), self.height());
        Ok(view.to_image())
    }
}

impl Default for Roi {
    fn default() -> Self {
        Self {
            left: 110,
            top: 60,
            right: 550,
            bottom: 470,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifferenceSettings {
    pub roi: Roi,
    pub diff_threshold: u8,
    pub min_area: u32,
}

impl Default for DifferenceSettings {
    fn default() -> Self {
        Self {
            roi: Roi::default(),
            diff_threshold: 50,
            min_area: 1500,
        }
    }
}

pub struct DifferenceClassifier {
    background: Option<RgbImage>,
    settings: DifferenceSettings,
}

impl DifferenceClassifier {
    pub fn new(background: &RgbImage, settings: DifferenceSettings) -> Result<Self, DetectionError> {
        let background = settings.roi.crop(background).map_err(|err| {
            DetectionError::Background(err.to_string())
        })?;
        Ok(Self {
            background: Some(background),
            settings,
        })
    }

    /// A classifier that never reports an obstacle.
    pub fn disabled(settings: DifferenceSettings) -> Self {
        Self {
            background: None,
            settings,
        }
    }

    /// Load the reference frame; degrade to a disabled classifier when it is unusable.
    pub fn from_path(path: &Path, settings: DifferenceSettings) -> Self {
        let loaded = image::open(path)
            .map_err(|err| DetectionError::Background(format!("{}: {err}", path.display())))
            .and_then(|frame| Self::new(&frame.to_rgb8(), settings));
        match loaded {
            Ok(classifier) => {
                info!(path = %path.display(), "Background frame loaded");
                classifier
            }
            Err(err) => {
                warn!(error = %err, "Obstacle detection disabled, capture a background frame first");
                Self::disabled(settings)
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.background.is_some()
    }
}

impl ObstacleClassifier for DifferenceClassifier {
    fn classify(&self, frame: &RgbImage) -> Result<bool, DetectionError> {
        let Some(background) = &self.background else {
            return Ok(false);
        };
        let roi = self.settings.roi.crop(frame)?;
        let mask = threshold(&difference_luma(&roi, background), self.settings.diff_threshold);
        let area = largest_component_area(&clean_mask(&mask));
        let detected = area > self.settings.min_area;
        debug!(area, min_area = self.settings.min_area, detected, "Frame classified");
        Ok(detected)
    }
}

/// Per-channel absolute difference converted to luma.
fn difference_luma(frame: &RgbImage, background: &RgbImage) -> GrayImage {
    let mut out = GrayImage::new(frame.width(), frame.height());
    for (x, y, pixel) in frame.enumerate_pixels() {
        let Some(reference) = background.get_pixel_checked(x, y) else {
            continue;
        };
        let diff = |channel: usize| f32::from(pixel[channel].abs_diff(reference[channel]));
        let luma = 0.299 * diff(0) + 0.587 * diff(1) + 0.114 * diff(2);
        out.put_pixel(x, y, Luma([luma.round().min(255.0) as u8]));
    }
    out
}

/// Opening (twice) then one dilation with the 5x5 kernel.
fn clean_mask(mask: &GrayImage) -> GrayImage {
    let radius = KERNEL_RADIUS * OPEN_ITERATIONS;
    let opened = dilate(&erode(mask, Norm::LInf, radius), Norm::LInf, radius);
    dilate(&opened, Norm::LInf, KERNEL_RADIUS)
}

fn largest_component_area(mask: &GrayImage) -> u32 {
    let components = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut areas: HashMap<u32, u32> = HashMap::new();
    for pixel in components.pixels() {
        if pixel[0] > 0 {
            *areas.entry(pixel[0]).or_insert(0) += 1;
        }
    }
    areas.values().max().copied().unwrap_or(0)
}
