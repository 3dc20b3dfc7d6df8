//! Still-capture camera shared by every detection worker.

use crate::detection::{DetectionError, FrameSource};
use image::RgbImage;
use std::path::Path;
use std::process::Command;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

pub const DEFAULT_CAPTURE_COMMAND: &str = "rpicam-still -n -t 1 --width 640 --height 480 -e jpg -o -";

pub trait CameraBackend: Send {
    /// Acquire and configure the device. Called once, before the first capture.
    fn open(&mut self) -> Result<(), DetectionError>;
    fn capture(&mut self) -> Result<RgbImage, DetectionError>;
}

/// Runs an external still-capture program and decodes the image it writes to stdout.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
}

impl CommandCamera {
    pub fn from_command_line(command: &str) -> Result<Self, DetectionError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| DetectionError::Capture("empty capture command".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CameraBackend for CommandCamera {
    fn open(&mut self) -> Result<(), DetectionError> {
        info!(program = %self.program, "Camera acquired");
        Ok(())
    }

    fn capture(&mut self) -> Result<RgbImage, DetectionError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|err| DetectionError::Capture(format!("{}: {err}", self.program)))?;
        if !output.status.success() {
            return Err(DetectionError::Capture(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        let frame = image::load_from_memory(&output.stdout)
            .map_err(|err| DetectionError::Decode(err.to_string()))?;
        Ok(frame.to_rgb8())
    }
}

struct CameraSlot {
    backend: Box<dyn CameraBackend>,
    opened: bool,
}

/// One camera for the whole process; acquire and every capture run under one mutex.
pub struct SharedCamera {
    slot: Mutex<CameraSlot>,
    rotate_180: bool,
}

impl SharedCamera {
    pub fn new(backend: Box<dyn CameraBackend>, rotate_180: bool) -> Self {
        Self {
            slot: Mutex::new(CameraSlot {
                backend,
                opened: false,
            }),
            rotate_180,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CameraSlot>, DetectionError> {
        self.slot
            .lock()
            .map_err(|_| DetectionError::Capture("camera lock poisoned".to_string()))
    }
}

impl FrameSource for SharedCamera {
    fn capture(&self) -> Result<RgbImage, DetectionError> {
        let mut slot = self.lock()?;
        if !slot.opened {
            slot.backend.open()?;
            slot.opened = true;
        }
        let frame = slot.backend.capture()?;
        drop(slot);
        debug!(width = frame.width(), height = frame.height(), "Frame captured");
        if self.rotate_180 {
            Ok(image::imageops::rotate180(&frame))
        } else {
            Ok(frame)
        }
    }
}

pub fn save_frame(frame: &RgbImage, path: &Path) -> Result<(), DetectionError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|err| DetectionError::Background(format!("{}: {err}", parent.display())))?;
    }
    frame
        .save(path)
        .map_err(|err| DetectionError::Background(format!("{}: {err}", path.display())))?;
    info!(path = %path.display(), "Frame saved");
    Ok(())
}
