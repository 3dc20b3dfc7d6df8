//! Camera-based obstacle detection reduced by a majority vote over several frames.

use image::RgbImage;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod camera;
pub mod difference;
pub mod mock;

pub use camera::{CommandCamera, SharedCamera};
pub use difference::{DifferenceClassifier, DifferenceSettings, Roi};

pub const DEFAULT_FRAMES: usize = 3;
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("frame {width}x{height} does not contain the region of interest")]
    FrameTooSmall { width: u32, height: u32 },
    #[error("background frame unusable: {0}")]
    Background(String),
}

pub trait FrameSource: Send + Sync {
    fn capture(&self) -> Result<RgbImage, DetectionError>;
}

pub trait ObstacleClassifier: Send + Sync {
    /// `true` when the frame shows an obstacle.
    fn classify(&self, frame: &RgbImage) -> Result<bool, DetectionError>;
}

/// Strict majority: more than half of the votes are positive.
pub fn majority_vote(votes: &[bool]) -> bool {
    let positive = votes.iter().filter(|vote| **vote).count();
    let detected = positive * 2 > votes.len();
    debug!(positive, total = votes.len(), detected, "Majority vote");
    detected
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteSettings {
    pub frames: usize,
    pub stagger: Duration,
}

impl Default for VoteSettings {
    fn default() -> Self {
        Self {
            frames: DEFAULT_FRAMES,
            stagger: DEFAULT_STAGGER,
        }
    }
}

#[derive(Debug, Default)]
struct RunToken {
    cancelled: AtomicBool,
    finished: AtomicBool,
}

pub type VoteCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Runs one vote per `start`, reporting the outcome through the supplied callback.
///
/// `start` and `stop` are serialised by a re-entrant guard so a thread already holding
/// it (the controller restarting detection from inside a transition) cannot deadlock.
/// `stop` only marks the run cancelled; the run thread finishes on its own and drops
/// its result.
pub struct VoteCoordinator {
    source: Arc<dyn FrameSource>,
    classifier: Arc<dyn ObstacleClassifier>,
    settings: VoteSettings,
    current: ReentrantMutex<RefCell<Option<Arc<RunToken>>>>,
}

impl VoteCoordinator {
    pub fn new(
        source: Arc<dyn FrameSource>,
        classifier: Arc<dyn ObstacleClassifier>,
        settings: VoteSettings,
    ) -> Self {
        Self {
            source,
            classifier,
            settings,
            current: ReentrantMutex::new(RefCell::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        let current = self.current.lock();
        let running = current
            .borrow()
            .as_ref()
            .is_some_and(|run| !run.finished.load(Ordering::SeqCst));
        running
    }

    /// Launch a vote. Returns `false` (and drops the callback) when one is in flight.
    pub fn start(&self, callback: VoteCallback) -> bool {
        let current = self.current.lock();
        if current
            .borrow()
            .as_ref()
            .is_some_and(|run| !run.finished.load(Ordering::SeqCst))
        {
            debug!("Obstacle detection already running");
            return false;
        }

        let run = Arc::new(RunToken::default());
        *current.borrow_mut() = Some(Arc::clone(&run));

        let source = Arc::clone(&self.source);
        let classifier = Arc::clone(&self.classifier);
        let settings = self.settings;
        std::thread::spawn(move || {
            let votes = collect_votes(&source, &classifier, settings, &run);
            let detected = majority_vote(&votes);
            run.finished.store(true, Ordering::SeqCst);
            if run.cancelled.load(Ordering::SeqCst) {
                debug!(detected, "Detection cancelled, result dropped");
                return;
            }
            callback(detected);
        });
        info!(frames = self.settings.frames, "Obstacle detection started");
        true
    }

    pub fn stop(&self) {
        let current = self.current.lock();
        let taken = current.borrow_mut().take();
        match taken {
            Some(run) if !run.finished.load(Ordering::SeqCst) => {
                run.cancelled.store(true, Ordering::SeqCst);
                info!("Obstacle detection stopped");
            }
            _ => debug!("Obstacle detection not running"),
        }
    }
}

fn collect_votes(
    source: &Arc<dyn FrameSource>,
    classifier: &Arc<dyn ObstacleClassifier>,
    settings: VoteSettings,
    run: &RunToken,
) -> Vec<bool> {
    let mut workers: Vec<JoinHandle<Result<bool, DetectionError>>> =
        Vec::with_capacity(settings.frames);
    for index in 0..settings.frames {
        if run.cancelled.load(Ordering::SeqCst) {
            break;
        }
        if index > 0 {
            std::thread::sleep(settings.stagger);
        }
        let source = Arc::clone(source);
        let classifier = Arc::clone(classifier);
        workers.push(std::thread::spawn(move || {
            let frame = source.capture()?;
            classifier.classify(&frame)
        }));
    }

    let mut votes = vec![false; settings.frames];
    for (index, worker) in workers.into_iter().enumerate() {
        votes[index] = match worker.join() {
            Ok(Ok(vote)) => vote,
            Ok(Err(err)) => {
                warn!(frame = index, error = %err, "Frame detection failed, counting as clear");
                false
            }
            Err(_) => {
                warn!(frame = index, "Frame detection panicked, counting as clear");
                false
            }
        };
    }
    votes
}
