use crate::detection::{DetectionError, FrameSource, ObstacleClassifier};
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockVote {
    Obstacle,
    Clear,
    Fail,
    Panic,
}

/// Frame source returning a small blank frame, optionally after a delay.
#[derive(Debug, Default)]
pub struct MockFrameSource {
    delay: Duration,
    fail: bool,
    captures: AtomicUsize,
}

impl MockFrameSource {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl FrameSource for MockFrameSource {
    fn capture(&self) -> Result<RgbImage, DetectionError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(DetectionError::Capture("mock camera offline".to_string()));
        }
        Ok(RgbImage::new(4, 4))
    }
}

/// Classifier handing out scripted votes in call order; the last one repeats.
#[derive(Debug)]
pub struct ScriptedClassifier {
    votes: Mutex<VecDeque<MockVote>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(votes: Vec<MockVote>) -> Self {
        Self {
            votes: Mutex::new(votes.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every frame votes the same way.
    pub fn always(vote: MockVote) -> Self {
        Self::new(vec![vote])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_vote(&self) -> MockVote {
        let mut votes = self
            .votes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if votes.len() > 1 {
            votes.pop_front().unwrap_or(MockVote::Clear)
        } else {
            votes.front().copied().unwrap_or(MockVote::Clear)
        }
    }
}

impl ObstacleClassifier for ScriptedClassifier {
    fn classify(&self, _frame: &RgbImage) -> Result<bool, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_vote() {
            MockVote::Obstacle => Ok(true),
            MockVote::Clear => Ok(false),
            MockVote::Fail => Err(DetectionError::Decode("mock classify failure".to_string())),
            MockVote::Panic => panic!("mock classifier panic"),
        }
    }
}
