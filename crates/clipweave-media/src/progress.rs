use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Progress update sent during an export.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderProgress {
    /// Whole percent, never decreasing within one export.
    pub percent: u8,
    pub completed_units: u64,
    pub total_units: u64,
    pub elapsed: Duration,
    pub stage: RenderStage,
}

/// Current stage of the export pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderStage {
    Setup,
    VideoEncoding,
    AudioEncoding,
    Finalizing,
    Complete,
}

pub type ProgressCallback = Box<dyn FnMut(RenderProgress) + Send>;

/// Turns unit counts into integer percent updates.
///
/// A callback only fires when the percent value rises, so listeners see
/// at most 101 updates per export, the last of them from `finish`.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last_percent: Option<u8>,
    stage: RenderStage,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(callback: impl FnMut(RenderProgress) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            last_percent: None,
            stage: RenderStage::Setup,
            started: Instant::now(),
        }
    }

    /// A reporter nobody listens to.
    pub fn silent() -> Self {
        Self {
            callback: None,
            last_percent: None,
            stage: RenderStage::Setup,
            started: Instant::now(),
        }
    }

    /// Reporter that forwards updates over a channel.
    pub fn channel() -> (Self, Receiver<RenderProgress>) {
        let (tx, rx) = mpsc::channel();
        let reporter = Self::new(move |update| {
            // Receiver gone means nobody is listening anymore.
            let _ = tx.send(update);
        });
        (reporter, rx)
    }

    pub fn set_stage(&mut self, stage: RenderStage) {
        self.stage = stage;
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }

    /// Record `completed` of `total` units. Stays below 100 until
    /// [`finish`](Self::finish).
    pub fn report(&mut self, completed: u64, total: u64) {
        let percent = if total == 0 {
            0
        } else {
            ((completed.min(total) as u128 * 100) / total as u128).min(99) as u8
        };
        self.emit(percent, completed, total);
    }

    /// Emit the terminal 100% update.
    pub fn finish(&mut self, total: u64) {
        self.stage = RenderStage::Complete;
        self.emit(100, total, total);
    }

    fn emit(&mut self, percent: u8, completed: u64, total: u64) {
        if self.last_percent.is_some_and(|last| percent <= last) {
            return;
        }
        self.last_percent = Some(percent);
        let update = RenderProgress {
            percent,
            completed_units: completed,
            total_units: total,
            elapsed: self.started.elapsed(),
            stage: self.stage,
        };
        if let Some(callback) = self.callback.as_mut() {
            callback(update);
        }
    }
}
