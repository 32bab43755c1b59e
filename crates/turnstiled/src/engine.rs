//! The detection-sampling and access-decision loop.
//!
//! Every frame is located and rendered; every N-th frame that shows a face
//! is also identified, recorded to the attempt sinks and reflected in the
//! display status. The loop is single-threaded and owns its frame source,
//! so dropping it (or returning from [`DecisionLoop::run`]) releases the
//! capture device.

use crate::surface::Surface;
use chrono::Utc;
use image::RgbImage;
use turnstile_core::{crop, AttemptRecord, DisplayStatus, FaceBox, FaceLocator, IdentityMatcher};
use turnstile_hw::FrameSource;
use turnstile_sinks::AttemptSink;

/// Why the loop left the running state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The surface reported a quit request.
    QuitRequested,
    /// The frame source could not deliver a frame.
    SourceFailed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Identify on every `every_n_frames`-th frame (counted from 1).
    pub every_n_frames: u64,
    /// Padding applied to the face box before identification.
    pub crop_padding: u32,
}

pub struct DecisionLoop<S: FrameSource, D: Surface> {
    source: S,
    surface: D,
    locator: FaceLocator,
    matcher: IdentityMatcher,
    sinks: Vec<Box<dyn AttemptSink>>,
    settings: LoopSettings,
    frame_counter: u64,
    status: DisplayStatus,
    attempts: u64,
    stopped: Option<StopReason>,
}

impl<S: FrameSource, D: Surface> DecisionLoop<S, D> {
    /// Build a loop around an already-open source.
    pub fn new(
        source: S,
        surface: D,
        locator: FaceLocator,
        matcher: IdentityMatcher,
        sinks: Vec<Box<dyn AttemptSink>>,
        settings: LoopSettings,
    ) -> Self {
        let settings = LoopSettings {
            every_n_frames: settings.every_n_frames.max(1),
            ..settings
        };
        let enabled: Vec<&str> = sinks.iter().filter(|s| s.is_enabled()).map(|s| s.name()).collect();
        tracing::info!(
            every_n_frames = settings.every_n_frames,
            crop_padding = settings.crop_padding,
            threshold = matcher.threshold(),
            dataset = %matcher.dataset_root().display(),
            sinks = ?enabled,
            "decision loop ready"
        );

        Self {
            source,
            surface,
            locator,
            matcher,
            sinks,
            settings,
            frame_counter: 0,
            status: DisplayStatus::default(),
            attempts: 0,
            stopped: None,
        }
    }

    /// Frames read so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Matcher invocations completed so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn status(&self) -> &DisplayStatus {
        &self.status
    }

    /// Run one iteration. `Some` means the loop has stopped; once stopped,
    /// every later call returns the same reason without touching the source.
    pub fn step(&mut self) -> Option<StopReason> {
        if self.stopped.is_some() {
            return self.stopped.clone();
        }
        self.stopped = self.advance();
        self.stopped.clone()
    }

    fn advance(&mut self) -> Option<StopReason> {
        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(frame = self.frame_counter, error = %e, "frame read failed");
                return Some(StopReason::SourceFailed(e.to_string()));
            }
        };
        self.frame_counter += 1;

        let mut image = frame.image;
        let face = self.locator.locate(&image);

        if let Some(face) = &face {
            if self.frame_counter % self.settings.every_n_frames == 0 {
                self.attempt(&image, face);
            }
        }

        self.surface.render(&mut image, face.as_ref(), &self.status);

        if self.surface.quit_requested() {
            tracing::info!(frames = self.frame_counter, "quit requested");
            return Some(StopReason::QuitRequested);
        }
        None
    }

    /// Run until stopped. Consumes the loop, releasing the frame source.
    pub fn run(mut self) -> StopReason {
        loop {
            if let Some(reason) = self.step() {
                tracing::info!(
                    frames = self.frame_counter,
                    attempts = self.attempts,
                    reason = ?reason,
                    "decision loop stopped"
                );
                return reason;
            }
        }
    }

    fn attempt(&mut self, image: &RgbImage, face: &FaceBox) {
        let face_image = crop(image, face, self.settings.crop_padding);
        let result = self.matcher.recognize(&face_image);
        let record = AttemptRecord::from_result(&result, Utc::now());

        self.status = DisplayStatus::from_result(&result);
        self.attempts += 1;

        let mut accepted = 0usize;
        for sink in &mut self.sinks {
            if sink.record(&record) {
                accepted += 1;
            }
        }

        tracing::info!(
            frame = self.frame_counter,
            name = %record.detected_name,
            confidence = record.confidence,
            verdict = %record.granted_or_denied,
            distance = ?result.distance,
            sinks = accepted,
            "access attempt"
        );
    }
}
