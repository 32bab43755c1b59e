//! Identity decisions on top of a pluggable face-matching capability.

use crate::dataset;
use crate::types::{RecognitionResult, UNKNOWN};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Guards the confidence division against a zero threshold.
const MIN_THRESHOLD: f32 = 1e-6;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("recognizer: {0}")]
    Recognizer(#[from] crate::recognizer::RecognizerError),
    #[error("{0}")]
    Failed(String),
}

/// One ranked match proposed by a [`FaceMatcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Reference image that matched; its parent directory names the person.
    pub identity: PathBuf,
    /// Dissimilarity under the matcher's metric. Lower is closer.
    pub distance: f32,
}

/// Strategy for ranking dataset identities against a face crop.
///
/// Candidates are returned closest first. Implementations may block and may fail.
pub trait FaceMatcher {
    fn find(&mut self, face: &RgbImage, dataset_root: &Path) -> Result<Vec<Candidate>, MatchError>;
}

/// `clamp(1 - distance / threshold, 0, 1)`.
pub fn confidence(distance: f32, threshold: f32) -> f32 {
    (1.0 - distance / threshold.max(MIN_THRESHOLD)).clamp(0.0, 1.0)
}

/// Turns matcher output into a [`RecognitionResult`].
pub struct IdentityMatcher {
    matcher: Box<dyn FaceMatcher>,
    dataset_root: PathBuf,
    threshold: f32,
}

impl IdentityMatcher {
    pub fn new(matcher: Box<dyn FaceMatcher>, dataset_root: impl Into<PathBuf>, threshold: f32) -> Self {
        Self {
            matcher,
            dataset_root: dataset_root.into(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn dataset_root(&self) -> &Path {
        &self.dataset_root
    }

    /// Identify a face crop. Never fails: every problem becomes an
    /// unverified result with a reason.
    pub fn recognize(&mut self, face: &RgbImage) -> RecognitionResult {
        if !dataset::is_ready(&self.dataset_root) {
            return RecognitionResult::rejected("Dataset is empty or missing");
        }

        let candidates = match self.matcher.find(face, &self.dataset_root) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "face matcher failed");
                return RecognitionResult::rejected(format!("Recognition error: {e}"));
            }
        };

        let Some(best) = candidates.into_iter().next() else {
            return RecognitionResult::rejected("No candidate found");
        };

        self.decide(&best)
    }

    fn decide(&self, best: &Candidate) -> RecognitionResult {
        if best.distance.is_nan() {
            return RecognitionResult::rejected("Recognition error: NaN distance");
        }

        let verified = best.distance <= self.threshold;
        let matched_name = if verified {
            dataset::identity_name(&best.identity).unwrap_or_else(|| UNKNOWN.to_string())
        } else {
            UNKNOWN.to_string()
        };

        tracing::debug!(
            identity = %best.identity.display(),
            distance = best.distance,
            threshold = self.threshold,
            verified,
            "best candidate"
        );

        RecognitionResult {
            matched_name,
            distance: Some(best.distance),
            confidence: confidence(best.distance, self.threshold),
            verified,
            reason: if verified { "Face matched" } else { "Distance above threshold" }.to_string(),
        }
    }
}
