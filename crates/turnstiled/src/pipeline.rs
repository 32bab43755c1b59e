//! Construction of the recognition pipeline and attempt sinks from [`Config`].

use crate::config::Config;
use thiserror::Error;
use turnstile_core::detector::DetectorError;
use turnstile_core::recognizer::RecognizerError;
use turnstile_core::{FaceEmbedder, FaceLocator, GalleryMatcher, IdentityMatcher, ScrfdDetector};
use turnstile_sinks::{AttemptSink, CsvLog, RemoteLog};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("face detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("face recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Load the detector and wrap it in a locator.
pub fn face_locator(config: &Config) -> Result<FaceLocator, PipelineError> {
    let detector = ScrfdDetector::load(&config.detector_model_path())?;
    Ok(FaceLocator::new(Box::new(detector), config.min_face_size))
}

/// Load the recognition model and build the dataset-backed identity matcher.
///
/// Reference images are cropped to their largest face with a second detector
/// instance so the gallery and the live loop never share model state.
pub fn identity_matcher(config: &Config) -> Result<IdentityMatcher, PipelineError> {
    let embedder = FaceEmbedder::load(&config.recognition_model_path())?;
    let reference_locator = face_locator(config)?;
    let gallery = GalleryMatcher::new(
        Box::new(embedder),
        Some(reference_locator),
        config.crop_padding,
        config.distance_metric,
    );
    Ok(IdentityMatcher::new(
        Box::new(gallery),
        &config.dataset_dir,
        config.match_distance_threshold,
    ))
}

/// Local CSV log followed by the remote log. Either may be disabled.
pub fn attempt_sinks(config: &Config) -> Vec<Box<dyn AttemptSink>> {
    vec![
        Box::new(CsvLog::open(&config.local_log_file)),
        Box::new(RemoteLog::connect(&config.remote())),
    ]
}
