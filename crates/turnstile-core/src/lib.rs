//! turnstile-core — Face location, identity matching and access decisions.
//!
//! Uses SCRFD for face detection and ArcFace for embeddings, both running
//! via ONNX Runtime on the CPU. The decision rules live in [`matcher`] and
//! do not depend on either model.

pub mod dataset;
pub mod detector;
pub mod gallery;
pub mod locator;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use detector::{FaceDetector, ScrfdDetector};
pub use gallery::{DistanceMetric, Embedder, GalleryMatcher};
pub use locator::{crop, FaceLocator};
pub use matcher::{Candidate, FaceMatcher, IdentityMatcher, MatchError};
pub use recognizer::FaceEmbedder;
pub use types::{
    AccessStatus, AttemptRecord, BoundingBox, DisplayStatus, Embedding, FaceBox, RecognitionResult, Verdict,
    UNKNOWN,
};
