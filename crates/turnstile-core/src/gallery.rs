//! Embedding gallery built from the reference dataset.
//!
//! [`GalleryMatcher`] is the stock [`FaceMatcher`]: it embeds every reference
//! image once, keeps the embeddings in memory, and rebuilds them whenever
//! the set of reference files (or their modification times) changes.

use crate::dataset;
use crate::locator::{self, FaceLocator};
use crate::matcher::{Candidate, FaceMatcher, MatchError};
use crate::recognizer::{FaceEmbedder, RecognizerError};
use crate::types::Embedding;
use image::RgbImage;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

/// How two embeddings are compared. Lower distance means more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in [0, 2].
    Cosine,
    Euclidean,
    /// Euclidean distance between L2-normalised vectors, in [0, 2].
    EuclideanL2,
}

impl DistanceMetric {
    pub fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - a.similarity(b),
            DistanceMetric::Euclidean => a.euclidean_distance(b),
            DistanceMetric::EuclideanL2 => a.l2_normalized().euclidean_distance(&b.l2_normalized()),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "euclidean_l2" => Ok(DistanceMetric::EuclideanL2),
            other => Err(format!("unknown distance metric: {other} (expected cosine, euclidean or euclidean_l2)")),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        })
    }
}

/// Produces an embedding for a face crop.
pub trait Embedder {
    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, RecognizerError>;
}

impl Embedder for FaceEmbedder {
    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, RecognizerError> {
        self.extract(face)
    }
}

struct GalleryEntry {
    path: PathBuf,
    embedding: Embedding,
}

/// Files and modification times the current gallery was built from.
type Signature = Vec<(PathBuf, Option<SystemTime>)>;

pub struct GalleryMatcher {
    embedder: Box<dyn Embedder>,
    /// Crops the face out of reference photos; whole images are used without it.
    locator: Option<FaceLocator>,
    padding: u32,
    metric: DistanceMetric,
    built_for: Option<(PathBuf, Signature)>,
    gallery: Vec<GalleryEntry>,
}

impl GalleryMatcher {
    pub fn new(
        embedder: Box<dyn Embedder>,
        locator: Option<FaceLocator>,
        padding: u32,
        metric: DistanceMetric,
    ) -> Self {
        Self {
            embedder,
            locator,
            padding,
            metric,
            built_for: None,
            gallery: Vec::new(),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of reference embeddings currently held.
    pub fn len(&self) -> usize {
        self.gallery.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gallery.is_empty()
    }

    fn refresh(&mut self, root: &Path) {
        let signature: Signature = dataset::reference_images(root)
            .into_iter()
            .map(|p| {
                let mtime = p.metadata().and_then(|m| m.modified()).ok();
                (p, mtime)
            })
            .collect();

        if let Some((built_root, built_sig)) = &self.built_for {
            if built_root == root && *built_sig == signature {
                return;
            }
        }

        tracing::info!(root = %root.display(), images = signature.len(), "building reference gallery");

        let mut gallery = Vec::with_capacity(signature.len());
        for (path, _) in &signature {
            match self.embed_reference(path) {
                Ok(embedding) => gallery.push(GalleryEntry { path: path.clone(), embedding }),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping reference image"),
            }
        }

        tracing::info!(embedded = gallery.len(), "reference gallery ready");
        self.gallery = gallery;
        self.built_for = Some((root.to_path_buf(), signature));
    }

    fn embed_reference(&mut self, path: &Path) -> Result<Embedding, MatchError> {
        let image = image::open(path)
            .map_err(|e| MatchError::Failed(format!("cannot read {}: {e}", path.display())))?
            .to_rgb8();

        let face = match self.locator.as_mut().and_then(|l| l.locate(&image)) {
            Some(face_box) => locator::crop(&image, &face_box, self.padding),
            None => image,
        };

        Ok(self.embedder.embed(&face)?)
    }
}

impl FaceMatcher for GalleryMatcher {
    fn find(&mut self, face: &RgbImage, dataset_root: &Path) -> Result<Vec<Candidate>, MatchError> {
        self.refresh(dataset_root);
        if self.gallery.is_empty() {
            return Ok(Vec::new());
        }

        let probe = self.embedder.embed(face)?;
        let mut candidates: Vec<Candidate> = self
            .gallery
            .iter()
            .map(|entry| Candidate {
                identity: entry.path.clone(),
                distance: self.metric.distance(&probe, &entry.embedding),
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(candidates)
    }
}
