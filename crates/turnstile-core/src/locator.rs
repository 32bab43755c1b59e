//! Largest-face selection and padded cropping.

use crate::detector::FaceDetector;
use crate::types::FaceBox;
use image::imageops;
use image::RgbImage;

/// Finds the single largest face in a frame.
pub struct FaceLocator {
    detector: Box<dyn FaceDetector>,
    min_face_size: u32,
}

impl FaceLocator {
    /// `min_face_size` discards detections narrower or shorter than this many pixels.
    pub fn new(detector: Box<dyn FaceDetector>, min_face_size: u32) -> Self {
        Self { detector, min_face_size }
    }

    /// Return the largest detected face, clamped to the frame.
    ///
    /// Ties keep the detector's first box. A detector failure is logged and
    /// reported as "no face".
    pub fn locate(&mut self, frame: &RgbImage) -> Option<FaceBox> {
        let detections = match self.detector.detect(frame) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed; treating frame as empty");
                return None;
            }
        };

        let (width, height) = frame.dimensions();
        detections
            .iter()
            .filter_map(|det| FaceBox::from_detection(det, width, height))
            .filter(|b| b.width >= self.min_face_size && b.height >= self.min_face_size)
            .fold(None, |best: Option<FaceBox>, b| match best {
                Some(prev) if prev.area() >= b.area() => Some(prev),
                _ => Some(b),
            })
    }
}

/// Cut `face` out of `frame`, grown by `padding` pixels per side and clamped
/// to the frame edges.
pub fn crop(frame: &RgbImage, face: &FaceBox, padding: u32) -> RgbImage {
    let (width, height) = frame.dimensions();
    let x1 = face.x.saturating_sub(padding);
    let y1 = face.y.saturating_sub(padding);
    let x2 = face.x.saturating_add(face.width).saturating_add(padding).min(width);
    let y2 = face.y.saturating_add(face.height).saturating_add(padding).min(height);

    debug_assert!(x2 >= x1 && y2 >= y1, "face box outside frame: {face:?}");
    imageops::crop_imm(frame, x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1)).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use crate::types::BoundingBox;

    struct FakeDetector {
        result: Result<Vec<BoundingBox>, ()>,
    }

    impl FaceDetector for FakeDetector {
        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            self.result
                .clone()
                .map_err(|_| DetectorError::InferenceFailed("boom".into()))
        }
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    fn locator(result: Result<Vec<BoundingBox>, ()>, min: u32) -> FaceLocator {
        FaceLocator::new(Box::new(FakeDetector { result }), min)
    }

    fn frame() -> RgbImage {
        RgbImage::new(640, 480)
    }

    #[test]
    fn test_locate_picks_largest_area() {
        let mut loc = locator(
            Ok(vec![
                bbox(0.0, 0.0, 80.0, 80.0),
                bbox(100.0, 100.0, 120.0, 100.0),
                bbox(300.0, 50.0, 90.0, 90.0),
            ]),
            0,
        );
        assert_eq!(
            loc.locate(&frame()),
            Some(FaceBox { x: 100, y: 100, width: 120, height: 100 })
        );
    }

    #[test]
    fn test_locate_tie_keeps_first() {
        let mut loc = locator(
            Ok(vec![bbox(10.0, 10.0, 100.0, 100.0), bbox(300.0, 10.0, 100.0, 100.0)]),
            0,
        );
        assert_eq!(loc.locate(&frame()).map(|b| b.x), Some(10));
    }

    #[test]
    fn test_locate_none_when_no_detections() {
        let mut loc = locator(Ok(vec![]), 0);
        assert_eq!(loc.locate(&frame()), None);
    }

    #[test]
    fn test_locate_detector_error_is_no_face() {
        let mut loc = locator(Err(()), 0);
        assert_eq!(loc.locate(&frame()), None);
    }

    #[test]
    fn test_locate_discards_small_faces() {
        let mut loc = locator(
            Ok(vec![bbox(0.0, 0.0, 60.0, 200.0), bbox(200.0, 0.0, 75.0, 75.0)]),
            70,
        );
        assert_eq!(loc.locate(&frame()).map(|b| b.x), Some(200));
    }

    #[test]
    fn test_locate_clamps_to_frame() {
        let mut loc = locator(Ok(vec![bbox(600.0, 440.0, 100.0, 100.0)]), 0);
        let b = loc.locate(&frame()).unwrap();
        assert!(b.x + b.width <= 640);
        assert!(b.y + b.height <= 480);
    }

    #[test]
    fn test_crop_with_padding_inside_frame() {
        let face = FaceBox { x: 100, y: 100, width: 50, height: 40 };
        let out = crop(&frame(), &face, 15);
        assert_eq!(out.dimensions(), (80, 70));
    }

    #[test]
    fn test_crop_clamps_at_edges() {
        let face = FaceBox { x: 5, y: 0, width: 630, height: 470 };
        let out = crop(&frame(), &face, 15);
        assert_eq!(out.dimensions(), (640, 480));
    }

    #[test]
    fn test_crop_copies_pixels_from_offset() {
        let mut img = RgbImage::new(10, 10);
        img.put_pixel(2, 3, image::Rgb([9, 8, 7]));
        let face = FaceBox { x: 3, y: 4, width: 2, height: 2 };
        let out = crop(&img, &face, 1);
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(out.get_pixel(0, 0), &image::Rgb([9, 8, 7]));
    }
}
