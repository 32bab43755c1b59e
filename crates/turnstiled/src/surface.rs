//! Display surfaces for the decision loop.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use turnstile_core::{AccessStatus, DisplayStatus, FaceBox};

const BOX_COLOR: Rgb<u8> = Rgb([255, 200, 70]);
const GRANTED_COLOR: Rgb<u8> = Rgb([80, 220, 120]);
const DENIED_COLOR: Rgb<u8> = Rgb([230, 70, 70]);
const WAITING_COLOR: Rgb<u8> = Rgb([160, 160, 160]);
const NO_FACE_COLOR: Rgb<u8> = Rgb([200, 60, 160]);
const PANEL_COLOR: Rgb<u8> = Rgb([24, 24, 24]);
const TEXT_COLOR: Rgb<u8> = Rgb([240, 240, 240]);
const BOX_THICKNESS: u32 = 2;
const BORDER_THICKNESS: u32 = 8;
const TEXT_SCALE: f32 = 18.0;
const LINE_HEIGHT: u32 = 22;
const PANEL_WIDTH: u32 = 320;
const NO_FACE_TEXT: &str = "No face detected";

/// Fonts tried when no overlay font is configured.
pub const FALLBACK_FONTS: [&str; 3] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
];

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ab_glyph::InvalidFont,
    },
}

/// Load a TrueType/OpenType font for the status overlay.
pub fn load_font(path: &Path) -> Result<FontVec, FontError> {
    let bytes = std::fs::read(path).map_err(|source| FontError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(bytes).map_err(|source| FontError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// The configured font, else the first loadable fallback.
///
/// `None` means the overlay is drawn without text.
pub fn find_font(configured: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = configured {
        return match load_font(path) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!(error = %e, "overlay font unavailable; drawing without text");
                None
            }
        };
    }
    let font = FALLBACK_FONTS
        .iter()
        .find_map(|path| load_font(Path::new(path)).ok());
    if font.is_none() {
        tracing::info!("no overlay font found; drawing without text");
    }
    font
}

/// Where annotated frames go, and where the quit request comes from.
pub trait Surface {
    /// Present one frame with the current face box (if any) and status.
    fn render(&mut self, frame: &mut RgbImage, face: Option<&FaceBox>, status: &DisplayStatus);

    /// Polled once per iteration after rendering.
    fn quit_requested(&mut self) -> bool;
}

pub fn status_color(status: AccessStatus) -> Rgb<u8> {
    match status {
        AccessStatus::Waiting => WAITING_COLOR,
        AccessStatus::AccessGiven => GRANTED_COLOR,
        AccessStatus::AccessDenied => DENIED_COLOR,
    }
}

/// Text lines of the status panel.
pub fn status_lines(status: &DisplayStatus) -> [String; 4] {
    [
        status.status.to_string(),
        format!("Name: {}", status.name),
        format!("Confidence: {:.2}", status.confidence),
        format!("Reason: {}", status.reason),
    ]
}

/// Surface for kiosks without a window system.
///
/// Annotates frames in place, optionally writes every K-th annotated frame
/// to a PNG, and logs status and face-presence changes.
pub struct HeadlessSurface {
    quit: Arc<AtomicBool>,
    font: Option<FontVec>,
    snapshot: Option<PathBuf>,
    snapshot_every: u64,
    rendered: u64,
    last_status: Option<DisplayStatus>,
    face_visible: Option<bool>,
}

impl HeadlessSurface {
    pub fn new(quit: Arc<AtomicBool>, snapshot: Option<PathBuf>, snapshot_every: u64) -> Self {
        Self {
            quit,
            font: None,
            snapshot,
            snapshot_every: snapshot_every.max(1),
            rendered: 0,
            last_status: None,
            face_visible: None,
        }
    }

    /// Draw status text with `font` in addition to the colored overlay.
    pub fn with_font(mut self, font: Option<FontVec>) -> Self {
        self.font = font;
        self
    }

    fn note_status(&mut self, status: &DisplayStatus) {
        if self.last_status.as_ref() == Some(status) {
            return;
        }
        tracing::info!(
            status = %status.status,
            name = %status.name,
            confidence = %format!("{:.2}", status.confidence),
            reason = %status.reason,
            "display status"
        );
        self.last_status = Some(status.clone());
    }

    fn note_face(&mut self, visible: bool) {
        if self.face_visible == Some(visible) {
            return;
        }
        if visible {
            tracing::debug!("face in view");
        } else {
            tracing::debug!("no face detected");
        }
        self.face_visible = Some(visible);
    }
}

impl Surface for HeadlessSurface {
    fn render(&mut self, frame: &mut RgbImage, face: Option<&FaceBox>, status: &DisplayStatus) {
        self.rendered += 1;

        match face {
            Some(face) => draw_rect(frame, face, BOX_COLOR, BOX_THICKNESS),
            None => draw_no_face(frame, self.font.as_ref()),
        }
        if let Some(font) = &self.font {
            draw_status_panel(frame, status, font);
        }
        draw_border(frame, status_color(status.status), BORDER_THICKNESS);

        self.note_face(face.is_some());
        self.note_status(status);

        if let Some(path) = &self.snapshot {
            if self.rendered % self.snapshot_every == 0 {
                if let Err(e) = frame.save(path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to write snapshot");
                }
            }
        }
    }

    fn quit_requested(&mut self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

/// Outline `face` with a `thickness`-pixel rectangle, clipped to the frame.
pub fn draw_rect(frame: &mut RgbImage, face: &FaceBox, color: Rgb<u8>, thickness: u32) {
    let (fw, fh) = frame.dimensions();
    let x0 = face.x.min(fw);
    let y0 = face.y.min(fh);
    let x1 = face.x.saturating_add(face.width).min(fw);
    let y1 = face.y.saturating_add(face.height).min(fh);

    for inset in 0..thickness {
        let (w, h) = ((x1 - x0).saturating_sub(2 * inset), (y1 - y0).saturating_sub(2 * inset));
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((x0 + inset) as i32, (y0 + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(frame, rect, color);
    }
}

/// Paint a status border around the whole frame.
pub fn draw_border(frame: &mut RgbImage, color: Rgb<u8>, thickness: u32) {
    let (w, h) = frame.dimensions();
    let whole = FaceBox {
        x: 0,
        y: 0,
        width: w,
        height: h,
    };
    draw_rect(frame, &whole, color, thickness);
}

/// Banner along the bottom edge, inside the border, shown while no face is in view.
pub fn draw_no_face(frame: &mut RgbImage, font: Option<&FontVec>) {
    let (w, h) = frame.dimensions();
    let inner_w = w.saturating_sub(2 * BORDER_THICKNESS);
    let inner_h = h.saturating_sub(2 * BORDER_THICKNESS);
    let bar = LINE_HEIGHT.min(inner_h / 3);
    if inner_w == 0 || bar == 0 {
        return;
    }

    let top = h - BORDER_THICKNESS - bar;
    let banner = Rect::at(BORDER_THICKNESS as i32, top as i32).of_size(inner_w, bar);
    draw_filled_rect_mut(frame, banner, NO_FACE_COLOR);

    if let Some(font) = font {
        let x = (BORDER_THICKNESS + 4) as i32;
        draw_text_mut(frame, TEXT_COLOR, x, top as i32, PxScale::from(TEXT_SCALE), font, NO_FACE_TEXT);
    }
}

/// Status, name, confidence and reason in a panel at the top left.
pub fn draw_status_panel(frame: &mut RgbImage, status: &DisplayStatus, font: &FontVec) {
    let (w, h) = frame.dimensions();
    let lines = status_lines(status);
    let panel_w = PANEL_WIDTH.min(w.saturating_sub(2 * BORDER_THICKNESS));
    let panel_h = (LINE_HEIGHT * lines.len() as u32 + 8).min(h.saturating_sub(2 * BORDER_THICKNESS));
    if panel_w == 0 || panel_h == 0 {
        return;
    }

    let origin = BORDER_THICKNESS as i32;
    draw_filled_rect_mut(frame, Rect::at(origin, origin).of_size(panel_w, panel_h), PANEL_COLOR);
    let scale = PxScale::from(TEXT_SCALE);
    for (row, line) in lines.iter().enumerate() {
        let y = origin + 4 + (row as u32 * LINE_HEIGHT) as i32;
        draw_text_mut(frame, status_color(status.status), origin + 4, y, scale, font, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn quit_flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn granted() -> DisplayStatus {
        DisplayStatus {
            name: "Alice".into(),
            confidence: 0.8,
            status: AccessStatus::AccessGiven,
            reason: "Face found in dataset".into(),
        }
    }

    fn face_box() -> FaceBox {
        FaceBox {
            x: 12,
            y: 10,
            width: 6,
            height: 6,
        }
    }

    #[test]
    fn test_draw_rect_outline_only() {
        let mut img = RgbImage::new(20, 20);
        let face = FaceBox {
            x: 5,
            y: 5,
            width: 10,
            height: 10,
        };
        draw_rect(&mut img, &face, BOX_COLOR, 1);
        assert_eq!(*img.get_pixel(5, 5), BOX_COLOR);
        assert_eq!(*img.get_pixel(14, 14), BOX_COLOR);
        assert_eq!(*img.get_pixel(10, 10), BLACK);
        assert_eq!(*img.get_pixel(15, 15), BLACK);
    }

    #[test]
    fn test_draw_rect_thickness_insets() {
        let mut img = RgbImage::new(20, 20);
        let face = FaceBox {
            x: 2,
            y: 2,
            width: 12,
            height: 12,
        };
        draw_rect(&mut img, &face, BOX_COLOR, 2);
        assert_eq!(*img.get_pixel(2, 8), BOX_COLOR);
        assert_eq!(*img.get_pixel(3, 8), BOX_COLOR);
        assert_eq!(*img.get_pixel(4, 8), BLACK);
        assert_eq!(*img.get_pixel(12, 12), BOX_COLOR);
    }

    #[test]
    fn test_draw_rect_clips_to_frame() {
        let mut img = RgbImage::new(10, 10);
        let face = FaceBox {
            x: 8,
            y: 8,
            width: 50,
            height: 50,
        };
        draw_rect(&mut img, &face, BOX_COLOR, 1);
        assert_eq!(*img.get_pixel(9, 9), BOX_COLOR);
    }

    #[test]
    fn test_draw_rect_outside_frame_is_noop() {
        let mut img = RgbImage::new(10, 10);
        let face = FaceBox {
            x: 30,
            y: 30,
            width: 5,
            height: 5,
        };
        draw_rect(&mut img, &face, BOX_COLOR, 2);
        assert!(img.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_render_paints_status_border() {
        let mut surface = HeadlessSurface::new(quit_flag(), None, 1);
        let mut img = RgbImage::new(40, 30);
        surface.render(&mut img, None, &granted());
        assert_eq!(*img.get_pixel(0, 0), GRANTED_COLOR);
        assert_eq!(*img.get_pixel(39, 29), GRANTED_COLOR);
        assert_eq!(*img.get_pixel(20, 15), BLACK);

        let mut img = RgbImage::new(40, 30);
        surface.render(&mut img, None, &DisplayStatus::default());
        assert_eq!(*img.get_pixel(0, 0), WAITING_COLOR);
    }

    #[test]
    fn test_render_without_face_marks_interior() {
        let mut surface = HeadlessSurface::new(quit_flag(), None, 1);

        let mut empty = RgbImage::new(40, 30);
        surface.render(&mut empty, None, &granted());
        assert_eq!(*empty.get_pixel(20, 20), NO_FACE_COLOR);

        let mut with_face = RgbImage::new(40, 30);
        surface.render(&mut with_face, Some(&face_box()), &granted());
        assert_eq!(*with_face.get_pixel(20, 20), BLACK);
        assert_eq!(*with_face.get_pixel(12, 10), BOX_COLOR);
    }

    #[test]
    fn test_status_lines_carry_every_field() {
        let lines = status_lines(&granted());
        assert_eq!(lines[0], "ACCESS GIVEN");
        assert_eq!(lines[1], "Name: Alice");
        assert_eq!(lines[2], "Confidence: 0.80");
        assert_eq!(lines[3], "Reason: Face found in dataset");
    }

    #[test]
    fn test_load_font_reports_missing_and_invalid() {
        assert!(matches!(
            load_font(Path::new("/nonexistent/turnstile/font.ttf")),
            Err(FontError::Read { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(load_font(&path), Err(FontError::Invalid { .. })));
        assert!(find_font(Some(&path)).is_none());
    }

    #[test]
    fn test_snapshot_every_k_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk.png");
        let mut surface = HeadlessSurface::new(quit_flag(), Some(path.clone()), 3);

        for _ in 0..2 {
            surface.render(&mut RgbImage::new(16, 16), None, &granted());
        }
        assert!(!path.exists());

        surface.render(&mut RgbImage::new(16, 16), None, &granted());
        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(*saved.get_pixel(0, 0), GRANTED_COLOR);
    }

    #[test]
    fn test_quit_follows_flag() {
        let flag = quit_flag();
        let mut surface = HeadlessSurface::new(Arc::clone(&flag), None, 1);
        assert!(!surface.quit_requested());
        flag.store(true, Ordering::SeqCst);
        assert!(surface.quit_requested());
    }
}
