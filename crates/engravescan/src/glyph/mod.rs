//! Per-glyph inputs and analyses: OCR glyph records, geometric features and
//! reference-template verification.

mod features;
mod shape;
mod template;
mod verify;

pub use features::{FeatureConfig, GeometricFeatureExtractor, GlyphMetrics};
pub use shape::{default_shape_rules, GlyphShapeRule};
pub use template::{HoleSignature, ReferenceTemplate, TemplateSet};
pub use verify::{FontTemplateVerifier, GlyphCrop, GlyphVerification, VerifierConfig};

/// Axis-aligned glyph box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    /// Left edge (pixels).
    pub x: f32,
    /// Top edge (pixels).
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box spanning the given corner points (OCR engines report quadrilaterals).
    pub fn from_points(points: &[[f32; 2]]) -> Option<Self> {
        let first = points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first[0], first[1], first[0], first[1]);
        for p in &points[1..] {
            x0 = x0.min(p[0]);
            y0 = y0.min(p[1]);
            x1 = x1.max(p[0]);
            y1 = y1.max(p[1]);
        }
        Some(Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn center_x(&self) -> f32 {
        self.x + 0.5 * self.width
    }

    /// Vertical midpoint.
    pub fn center_y(&self) -> f32 {
        self.y + 0.5 * self.height
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Integer pixel rectangle `[x0, y0, x1, y1)` grown by `margin` and clamped
    /// to an image of size `w`×`h`. Returns `None` when nothing remains.
    pub fn pixel_rect(&self, w: u32, h: u32, margin: u32) -> Option<[u32; 4]> {
        if self.is_degenerate() || !self.x.is_finite() || !self.y.is_finite() {
            return None;
        }
        let m = margin as f32;
        let x0 = (self.x - m).floor().max(0.0) as u32;
        let y0 = (self.y - m).floor().max(0.0) as u32;
        let x1 = ((self.x + self.width + m).ceil().max(0.0) as u32).min(w);
        let y1 = ((self.y + self.height + m).ceil().max(0.0) as u32).min(h);
        (x0 < x1 && y0 < y1).then_some([x0, y0, x1, y1])
    }

    /// Split the box into `n` equal-width slices, left to right.
    pub fn split_horizontally(&self, n: usize) -> Vec<BoundingBox> {
        if n <= 1 {
            return vec![*self];
        }
        let step = self.width / n as f32;
        (0..n)
            .map(|i| BoundingBox::new(self.x + step * i as f32, self.y, step, self.height))
            .collect()
    }
}

/// One OCR detection, as reported by the external engine.
///
/// `text` is usually a single character but engines that report words put a
/// whole token here; consumers clean it to uppercase alphanumerics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawGlyph {
    #[serde(alias = "char")]
    pub text: String,
    #[serde(alias = "bbox")]
    pub bounding_box: BoundingBox,
    /// OCR confidence in [0, 1].
    #[serde(alias = "confidence")]
    pub ocr_confidence: f32,
    /// Order in which the engine emitted this detection.
    #[serde(default)]
    pub sequence_index: usize,
}

impl RawGlyph {
    pub fn new(text: &str, bounding_box: BoundingBox, ocr_confidence: f32, sequence_index: usize) -> Self {
        Self {
            text: text.to_string(),
            bounding_box,
            ocr_confidence,
            sequence_index,
        }
    }

    /// Uppercase alphanumeric characters of `text`.
    pub fn clean_chars(&self) -> Vec<char> {
        self.text
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// One `(char, box)` per alphanumeric character, splitting word tokens
    /// evenly across the box width.
    pub fn char_boxes(&self) -> Vec<(char, BoundingBox)> {
        let chars = self.clean_chars();
        let boxes = self.bounding_box.split_horizontally(chars.len());
        chars.into_iter().zip(boxes).collect()
    }
}
