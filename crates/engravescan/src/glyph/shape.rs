//! Per-character shape rules of the reference font: ink proportions and the
//! minimum topology a genuine glyph shows.
//!
//! Rules apply with or without a reference template, so the digits most
//! often re-stamped are checked even when no template directory is loaded.

use std::collections::BTreeMap;

use image::GrayImage;

use crate::imaging;

use super::template::HoleSignature;

/// Shortest run of open rows counted as a left-side opening.
const MIN_OPENING_ROWS: u32 = 2;

/// Expected shape of one character.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GlyphShapeRule {
    /// Allowed ink width / height, inclusive.
    pub aspect_range: [f32; 2],
    /// Minimum enclosed holes per vertical third.
    pub min_holes: HoleSignature,
    /// Minimum number of openings on the left side (the two mouths of a '3').
    pub min_left_openings: u8,
}

impl Default for GlyphShapeRule {
    fn default() -> Self {
        Self {
            aspect_range: [0.0, f32::MAX],
            min_holes: HoleSignature::default(),
            min_left_openings: 0,
        }
    }
}

impl GlyphShapeRule {
    fn new(lo: f32, hi: f32) -> Self {
        Self {
            aspect_range: [lo, hi],
            ..Self::default()
        }
    }

    fn with_holes(mut self, top: u8, middle: u8, bottom: u8) -> Self {
        self.min_holes = HoleSignature { top, middle, bottom };
        self
    }

    fn with_left_openings(mut self, n: u8) -> Self {
        self.min_left_openings = n;
        self
    }

    pub fn aspect_ok(&self, aspect: f32) -> bool {
        aspect >= self.aspect_range[0] && aspect <= self.aspect_range[1]
    }
}

/// Built-in rules for the digits of the engine-code font.
pub fn default_shape_rules() -> BTreeMap<char, GlyphShapeRule> {
    BTreeMap::from([
        ('0', GlyphShapeRule::new(0.55, 0.75).with_holes(0, 1, 0)),
        ('1', GlyphShapeRule::new(0.20, 0.40)),
        ('2', GlyphShapeRule::new(0.50, 0.70)),
        ('3', GlyphShapeRule::new(0.50, 0.70).with_left_openings(2)),
        // Stroke ends of the '4' leave a closed counter at mid height.
        ('4', GlyphShapeRule::new(0.55, 0.75).with_holes(0, 1, 0)),
        ('5', GlyphShapeRule::new(0.50, 0.70)),
        ('6', GlyphShapeRule::new(0.55, 0.75).with_holes(0, 0, 1)),
        ('7', GlyphShapeRule::new(0.50, 0.70)),
        ('8', GlyphShapeRule::new(0.55, 0.75).with_holes(1, 0, 1)),
        ('9', GlyphShapeRule::new(0.55, 0.75).with_holes(1, 0, 0)),
    ])
}

/// Ink width over ink height of a mask; `None` without ink.
pub fn ink_aspect(mask: &GrayImage) -> Option<f32> {
    let [x0, y0, x1, y1] = imaging::ink_extent(mask)?;
    Some((x1 - x0) as f32 / (y1 - y0) as f32)
}

/// Count left-side openings: runs of rows whose left half of the ink box is
/// empty, closed by inked rows above and below.
pub fn left_openings(mask: &GrayImage) -> u8 {
    let Some([x0, y0, x1, y1]) = imaging::ink_extent(mask) else {
        return 0;
    };
    let mid = x0 + (x1 - x0).div_ceil(2);
    let mut count = 0u8;
    let mut closed_above = false;
    let mut run = 0u32;
    for y in y0..y1 {
        let open = (x0..mid).all(|x| mask.get_pixel(x, y).0[0] == 0);
        if open {
            if closed_above {
                run += 1;
            }
        } else {
            if run >= MIN_OPENING_ROWS {
                count = count.saturating_add(1);
            }
            run = 0;
            closed_above = true;
        }
    }
    count
}
