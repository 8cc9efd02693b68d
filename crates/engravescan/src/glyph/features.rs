//! Per-glyph geometry: box height, centerline and the number of separate
//! ink blobs (micro-points) inside each box.

use image::GrayImage;

use crate::imaging::{self, Polarity};

use super::RawGlyph;

/// Per-glyph geometry extraction settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Which side of the Otsu threshold counts as engraving.
    pub polarity: Polarity,
    /// Connected components at or below this contour area are noise.
    pub min_dot_area: f64,
    /// Extra pixels around each glyph box when counting dots.
    pub crop_margin: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            polarity: Polarity::DarkInk,
            min_dot_area: 2.0,
            crop_margin: 0,
        }
    }
}

/// Geometric statistics of one character.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GlyphMetrics {
    pub char: char,
    /// 0-based position among alphanumeric characters.
    pub index: usize,
    pub height_px: f32,
    /// Vertical midpoint of the glyph box.
    pub center_y: f32,
    /// Separate ink blobs inside the glyph box (micro-points for laser marks).
    pub dot_count: usize,
}

/// Computes [`GlyphMetrics`] from a grayscale image and ordered OCR glyphs.
#[derive(Debug, Clone, Copy)]
pub struct GeometricFeatureExtractor<'a> {
    config: &'a FeatureConfig,
}

impl<'a> GeometricFeatureExtractor<'a> {
    pub fn new(config: &'a FeatureConfig) -> Self {
        Self { config }
    }

    /// Binarize `gray` once and measure every alphanumeric glyph.
    pub fn extract(&self, gray: &GrayImage, glyphs: &[RawGlyph]) -> Vec<GlyphMetrics> {
        let mask = imaging::otsu_mask(gray, self.config.polarity);
        self.extract_from_mask(&mask, glyphs)
    }

    /// Measure glyphs against an already binarized mask.
    pub fn extract_from_mask(&self, mask: &GrayImage, glyphs: &[RawGlyph]) -> Vec<GlyphMetrics> {
        let (w, h) = mask.dimensions();
        let mut out = Vec::with_capacity(glyphs.len());
        for (ch, bbox) in glyphs.iter().flat_map(RawGlyph::char_boxes) {
            let dot_count = bbox
                .pixel_rect(w, h, self.config.crop_margin)
                .map(|rect| {
                    imaging::count_external_blobs(&imaging::crop(mask, rect), self.config.min_dot_area)
                })
                .unwrap_or(0);
            let m = GlyphMetrics {
                char: ch,
                index: out.len(),
                height_px: bbox.height.max(0.0),
                center_y: bbox.center_y(),
                dot_count,
            };
            tracing::trace!(
                "glyph {} '{}': h={:.1} cy={:.1} dots={}",
                m.index,
                m.char,
                m.height_px,
                m.center_y,
                m.dot_count
            );
            out.push(m);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::BoundingBox;
    use crate::test_utils::{render_dot_matrix_block, render_solid_block};
    use image::Luma;

    #[test]
    fn counts_micro_points_per_glyph() {
        let mut img = GrayImage::from_pixel(120, 60, Luma([210]));
        render_dot_matrix_block(&mut img, 10, 10, 4, 6, 5, 3, 40);
        render_solid_block(&mut img, 60, 10, 20, 30, 40);
        let glyphs = vec![
            RawGlyph::new("8", BoundingBox::new(8.0, 8.0, 22.0, 32.0), 0.9, 0),
            RawGlyph::new("B", BoundingBox::new(58.0, 8.0, 24.0, 34.0), 0.9, 1),
        ];
        let cfg = FeatureConfig::default();
        let metrics = GeometricFeatureExtractor::new(&cfg).extract(&img, &glyphs);
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].dot_count, 24);
        assert_eq!(metrics[1].dot_count, 1);
        assert_eq!(metrics[1].index, 1);
        assert_eq!(metrics[0].center_y, 24.0);
        assert_eq!(metrics[1].height_px, 34.0);
    }

    #[test]
    fn word_tokens_yield_one_metric_per_character() {
        let img = GrayImage::from_pixel(100, 40, Luma([200]));
        let glyphs = vec![
            RawGlyph::new("MD-0", BoundingBox::new(0.0, 0.0, 30.0, 20.0), 0.9, 0),
            RawGlyph::new("-", BoundingBox::new(30.0, 0.0, 5.0, 20.0), 0.9, 1),
            RawGlyph::new("9", BoundingBox::new(40.0, 2.0, 10.0, 20.0), 0.9, 2),
        ];
        let cfg = FeatureConfig::default();
        let metrics = GeometricFeatureExtractor::new(&cfg).extract(&img, &glyphs);
        let chars: String = metrics.iter().map(|m| m.char).collect();
        assert_eq!(chars, "MD09");
        assert_eq!(metrics[3].index, 3);
        assert_eq!(metrics[3].center_y, 12.0);
    }

    #[test]
    fn boxes_outside_the_image_have_no_dots() {
        let img = GrayImage::from_pixel(20, 20, Luma([200]));
        let glyphs = vec![RawGlyph::new("1", BoundingBox::new(50.0, 50.0, 5.0, 5.0), 0.9, 0)];
        let cfg = FeatureConfig::default();
        let metrics = GeometricFeatureExtractor::new(&cfg).extract(&img, &glyphs);
        assert_eq!(metrics[0].dot_count, 0);
    }
}
