//! Per-glyph shape and topology verification against reference templates.

use std::collections::BTreeMap;

use image::GrayImage;

use crate::code::is_high_risk_char;
use crate::imaging::{self, Polarity};

use super::shape::{default_shape_rules, ink_aspect, left_openings, GlyphShapeRule};
use super::template::{HoleSignature, ReferenceTemplate, TemplateSet};
use super::RawGlyph;

/// Template verification settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub template_width: u32,
    pub template_height: u32,
    /// Fixed binarization level for template images.
    pub template_threshold: u8,
    /// Ink side of glyph crops.
    pub crop_polarity: Polarity,
    /// Fixed binarization level for crops; `None` uses the crop's Otsu level.
    pub crop_threshold: Option<u8>,
    /// Pixels added around each glyph box when cutting crops.
    pub crop_margin: u32,
    /// Holes at or below this area (template pixels) are noise.
    pub min_hole_area: f64,
    /// Minimum similarity in [0, 1] for ordinary characters.
    pub similarity_threshold: f32,
    /// Minimum similarity in [0, 1] for high-risk characters.
    pub high_risk_threshold: f32,
    /// Weight of normalized cross-correlation; the pixel-agreement term gets
    /// the remainder.
    pub correlation_weight: f32,
    /// Per-character shape rules, checked with or without a template.
    pub shape_rules: BTreeMap<char, GlyphShapeRule>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            template_width: 50,
            template_height: 70,
            template_threshold: 127,
            crop_polarity: Polarity::DarkInk,
            crop_threshold: None,
            crop_margin: 3,
            min_hole_area: 20.0,
            similarity_threshold: 0.55,
            high_risk_threshold: 0.65,
            correlation_weight: 0.6,
            shape_rules: default_shape_rules(),
        }
    }
}

/// Grayscale cut-out of one claimed character.
#[derive(Debug, Clone)]
pub struct GlyphCrop {
    pub char: char,
    /// 1-based position in the code.
    pub position: usize,
    pub image: GrayImage,
}

/// Verification outcome for one glyph.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GlyphVerification {
    pub char: char,
    pub position: usize,
    /// Similarity to the reference template in [0, 100]; `None` without a
    /// template.
    pub similarity_score: Option<f32>,
    /// Whether the crop's hole topology equals the template's and meets the
    /// character's shape rule.
    pub gaps_match: bool,
    /// Ink width / height of the crop.
    pub aspect_ratio: Option<f32>,
    /// Whether the aspect ratio lies in the character's rule range.
    pub aspect_ok: bool,
    pub issues: Vec<String>,
    pub high_risk: bool,
    /// False when no comparison was possible (no template or empty crop).
    pub scored: bool,
    pub holes: Option<HoleSignature>,
    pub expected_holes: Option<HoleSignature>,
}

impl GlyphVerification {
    fn excluded(crop: &GlyphCrop, issue: &str) -> Self {
        Self {
            char: crop.char,
            position: crop.position,
            similarity_score: None,
            gaps_match: true,
            aspect_ratio: None,
            aspect_ok: true,
            issues: vec![issue.to_string()],
            high_risk: is_high_risk_char(crop.char),
            scored: false,
            holes: None,
            expected_holes: None,
        }
    }

    /// Scored and the topology differs from the template.
    pub fn is_gap_mismatch(&self) -> bool {
        self.scored && !self.gaps_match
    }

    /// Scored and either the topology or the proportions are off.
    pub fn is_shape_violation(&self) -> bool {
        self.scored && !(self.gaps_match && self.aspect_ok)
    }
}

pub const ISSUE_LOW_SIMILARITY: &str = "low similarity";
pub const ISSUE_GAP_MISMATCH: &str = "gap mismatch - possible substitution";
pub const ISSUE_ASPECT_RATIO: &str = "aspect ratio out of range";
pub const ISSUE_NO_TEMPLATE: &str = "no reference template";
pub const ISSUE_EMPTY_CROP: &str = "empty glyph crop";

/// Compares glyph crops with the reference font.
#[derive(Debug, Clone, Copy)]
pub struct FontTemplateVerifier<'a> {
    templates: &'a TemplateSet,
    config: &'a VerifierConfig,
}

impl<'a> FontTemplateVerifier<'a> {
    pub fn new(templates: &'a TemplateSet, config: &'a VerifierConfig) -> Self {
        Self { templates, config }
    }

    /// Cut one crop per alphanumeric character, padded by `crop_margin` and
    /// clamped to the image. Boxes outside the image yield empty crops.
    pub fn crops_from_glyphs(&self, gray: &GrayImage, glyphs: &[RawGlyph]) -> Vec<GlyphCrop> {
        let (w, h) = gray.dimensions();
        glyphs
            .iter()
            .flat_map(RawGlyph::char_boxes)
            .enumerate()
            .map(|(i, (ch, bbox))| GlyphCrop {
                char: ch,
                position: i + 1,
                image: bbox
                    .pixel_rect(w, h, self.config.crop_margin)
                    .map(|rect| imaging::crop(gray, rect))
                    .unwrap_or_default(),
            })
            .collect()
    }

    pub fn verify_all(&self, crops: &[GlyphCrop]) -> Vec<GlyphVerification> {
        crops.iter().map(|c| self.verify(c)).collect()
    }

    /// Verify one crop against the template and shape rule of its claimed
    /// character.
    pub fn verify(&self, crop: &GlyphCrop) -> GlyphVerification {
        let template = self.templates.get(crop.char);
        let rule = self.config.shape_rules.get(&crop.char.to_ascii_uppercase());
        if template.is_none() && rule.is_none() {
            return GlyphVerification::excluded(crop, ISSUE_NO_TEMPLATE);
        }
        if crop.image.width() == 0 || crop.image.height() == 0 {
            return GlyphVerification::excluded(crop, ISSUE_EMPTY_CROP);
        }

        let mask = self.crop_mask(&crop.image);
        let holes = HoleSignature::measure(&mask, self.templates.min_hole_area());
        let high_risk = is_high_risk_char(crop.char);
        let mut issues = Vec::new();
        let mut gaps_match = true;

        let similarity = template.map(|t| self.similarity(&mask, t));
        if let (Some(template), Some(similarity)) = (template, similarity) {
            let threshold = if high_risk {
                self.config.high_risk_threshold
            } else {
                self.config.similarity_threshold
            };
            if similarity < threshold {
                issues.push(format!(
                    "{}: {:.1} < {:.1}",
                    ISSUE_LOW_SIMILARITY,
                    similarity * 100.0,
                    threshold * 100.0
                ));
            }
            gaps_match = holes == template.holes;
        }

        let aspect_ratio = ink_aspect(&self.binarize(&crop.image));
        let mut aspect_ok = true;
        if let Some(rule) = rule {
            let openings = left_openings(&mask);
            if !holes.covers(&rule.min_holes) || openings < rule.min_left_openings {
                gaps_match = false;
            }
            if let Some(aspect) = aspect_ratio {
                if !rule.aspect_ok(aspect) {
                    aspect_ok = false;
                    issues.push(format!(
                        "{}: {:.2} not in {:.2}-{:.2}",
                        ISSUE_ASPECT_RATIO, aspect, rule.aspect_range[0], rule.aspect_range[1]
                    ));
                }
            }
        }
        if !gaps_match {
            issues.push(ISSUE_GAP_MISMATCH.to_string());
        }

        let expected_holes = template.map(|t| t.holes).or(rule.map(|r| r.min_holes));
        tracing::trace!(
            "glyph {} '{}': similarity={:?} holes [{}] aspect={:?}",
            crop.position,
            crop.char,
            similarity,
            holes,
            aspect_ratio
        );

        GlyphVerification {
            char: crop.char,
            position: crop.position,
            similarity_score: similarity.map(|s| s * 100.0),
            gaps_match,
            aspect_ratio,
            aspect_ok,
            issues,
            high_risk,
            scored: true,
            holes: Some(holes),
            expected_holes,
        }
    }

    /// Crop resized to template size and binarized to an ink mask.
    fn crop_mask(&self, crop: &GrayImage) -> GrayImage {
        let (tw, th) = self.templates.size();
        self.binarize(&imaging::resize_to(crop, tw, th))
    }

    fn binarize(&self, img: &GrayImage) -> GrayImage {
        match self.config.crop_threshold {
            Some(level) => imaging::threshold_mask(img, level, self.config.crop_polarity),
            None => imaging::otsu_mask(img, self.config.crop_polarity),
        }
    }

    /// Weighted blend of correlation and pixel agreement, in [0, 1].
    fn similarity(&self, mask: &GrayImage, template: &ReferenceTemplate) -> f32 {
        let ncc = normalized_correlation(mask, &template.mask);
        let diff: f64 = mask
            .pixels()
            .zip(template.mask.pixels())
            .map(|(a, b)| (a.0[0] as f64 - b.0[0] as f64).abs())
            .sum();
        let n = (mask.width() * mask.height()).max(1) as f64;
        let pixel_agreement = 1.0 - diff / n / 255.0;
        let w = self.config.correlation_weight as f64;
        let s = w * ncc.max(0.0) + (1.0 - w) * pixel_agreement;
        s.clamp(0.0, 1.0) as f32
    }
}

/// Pearson correlation of two equally sized images; 0 when either is flat.
fn normalized_correlation(a: &GrayImage, b: &GrayImage) -> f64 {
    let n = a.as_raw().len().min(b.as_raw().len());
    if n == 0 {
        return 0.0;
    }
    let (ra, rb) = (&a.as_raw()[..n], &b.as_raw()[..n]);
    let mean = |v: &[u8]| v.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
    let (ma, mb) = (mean(ra), mean(rb));
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (&x, &y) in ra.iter().zip(rb) {
        let (dx, dy) = (x as f64 - ma, y as f64 - mb);
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    let denom = (saa * sbb).sqrt();
    if denom < 1e-9 {
        return 0.0;
    }
    sab / denom
}
