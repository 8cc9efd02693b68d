//! Stage orchestration: normalize → parse → classify → features/anomalies →
//! glyph verification → opinion → risk.

use std::time::Duration;

use image::GrayImage;

use crate::anomaly::{engraving_consistency, AlignmentAnomalyDetector};
use crate::code::{high_risk_positions, rotate_items, CodeNormalizer, CodeParser};
use crate::config::InspectConfig;
use crate::context::ReferenceContext;
use crate::engraving::{expected_type, EngravingClassifier};
use crate::error::{InputError, OpinionError};
use crate::glyph::{FontTemplateVerifier, GeometricFeatureExtractor, RawGlyph};
use crate::imaging;
use crate::reference::VisualMatcher;
use crate::risk::{ExternalOpinion, OpinionProvider, OpinionRequest, RiskAggregator, RiskInputs};

use super::result::AnalysisReport;

const DEFAULT_OPINION_TIMEOUT_MS: u64 = 20_000;

fn default_opinion_timeout_ms() -> u64 {
    DEFAULT_OPINION_TIMEOUT_MS
}

/// Per-request inputs besides the image.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InspectionRequest {
    /// Independent OCR passes over the same image (e.g. raw and enhanced).
    pub passes: Vec<Vec<RawGlyph>>,
    /// Claimed manufacture year.
    pub expected_year: i32,
    /// Opinion supplied by the caller; takes precedence over any provider.
    #[serde(default)]
    pub opinion: Option<ExternalOpinion>,
    /// Deadline handed to the opinion provider.
    #[serde(default = "default_opinion_timeout_ms")]
    pub opinion_timeout_ms: u64,
    /// Genuine prefix crop to compare against instead of a library lookup.
    #[serde(skip)]
    pub reference_image: Option<GrayImage>,
}

impl InspectionRequest {
    /// Single OCR pass.
    pub fn new(glyphs: Vec<RawGlyph>, expected_year: i32) -> Self {
        Self::with_passes(vec![glyphs], expected_year)
    }

    pub fn with_passes(passes: Vec<Vec<RawGlyph>>, expected_year: i32) -> Self {
        Self {
            passes,
            expected_year,
            opinion: None,
            opinion_timeout_ms: DEFAULT_OPINION_TIMEOUT_MS,
            reference_image: None,
        }
    }

    pub fn with_opinion(mut self, opinion: ExternalOpinion) -> Self {
        self.opinion = Some(opinion);
        self
    }

    pub fn with_reference_image(mut self, reference: GrayImage) -> Self {
        self.reference_image = Some(reference);
        self
    }

    pub fn opinion_timeout(&self) -> Duration {
        Duration::from_millis(self.opinion_timeout_ms)
    }
}

/// Everything a run reads besides the request.
pub(crate) struct Stages<'a> {
    pub config: &'a InspectConfig,
    pub context: &'a ReferenceContext,
    pub provider: Option<&'a dyn OpinionProvider>,
}

/// Run every stage on a decoded image.
pub(crate) fn run(
    gray: &GrayImage,
    image_bytes: Option<&[u8]>,
    request: &InspectionRequest,
    stages: &Stages<'_>,
) -> Result<AnalysisReport, InputError> {
    let config = stages.config;
    let catalog = stages.context.catalog();
    imaging::ensure_non_empty(gray)?;
    if request.passes.iter().all(Vec::is_empty) {
        return Err(InputError::EmptyGlyphList);
    }

    // Code text.
    let normalizer = CodeNormalizer::new(catalog, &config.normalizer);
    let best = normalizer.best_pass(&request.passes);
    if best.is_empty() {
        return Err(InputError::NoUsableGlyphs);
    }
    let ocr_text: String = best.iter().flat_map(RawGlyph::clean_chars).collect();
    let normalized = normalizer.normalize_text(&ocr_text);
    let glyphs = aligned_glyphs(&best, normalizer.find_rotation(&ocr_text), &normalized);
    let code = CodeParser::new(catalog, &config.parser).parse(&normalized);
    tracing::info!(
        "code '{}' -> '{}' (valid={}, confidence {:.2}, {} issue(s))",
        ocr_text,
        normalized,
        code.valid,
        code.confidence,
        code.issues.len()
    );

    // Engraving technique.
    let engraving = EngravingClassifier::new(&config.engraving).classify(gray);
    let expected = expected_type(request.expected_year, config.transition_year);
    tracing::info!(
        "engraving {} (confidence {:.2}, laser score {}), expected {} for {}",
        engraving.engraving_type,
        engraving.confidence,
        engraving.features.laser_score,
        expected,
        request.expected_year
    );

    // External opinion.
    let (opinion, opinion_error) = match (&request.opinion, stages.provider) {
        (Some(op), _) => accept_opinion(Ok(op.clone())),
        (None, Some(provider)) => {
            let opinion_request = OpinionRequest {
                image_bytes,
                expected_year: request.expected_year,
                expected_type: expected,
                code: &normalized,
            };
            accept_opinion(provider.fetch(&opinion_request, request.opinion_timeout()))
        }
        (None, None) => (None, None),
    };
    let detected = opinion
        .as_ref()
        .and_then(|o| o.scored_type(config.risk.opinion_min_confidence))
        .unwrap_or(engraving.engraving_type);
    if detected != engraving.engraving_type {
        tracing::info!(
            "external opinion overrides engraving type {} -> {}",
            engraving.engraving_type,
            detected
        );
    }

    // Structural statistics.
    let metrics = GeometricFeatureExtractor::new(&config.features).extract(gray, &glyphs);
    let mut findings = AlignmentAnomalyDetector::new(&config.anomaly).detect(&metrics, detected);
    findings.extend(engraving_consistency(detected, expected, request.expected_year));
    tracing::info!("{} glyph metrics, {} finding(s)", metrics.len(), findings.len());

    // Font verification.
    let verifier = FontTemplateVerifier::new(stages.context.templates(), &config.verifier);
    let verifications = verifier.verify_all(&verifier.crops_from_glyphs(gray, &glyphs));
    tracing::info!(
        "{} glyph(s) verified, {} gap mismatch(es), {} shape violation(s)",
        verifications.iter().filter(|v| v.scored).count(),
        verifications.iter().filter(|v| v.is_gap_mismatch()).count(),
        verifications.iter().filter(|v| v.is_shape_violation()).count()
    );

    // Reference prefix image.
    let reference = request.reference_image.as_ref().or_else(|| {
        code.prefix
            .as_deref()
            .and_then(|p| stages.context.references().lookup(p, request.expected_year))
    });
    let visual_match = reference
        .and_then(|r| VisualMatcher::new(&config.visual).match_glyphs(gray, &glyphs, r));
    match &visual_match {
        Some(m) => tracing::info!("prefix vs reference: {:?} ({:.1})", m.status, m.similarity),
        None => tracing::debug!("no reference prefix comparison"),
    }

    let assessment = RiskAggregator::new(&config.risk).assess(&RiskInputs {
        code: &code,
        engraving: &engraving,
        expected_type: expected,
        findings: &findings,
        verifications: &verifications,
        opinion: opinion.as_ref(),
        visual: visual_match.as_ref(),
    });

    let risky_positions: Vec<usize> = code
        .canonical()
        .map(|c| high_risk_positions(&c).into_iter().map(|(i, _)| i + 1).collect())
        .unwrap_or_default();

    Ok(AnalysisReport {
        image_size: [gray.width(), gray.height()],
        ocr_text,
        code,
        expected_year: request.expected_year,
        expected_type: expected,
        detected_type: detected,
        engraving,
        metrics,
        findings,
        verifications,
        high_risk_positions: risky_positions,
        visual_match,
        opinion,
        opinion_error,
        assessment,
    })
}

/// Validate an opinion; failures are logged and reported, never fatal.
fn accept_opinion(
    fetched: Result<ExternalOpinion, OpinionError>,
) -> (Option<ExternalOpinion>, Option<String>) {
    match fetched.and_then(|op| op.validate().map(|()| op)) {
        Ok(op) => (Some(op), None),
        Err(e) => {
            tracing::warn!("continuing without external opinion: {}", e);
            (None, Some(e.to_string()))
        }
    }
}

/// One single-character glyph per code position, in normalized order and
/// labelled with the repaired characters.
///
/// Word tokens are split per character first. When the repaired text does not
/// line up with the boxes one to one, OCR labels are kept.
fn aligned_glyphs(
    ordered: &[RawGlyph],
    rotation: Option<std::ops::Range<usize>>,
    normalized: &str,
) -> Vec<RawGlyph> {
    let mut boxes: Vec<(char, f32, crate::glyph::BoundingBox)> = ordered
        .iter()
        .flat_map(|g| {
            g.char_boxes()
                .into_iter()
                .map(move |(ch, bbox)| (ch, g.ocr_confidence, bbox))
        })
        .collect();
    if let Some(span) = rotation.filter(|s| s.end <= boxes.len()) {
        boxes = rotate_items(&boxes, span);
    }
    let labels: Vec<char> = normalized.chars().collect();
    let relabel = labels.len() == boxes.len();
    if !relabel {
        tracing::debug!(
            "{} boxes vs {} normalized characters, keeping OCR labels",
            boxes.len(),
            labels.len()
        );
    }
    boxes
        .into_iter()
        .enumerate()
        .map(|(i, (ch, conf, bbox))| {
            let label = if relabel { labels[i] } else { ch };
            RawGlyph::new(&label.to_string(), bbox, conf, i)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::BoundingBox;

    fn row(text: &str) -> Vec<RawGlyph> {
        text.chars()
            .enumerate()
            .map(|(i, c)| {
                RawGlyph::new(
                    &c.to_string(),
                    BoundingBox::new(10.0 * i as f32, 0.0, 8.0, 12.0),
                    0.9,
                    i,
                )
            })
            .collect()
    }

    #[test]
    fn aligned_glyphs_follow_rotation_and_repair() {
        let glyphs = row("B215797MO09EI");
        let aligned = aligned_glyphs(&glyphs, Some(7..13), "MD09E1B215797");
        let text: String = aligned.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(text, "MD09E1B215797");
        // The repaired 'D' sits on the box that was read as 'O'.
        assert_eq!(aligned[1].bounding_box.x, 80.0);
        assert_eq!(aligned[6].bounding_box.x, 0.0);
        assert!(aligned.iter().enumerate().all(|(i, g)| g.sequence_index == i));
    }

    #[test]
    fn length_mismatch_keeps_ocr_labels() {
        let glyphs = row("MD09E1B2157");
        let aligned = aligned_glyphs(&glyphs, None, "MD09E1B21579");
        let text: String = aligned.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(text, "MD09E1B2157");
    }

    #[test]
    fn out_of_range_opinion_is_dropped() {
        let bad = ExternalOpinion {
            confidence: 3.0,
            ..ExternalOpinion::default()
        };
        let (opinion, error) = accept_opinion(Ok(bad));
        assert!(opinion.is_none());
        assert!(error.is_some_and(|e| e.contains("outside [0, 1]")));

        let good = ExternalOpinion {
            confidence: 0.6,
            ..ExternalOpinion::default()
        };
        assert_eq!(accept_opinion(Ok(good.clone())), (Some(good), None));
        assert_eq!(
            accept_opinion(Err(OpinionError::Timeout)).1.as_deref(),
            Some("external opinion timed out")
        );
    }

    #[test]
    fn request_json_defaults_timeout() {
        let req: InspectionRequest =
            serde_json::from_str(r#"{"passes": [[]], "expected_year": 2015}"#).expect("parse");
        assert_eq!(req.opinion_timeout(), Duration::from_millis(DEFAULT_OPINION_TIMEOUT_MS));
        assert!(req.opinion.is_none());
    }
}
