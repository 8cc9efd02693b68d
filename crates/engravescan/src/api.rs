//! High-level analysis API.
//!
//! [`Inspector`] is the primary entry point. It holds the configuration, the
//! shared reference data and an optional opinion provider. Create once,
//! analyze many images, from as many threads as needed.

use std::path::Path;
use std::sync::Arc;

use image::GrayImage;

use crate::config::InspectConfig;
use crate::context::ReferenceContext;
use crate::error::InputError;
use crate::imaging;
use crate::pipeline::{self, Analysis, InspectionRequest, Stages};
use crate::risk::OpinionProvider;

/// Primary analysis interface.
///
/// # Examples
///
/// ```no_run
/// use engravescan::{BoundingBox, InspectionRequest, Inspector, RawGlyph};
///
/// let inspector = Inspector::new();
/// let bytes = std::fs::read("engine.jpg").unwrap();
/// let glyphs = vec![RawGlyph::new("MD09E1", BoundingBox::new(10.0, 12.0, 120.0, 30.0), 0.91, 0)];
/// let analysis = inspector.analyze_bytes(&bytes, &InspectionRequest::new(glyphs, 2015));
/// println!("{}", serde_json::to_string_pretty(&analysis).unwrap());
/// ```
#[derive(Clone)]
pub struct Inspector {
    config: InspectConfig,
    context: Arc<ReferenceContext>,
    provider: Option<Arc<dyn OpinionProvider>>,
}

impl std::fmt::Debug for Inspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inspector")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    /// Default configuration, embedded catalog, no glyph templates.
    pub fn new() -> Self {
        Self::with_config(InspectConfig::default())
    }

    /// Full config control with the embedded reference data.
    pub fn with_config(config: InspectConfig) -> Self {
        let context = Arc::new(ReferenceContext::embedded(&config.verifier));
        Self {
            config,
            context,
            provider: None,
        }
    }

    /// Config plus explicitly loaded reference data.
    pub fn with_context(config: InspectConfig, context: Arc<ReferenceContext>) -> Self {
        Self {
            config,
            context,
            provider: None,
        }
    }

    /// Load config JSON and use the embedded reference data.
    pub fn from_config_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::with_config(InspectConfig::from_json_file(path)?))
    }

    /// Attach a source of external opinions, used when a request carries none.
    pub fn with_opinion_provider(mut self, provider: Arc<dyn OpinionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(&self) -> &InspectConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut InspectConfig {
        &mut self.config
    }

    pub fn context(&self) -> &ReferenceContext {
        &self.context
    }

    /// Analyze a decoded grayscale image.
    pub fn analyze(&self, image: &GrayImage, request: &InspectionRequest) -> Analysis {
        self.finish(pipeline::run(image, None, request, &self.stages()))
    }

    /// Decode encoded image bytes (PNG, JPEG, ...) and analyze them.
    pub fn analyze_bytes(&self, bytes: &[u8], request: &InspectionRequest) -> Analysis {
        let result = imaging::load_image(bytes)
            .and_then(|gray| pipeline::run(&gray, Some(bytes), request, &self.stages()));
        self.finish(result)
    }

    fn stages(&self) -> Stages<'_> {
        Stages {
            config: &self.config,
            context: &self.context,
            provider: self.provider.as_deref(),
        }
    }

    fn finish(&self, result: Result<pipeline::AnalysisReport, InputError>) -> Analysis {
        match result {
            Ok(report) => Analysis::Completed(Box::new(report)),
            Err(e) => {
                tracing::warn!("analysis inconclusive: {}", e);
                Analysis::Inconclusive {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engraving::EngravingType;
    use crate::error::OpinionError;
    use crate::glyph::{BoundingBox, RawGlyph, TemplateSet};
    use crate::reference::{MatchStatus, ReferenceLibrary};
    use crate::risk::{AdulterationFlag, EvidenceClass, ExternalOpinion, OpinionRequest, Verdict};
    use crate::test_utils::{encode_png, render_code, render_glyph, render_noise};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn templated_inspector() -> Inspector {
        let config = InspectConfig::default();
        let mut templates = TemplateSet::new(&config.verifier);
        for ch in "0123456789BDEM".chars() {
            templates
                .insert(ch, &render_glyph(ch, 50, 70))
                .expect("template");
        }
        let context = ReferenceContext::new(crate::code::PrefixCatalog::default(), templates);
        Inspector::with_context(config, Arc::new(context))
    }

    #[test]
    fn inspector_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Inspector>();
    }

    #[test]
    fn config_mut_tunes_inspector() {
        let mut inspector = Inspector::new();
        inspector.config_mut().transition_year = 2005;
        assert_eq!(inspector.config().transition_year, 2005);
    }

    #[test]
    fn garbage_bytes_are_inconclusive() {
        let inspector = Inspector::new();
        let request = InspectionRequest::new(
            vec![RawGlyph::new("MD09E1", BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9, 0)],
            2015,
        );
        let analysis = inspector.analyze_bytes(b"\x00\x01not-an-image", &request);
        assert!(!analysis.is_completed());
        assert_eq!(analysis.score(), None);
        let json = serde_json::to_value(&analysis).expect("json");
        assert_eq!(json["status"], "INCONCLUSIVE");
        assert!(json.get("assessment").is_none());
    }

    #[test]
    fn empty_glyph_lists_are_inconclusive() {
        let inspector = Inspector::new();
        let (img, _) = render_code("MD09E1B215797", 20, 28, 4);
        let analysis = inspector.analyze(&img, &InspectionRequest::with_passes(vec![vec![], vec![]], 2015));
        match analysis {
            Analysis::Inconclusive { reason } => assert!(reason.contains("no OCR glyphs")),
            other => panic!("expected inconclusive, got {other:?}"),
        }
    }

    #[test]
    fn low_confidence_glyphs_only_are_inconclusive() {
        let inspector = Inspector::new();
        let (img, mut glyphs) = render_code("MD09E1B215797", 20, 28, 4);
        for g in &mut glyphs {
            g.ocr_confidence = 0.1;
        }
        let analysis = inspector.analyze(&img, &InspectionRequest::new(glyphs, 2015));
        assert_eq!(analysis.verdict(), None);
    }

    #[test]
    fn genuine_code_completes_with_parsed_report() {
        let inspector = templated_inspector();
        let (img, glyphs) = render_code("MD09E1B215797", 50, 70, 10);
        let bytes = encode_png(&img);
        let analysis = inspector.analyze_bytes(&bytes, &InspectionRequest::new(glyphs, 2015));
        let report = analysis.report().expect("completed");
        assert_eq!(report.code.prefix.as_deref(), Some("MD09E1"));
        assert_eq!(report.code.serial.as_deref(), Some("B215797"));
        assert!(report.code.valid);
        assert_eq!(report.metrics.len(), 13);
        assert_eq!(report.verifications.len(), 13);
        assert!(report
            .verifications
            .iter()
            .filter(|v| v.scored)
            .all(|v| v.gaps_match));
        assert!(report.findings.iter().all(|f| f.kind != crate::anomaly::FindingKind::VerticalMisalignment));
        // M, D, 0, 9, E, 1 ... : high-risk 0, 9, 1 inside the prefix.
        assert_eq!(&report.high_risk_positions[..3], &[3, 4, 6]);
        let json = serde_json::to_value(&analysis).expect("json");
        assert_eq!(json["status"], "COMPLETED");
        assert!(json["assessment"]["score"].as_u64().is_some());
    }

    #[test]
    fn default_inspector_checks_digit_shapes_without_templates() {
        let inspector = Inspector::new();
        let (img, glyphs) = render_code("MD09E1B215797", 50, 70, 10);
        let analysis = inspector.analyze(&img, &InspectionRequest::new(glyphs, 2015));
        let report = analysis.report().expect("completed");
        let scored: Vec<usize> = report
            .verifications
            .iter()
            .filter(|v| v.scored)
            .map(|v| v.position)
            .collect();
        assert_eq!(scored, vec![3, 4, 6, 8, 9, 10, 11, 12, 13]);
        assert!(report.verifications.iter().all(|v| !v.is_shape_violation()));
        assert!(report.verifications.iter().all(|v| v.similarity_score.is_none()));
    }

    #[test]
    fn substituted_glyph_raises_gap_mismatch() {
        let inspector = templated_inspector();
        // The metal shows an '8' where OCR (and the claim) say '0'.
        let (img, _) = render_code("MD09E1B215787", 50, 70, 10);
        let (_, glyphs) = render_code("MD09E1B215707", 50, 70, 10);
        let analysis = inspector.analyze(&img, &InspectionRequest::new(glyphs, 2015));
        let report = analysis.report().expect("completed");
        let mismatches: Vec<usize> = report
            .verifications
            .iter()
            .filter(|v| v.is_gap_mismatch())
            .map(|v| v.position)
            .collect();
        assert_eq!(mismatches, vec![12]);
        assert!(report.assessment.score >= 20);
    }

    #[test]
    fn reference_library_prefix_is_compared() {
        let (img, glyphs) = render_code("MD09E1B215797", 50, 70, 10);
        let config = InspectConfig::default();
        let genuine = crate::reference::VisualMatcher::new(&config.visual)
            .prefix_crop(&img, &glyphs)
            .expect("crop");
        let mut library = ReferenceLibrary::new();
        library.insert("MD09E1", Some(2014), genuine);
        let context = ReferenceContext::embedded(&config.verifier).with_references(library);
        let inspector = Inspector::with_context(config, Arc::new(context));

        let analysis = inspector.analyze(&img, &InspectionRequest::new(glyphs.clone(), 2015));
        let report = analysis.report().expect("completed");
        let visual = report.visual_match.as_ref().expect("compared");
        assert_eq!(visual.status, MatchStatus::Compatible);
        assert!(report
            .assessment
            .contributions
            .iter()
            .all(|c| c.class != EvidenceClass::VisualDivergence));

        // A request-supplied reference wins over the library.
        let request =
            InspectionRequest::new(glyphs, 2015).with_reference_image(render_noise(180, 80, 9));
        let analysis = inspector.analyze(&img, &request);
        let report = analysis.report().expect("completed");
        assert_eq!(report.visual_match.as_ref().map(|v| v.status), Some(MatchStatus::Divergent));
        assert!(report.assessment.score >= 30);
    }

    #[test]
    fn failing_provider_still_completes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let provider = move |req: &OpinionRequest<'_>, timeout: Duration| -> Result<ExternalOpinion, OpinionError> {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(timeout, Duration::from_millis(250));
            assert!(req.image_bytes.is_none());
            Err(OpinionError::Timeout)
        };
        let inspector = Inspector::new().with_opinion_provider(Arc::new(provider));
        let (img, glyphs) = render_code("MD09E1B215797", 20, 28, 4);
        let mut request = InspectionRequest::new(glyphs, 2015);
        request.opinion_timeout_ms = 250;
        let analysis = inspector.analyze(&img, &request);
        let report = analysis.report().expect("completed");
        assert!(report.opinion.is_none());
        assert_eq!(report.opinion_error.as_deref(), Some("external opinion timed out"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_opinion_wins_over_provider() {
        let provider = |_: &OpinionRequest<'_>, _: Duration| -> Result<ExternalOpinion, OpinionError> {
            Err(OpinionError::Unavailable("should not be called".to_string()))
        };
        let inspector = Inspector::new().with_opinion_provider(Arc::new(provider));
        let (img, glyphs) = render_code("MD09E1B215797", 20, 28, 4);
        let opinion = ExternalOpinion {
            detected_type: Some(EngravingType::Stamped),
            adulteration_flags: vec![AdulterationFlag::MixedEngraving],
            confidence: 0.9,
            ..ExternalOpinion::default()
        };
        let analysis = inspector.analyze(&img, &InspectionRequest::new(glyphs, 2015).with_opinion(opinion));
        let report = analysis.report().expect("completed");
        assert!(report.opinion_error.is_none());
        assert!(report.assessment.score >= 80);
        assert_eq!(report.assessment.verdict, Verdict::HighSuspicion);
    }
}
