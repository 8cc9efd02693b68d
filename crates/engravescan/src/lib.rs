//! engravescan: forensic analysis of engraved engine serial numbers.
//!
//! Given a photograph of an engraved code, the OCR glyphs found on it and the
//! claimed manufacture year, the crate produces a bounded fraud-risk score.
//! The stages are:
//!
//! 1. **Code** – OCR pass selection, line-order repair, position-anchored
//!    confusion fixes, catalog/regex parsing into prefix and serial.
//! 2. **Engraving** – whole-image texture scorecard: laser vs. stamped.
//! 3. **Geometry** – per-glyph height, centerline and micro-point count,
//!    followed by robust outlier detection.
//! 4. **Font** – per-glyph correlation against reference templates plus a
//!    hole-topology check.
//! 5. **Reference** – structural similarity of the prefix against a
//!    known-genuine image of the same prefix and year.
//! 6. **Risk** – evidence classes combined into one score and verdict,
//!    optionally informed by an external reviewer's opinion.
//!
//! # Public API
//! - [`Inspector`] and [`InspectionRequest`] as primary entry points
//! - [`InspectConfig`] for tuning every threshold
//! - [`ReferenceContext`] for loading catalogs, glyph templates and
//!   reference images
//! - the per-stage components for callers that only need one stage
//!
//! The core performs no I/O per request; only the explicit startup loaders
//! read files.

mod anomaly;
mod api;
mod code;
mod config;
mod context;
mod engraving;
mod error;
mod glyph;
mod imaging;
mod pipeline;
mod reference;
mod risk;

#[cfg(test)]
pub(crate) mod test_utils;

pub use anomaly::{
    engraving_consistency, AlignmentAnomalyDetector, AnomalyConfig, AnomalyFinding, FindingKind,
    Severity,
};
pub use api::Inspector;
pub use code::{
    apply_position_corrections, code_similarity, high_risk_positions, is_high_risk_char,
    CodeNormalizer, CodeParser, ModelInfo, NormalizedCode, NormalizerConfig, ParserConfig,
    PrefixCatalog, PrefixEntry, FAMILY_LEN, HIGH_RISK_CHARS,
};
pub use config::InspectConfig;
pub use context::ReferenceContext;
pub use engraving::{
    expected_type, EngravingClassification, EngravingClassifier, EngravingConfig,
    EngravingFeatures, EngravingType, ScoreBand, Tier,
};
pub use error::{InputError, OpinionError};
pub use glyph::{
    default_shape_rules, BoundingBox, FeatureConfig, FontTemplateVerifier,
    GeometricFeatureExtractor, GlyphCrop, GlyphMetrics, GlyphShapeRule, GlyphVerification,
    HoleSignature, RawGlyph, ReferenceTemplate, TemplateSet, VerifierConfig,
};
pub use imaging::{load_image, Polarity};
pub use pipeline::{Analysis, AnalysisReport, InspectionRequest};
pub use reference::{MatchStatus, ReferenceLibrary, VisualMatch, VisualMatchConfig, VisualMatcher};
pub use risk::{
    AdulterationFlag, Contribution, ContributionCombine, EvidenceClass, ExternalOpinion,
    OpinionProvider, OpinionRequest, RiskAggregator, RiskAssessment, RiskConfig, RiskInputs,
    Verdict, VerdictBands,
};
