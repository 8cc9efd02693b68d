use crate::anomaly::AnomalyFinding;
use crate::code::NormalizedCode;
use crate::engraving::{EngravingClassification, EngravingType};
use crate::glyph::{GlyphMetrics, GlyphVerification};
use crate::reference::VisualMatch;
use crate::risk::{ExternalOpinion, RiskAssessment, Verdict};

/// Every intermediate of one completed analysis.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisReport {
    /// Image dimensions [width, height].
    pub image_size: [u32; 2],
    /// Raw reading of the selected OCR pass, before repair.
    pub ocr_text: String,
    pub code: NormalizedCode,
    pub expected_year: i32,
    pub expected_type: EngravingType,
    /// Engraving type used for scoring: a confident external opinion, else
    /// the image classifier.
    pub detected_type: EngravingType,
    pub engraving: EngravingClassification,
    pub metrics: Vec<GlyphMetrics>,
    pub findings: Vec<AnomalyFinding>,
    pub verifications: Vec<GlyphVerification>,
    /// 1-based positions of high-risk characters in the canonical code.
    pub high_risk_positions: Vec<usize>,
    /// Prefix comparison against a reference image, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_match: Option<VisualMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opinion: Option<ExternalOpinion>,
    /// Why the external opinion is missing, when a provider was asked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opinion_error: Option<String>,
    pub assessment: RiskAssessment,
}

/// Outcome of one analysis request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Analysis {
    Completed(Box<AnalysisReport>),
    /// The input could not be analyzed; no score is produced.
    Inconclusive { reason: String },
}

impl Analysis {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Inconclusive { .. } => None,
        }
    }

    pub fn score(&self) -> Option<u32> {
        self.report().map(|r| r.assessment.score)
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.report().map(|r| r.assessment.verdict)
    }
}
