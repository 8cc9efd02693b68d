//! Structured opinion from an external vision reviewer.
//!
//! The reviewer itself (a remote model behind the HTTP layer) is out of scope;
//! this crate only consumes its answer through [`OpinionProvider`].

use std::time::Duration;

use crate::engraving::EngravingType;
use crate::error::OpinionError;

/// Adulteration signals an external reviewer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdulterationFlag {
    /// Remnants of a previous, ground-off engraving.
    GhostNumbers,
    /// Laser and stamped characters in the same code.
    MixedEngraving,
    /// Individual characters that do not follow the official font.
    GlyphShape,
    Misalignment,
    SurfaceAbrasion,
    /// The code looks different from known-genuine references.
    DifferentFromOriginals,
}

impl AdulterationFlag {
    pub fn label(&self) -> &'static str {
        match self {
            Self::GhostNumbers => "ghost numbers",
            Self::MixedEngraving => "mixed engraving",
            Self::GlyphShape => "glyph shape",
            Self::Misalignment => "misalignment",
            Self::SurfaceAbrasion => "surface abrasion",
            Self::DifferentFromOriginals => "different from originals",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExternalOpinion {
    pub detected_type: Option<EngravingType>,
    pub adulteration_flags: Vec<AdulterationFlag>,
    pub ghost_numbers_observed: Option<bool>,
    pub mixed_engraving_observed: Option<bool>,
    /// Reviewer self-reported confidence in [0, 1].
    pub confidence: f32,
}

impl ExternalOpinion {
    /// Parse and validate a JSON payload.
    pub fn from_json_str(data: &str) -> Result<Self, OpinionError> {
        let opinion: Self =
            serde_json::from_str(data).map_err(|e| OpinionError::Malformed(e.to_string()))?;
        opinion.validate()?;
        Ok(opinion)
    }

    /// Reject payloads whose confidence lies outside [0, 1] (NaN included).
    pub fn validate(&self) -> Result<(), OpinionError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(OpinionError::Malformed(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Engraving type the reviewer saw, when confident enough to override the
    /// image classifier.
    pub fn scored_type(&self, min_confidence: f32) -> Option<EngravingType> {
        self.detected_type
            .filter(|t| *t != EngravingType::Unknown && self.confidence >= min_confidence)
    }

    pub fn has_flag(&self, flag: AdulterationFlag) -> bool {
        self.adulteration_flags.contains(&flag)
    }

    pub fn claims_ghost_numbers(&self) -> bool {
        self.ghost_numbers_observed == Some(true) || self.has_flag(AdulterationFlag::GhostNumbers)
    }

    pub fn claims_mixed_engraving(&self) -> bool {
        self.mixed_engraving_observed == Some(true)
            || self.has_flag(AdulterationFlag::MixedEngraving)
    }

    pub fn claims_glyph_shape(&self) -> bool {
        self.has_flag(AdulterationFlag::GlyphShape)
    }
}

/// What a provider gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct OpinionRequest<'a> {
    /// Encoded image bytes, when the caller has them.
    pub image_bytes: Option<&'a [u8]>,
    pub expected_year: i32,
    pub expected_type: EngravingType,
    /// Normalized code text.
    pub code: &'a str,
}

/// Source of an [`ExternalOpinion`].
///
/// Implementations own all I/O and must give up after `timeout`.
pub trait OpinionProvider: Send + Sync {
    fn fetch(
        &self,
        request: &OpinionRequest<'_>,
        timeout: Duration,
    ) -> Result<ExternalOpinion, OpinionError>;
}

impl<F> OpinionProvider for F
where
    F: Fn(&OpinionRequest<'_>, Duration) -> Result<ExternalOpinion, OpinionError> + Send + Sync,
{
    fn fetch(
        &self,
        request: &OpinionRequest<'_>,
        timeout: Duration,
    ) -> Result<ExternalOpinion, OpinionError> {
        self(request, timeout)
    }
}
