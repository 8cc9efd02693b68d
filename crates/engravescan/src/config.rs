//! Top-level inspection configuration.

use std::path::Path;

use crate::anomaly::AnomalyConfig;
use crate::code::{NormalizerConfig, ParserConfig, ANCHORED_PREFIX_LEN, SERIAL_BODY_START};
use crate::engraving::EngravingConfig;
use crate::glyph::{FeatureConfig, VerifierConfig};
use crate::reference::VisualMatchConfig;
use crate::risk::RiskConfig;

/// Every tunable threshold of an analysis, grouped per stage.
///
/// Missing sections and fields fall back to the calibration defaults, so a
/// partial JSON document only needs to name what it overrides.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InspectConfig {
    pub normalizer: NormalizerConfig,
    pub parser: ParserConfig,
    pub features: FeatureConfig,
    pub engraving: EngravingConfig,
    pub anomaly: AnomalyConfig,
    pub verifier: VerifierConfig,
    pub visual: VisualMatchConfig,
    pub risk: RiskConfig,
    /// First manufacture year expected to carry laser marking.
    pub transition_year: i32,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            parser: ParserConfig::default(),
            features: FeatureConfig::default(),
            engraving: EngravingConfig::default(),
            anomaly: AnomalyConfig::default(),
            verifier: VerifierConfig::default(),
            visual: VisualMatchConfig::default(),
            risk: RiskConfig::default(),
            transition_year: 2010,
        }
    }
}

impl InspectConfig {
    pub fn from_json_str(data: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Reject combinations no stage can work with.
    pub fn validate(&self) -> Result<(), String> {
        let bands = &self.risk.bands;
        if !(bands.regular_max < bands.attention_max && bands.attention_max < bands.suspect_max)
        {
            return Err(format!(
                "verdict bands must increase: {} < {} < {}",
                bands.regular_max, bands.attention_max, bands.suspect_max
            ));
        }
        if bands.suspect_max >= 100 {
            return Err("suspect band must end below 100".to_string());
        }
        if self.normalizer.min_correction_len < ANCHORED_PREFIX_LEN {
            return Err(format!(
                "min_correction_len {} must be at least {}",
                self.normalizer.min_correction_len, ANCHORED_PREFIX_LEN
            ));
        }
        if self.normalizer.min_serial_correction_len <= SERIAL_BODY_START {
            return Err(format!(
                "min_serial_correction_len {} must exceed {}",
                self.normalizer.min_serial_correction_len, SERIAL_BODY_START
            ));
        }
        if self.verifier.template_width == 0 || self.verifier.template_height == 0 {
            return Err("template size must be non-zero".to_string());
        }
        if self.parser.min_code_len > self.parser.max_code_len {
            return Err(format!(
                "min_code_len {} exceeds max_code_len {}",
                self.parser.min_code_len, self.parser.max_code_len
            ));
        }
        if self.visual.prefix_chars == 0 {
            return Err("visual.prefix_chars must be at least 1".to_string());
        }
        if self.visual.compare_width < 7 || self.visual.compare_height < 7 {
            return Err("visual comparison size must be at least 7x7".to_string());
        }
        if !(-1.0..=1.0).contains(&self.visual.ssim_threshold) {
            return Err("visual.ssim_threshold must lie in [-1, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.verifier.correlation_weight) {
            return Err("correlation_weight must lie in [0, 1]".to_string());
        }
        if self.engraving.stamped_max_score >= self.engraving.laser_min_score {
            return Err(format!(
                "stamped_max_score {} must be below laser_min_score {}",
                self.engraving.stamped_max_score, self.engraving.laser_min_score
            ));
        }
        Ok(())
    }
}
