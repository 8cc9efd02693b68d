//! Robust-statistics outlier detection over per-glyph metrics.

use crate::engraving::EngravingType;
use crate::glyph::GlyphMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    Critical,
}

/// What a finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    VerticalMisalignment,
    DensityOutlier,
    EngravingTypeMismatch,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnomalyFinding {
    pub char: char,
    /// 1-based glyph position; 0 for whole-image findings.
    pub position: usize,
    pub severity: Severity,
    pub kind: FindingKind,
    pub reason: String,
}

/// Outlier tolerances.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Below this many glyphs no statistics are attempted.
    pub min_glyphs: usize,
    /// Allowed centerline deviation as a fraction of the median height.
    pub alignment_tolerance: f32,
    /// Allowed dot-count deviation as a fraction of the median count.
    pub density_tolerance: f32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_glyphs: 3,
            alignment_tolerance: 0.15,
            density_tolerance: 0.30,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlignmentAnomalyDetector<'a> {
    config: &'a AnomalyConfig,
}

impl<'a> AlignmentAnomalyDetector<'a> {
    pub fn new(config: &'a AnomalyConfig) -> Self {
        Self { config }
    }

    /// Flag centerline outliers, plus dot-density outliers for laser marks.
    pub fn detect(&self, metrics: &[GlyphMetrics], engraving: EngravingType) -> Vec<AnomalyFinding> {
        if metrics.len() < self.config.min_glyphs {
            tracing::debug!("{} glyphs, skipping alignment statistics", metrics.len());
            return Vec::new();
        }
        let mut findings = self.alignment_findings(metrics);
        if engraving == EngravingType::Laser {
            findings.extend(self.density_findings(metrics));
        }
        findings
    }

    fn alignment_findings(&self, metrics: &[GlyphMetrics]) -> Vec<AnomalyFinding> {
        let centers: Vec<f32> = metrics
            .iter()
            .map(|m| m.center_y)
            .filter(|&c| c > 0.0)
            .collect();
        let heights: Vec<f32> = metrics
            .iter()
            .map(|m| m.height_px)
            .filter(|&h| h > 0.0)
            .collect();
        let (Some(median_center), Some(median_height)) = (median(&centers), median(&heights)) else {
            return Vec::new();
        };
        let tolerance = median_height * self.config.alignment_tolerance;

        metrics
            .iter()
            .filter(|m| m.center_y > 0.0)
            .filter_map(|m| {
                let deviation = (m.center_y - median_center).abs();
                (deviation > tolerance).then(|| AnomalyFinding {
                    char: m.char,
                    position: m.index + 1,
                    severity: Severity::Medium,
                    kind: FindingKind::VerticalMisalignment,
                    reason: format!(
                        "vertical misalignment: {:.1}px off the median centerline (tolerance {:.1}px)",
                        deviation, tolerance
                    ),
                })
            })
            .collect()
    }

    fn density_findings(&self, metrics: &[GlyphMetrics]) -> Vec<AnomalyFinding> {
        let dots: Vec<f32> = metrics.iter().map(|m| m.dot_count as f32).collect();
        let median_dots = median(&dots).unwrap_or(0.0);
        if median_dots <= 0.0 {
            return Vec::new();
        }
        let tolerance = median_dots * self.config.density_tolerance;

        metrics
            .iter()
            .filter_map(|m| {
                let delta = m.dot_count as f32 - median_dots;
                if delta.abs() <= tolerance {
                    return None;
                }
                let direction = if delta > 0.0 { "above" } else { "below" };
                Some(AnomalyFinding {
                    char: m.char,
                    position: m.index + 1,
                    severity: Severity::Low,
                    kind: FindingKind::DensityOutlier,
                    reason: format!(
                        "dot density {} median: {} vs {:.1}",
                        direction, m.dot_count, median_dots
                    ),
                })
            })
            .collect()
    }
}

/// Whole-image finding when the detected technique contradicts the year.
pub fn engraving_consistency(
    detected: EngravingType,
    expected: EngravingType,
    year: i32,
) -> Option<AnomalyFinding> {
    if detected == expected || detected == EngravingType::Unknown || expected == EngravingType::Unknown
    {
        return None;
    }
    Some(AnomalyFinding {
        char: '*',
        position: 0,
        severity: Severity::Critical,
        kind: FindingKind::EngravingTypeMismatch,
        reason: format!(
            "engraving type mismatch: detected {} but {} expected for {}",
            detected, expected, year
        ),
    })
}

/// Median with the mean of the two middle values for even lengths.
fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(f32::total_cmp);
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 0 {
        0.5 * (v[mid - 1] + v[mid])
    } else {
        v[mid]
    })
}
