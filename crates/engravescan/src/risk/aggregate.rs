//! Evidence aggregation into one bounded score and verdict.

use crate::anomaly::{AnomalyFinding, Severity};
use crate::code::NormalizedCode;
use crate::engraving::{EngravingClassification, EngravingType};
use crate::glyph::GlyphVerification;
use crate::reference::{MatchStatus, VisualMatch};

use super::opinion::{AdulterationFlag, ExternalOpinion};

/// Final classification of a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Regular,
    Attention,
    Suspect,
    HighSuspicion,
}

/// Inclusive upper score bounds of the lower verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VerdictBands {
    pub regular_max: u32,
    pub attention_max: u32,
    pub suspect_max: u32,
}

impl Default for VerdictBands {
    fn default() -> Self {
        Self {
            regular_max: 10,
            attention_max: 30,
            suspect_max: 60,
        }
    }
}

impl VerdictBands {
    pub fn verdict(&self, score: u32) -> Verdict {
        if score <= self.regular_max {
            Verdict::Regular
        } else if score <= self.attention_max {
            Verdict::Attention
        } else if score <= self.suspect_max {
            Verdict::Suspect
        } else {
            Verdict::HighSuspicion
        }
    }
}

/// How per-class contributions are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionCombine {
    /// Strongest single evidence class.
    #[default]
    Max,
    /// Sum of all classes, capped at 100.
    Sum,
}

/// Named weights and caps of the scoring model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub format_issue_points: u32,
    pub format_issue_cap: u32,
    pub type_mismatch_points: u32,
    pub anomaly_points: u32,
    pub anomaly_cap: u32,
    pub gap_mismatch_points: u32,
    /// Prefix that looks unlike the genuine reference image.
    pub visual_divergence_points: u32,
    pub ghost_numbers_points: u32,
    pub mixed_engraving_points: u32,
    /// Glyph-shape claim backed by at least one gap mismatch.
    pub glyph_shape_points: u32,
    /// Ceiling of a glyph-shape claim without gap-mismatch support.
    pub glyph_shape_uncorroborated_cap: u32,
    /// Opinions below this confidence are noted but not scored.
    pub opinion_min_confidence: f32,
    /// Score floor whenever any CRITICAL finding exists.
    pub critical_floor: u32,
    pub combine: ContributionCombine,
    pub bands: VerdictBands,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            format_issue_points: 8,
            format_issue_cap: 25,
            type_mismatch_points: 10,
            anomaly_points: 5,
            anomaly_cap: 15,
            gap_mismatch_points: 20,
            visual_divergence_points: 30,
            ghost_numbers_points: 70,
            mixed_engraving_points: 80,
            glyph_shape_points: 50,
            glyph_shape_uncorroborated_cap: 35,
            opinion_min_confidence: 0.5,
            critical_floor: 85,
            combine: ContributionCombine::Max,
            bands: VerdictBands::default(),
        }
    }
}

/// Evidence classes, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceClass {
    FormatIssues,
    EngravingTypeMismatch,
    Anomalies,
    GapMismatches,
    VisualDivergence,
    ExternalOpinion,
}

/// Points one evidence class put on the table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Contribution {
    pub class: EvidenceClass,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RiskAssessment {
    /// Score in [0, 100].
    pub score: u32,
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub contributions: Vec<Contribution>,
}

/// Everything the aggregator looks at.
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs<'a> {
    pub code: &'a NormalizedCode,
    pub engraving: &'a EngravingClassification,
    pub expected_type: EngravingType,
    pub findings: &'a [AnomalyFinding],
    pub verifications: &'a [GlyphVerification],
    pub opinion: Option<&'a ExternalOpinion>,
    /// Prefix comparison against a reference image, when one was available.
    pub visual: Option<&'a VisualMatch>,
}

/// Pure scoring function over [`RiskInputs`].
#[derive(Debug, Clone, Copy)]
pub struct RiskAggregator<'a> {
    config: &'a RiskConfig,
}

impl<'a> RiskAggregator<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, inputs: &RiskInputs<'_>) -> RiskAssessment {
        let cfg = self.config;
        let mut reasons = Vec::new();
        let mut contributions = Vec::new();

        // Format issues.
        let issues = &inputs.code.issues;
        if !issues.is_empty() {
            let points = cfg
                .format_issue_points
                .saturating_mul(issues.len() as u32)
                .min(cfg.format_issue_cap);
            for issue in issues {
                reasons.push(format!("format: {issue}"));
            }
            contributions.push(Contribution {
                class: EvidenceClass::FormatIssues,
                points,
            });
        }

        // Engraving technique vs. manufacture year. A confident reviewer
        // overrides the image classifier.
        let detected = inputs
            .opinion
            .and_then(|o| o.scored_type(cfg.opinion_min_confidence))
            .unwrap_or(inputs.engraving.engraving_type);
        if detected != EngravingType::Unknown
            && inputs.expected_type != EngravingType::Unknown
            && detected != inputs.expected_type
        {
            reasons.push(format!(
                "engraving: detected {} where {} is expected",
                detected, inputs.expected_type
            ));
            contributions.push(Contribution {
                class: EvidenceClass::EngravingTypeMismatch,
                points: cfg.type_mismatch_points,
            });
        }

        // Structural anomalies.
        if !inputs.findings.is_empty() {
            let points = cfg
                .anomaly_points
                .saturating_mul(inputs.findings.len() as u32)
                .min(cfg.anomaly_cap);
            for f in inputs.findings {
                reasons.push(format!("anomaly [{:?}] position {}: {}", f.severity, f.position, f.reason));
            }
            contributions.push(Contribution {
                class: EvidenceClass::Anomalies,
                points,
            });
        }

        // Glyph topology and proportions.
        let gap_mismatches: Vec<&GlyphVerification> = inputs
            .verifications
            .iter()
            .filter(|v| v.is_shape_violation())
            .collect();
        if !gap_mismatches.is_empty() {
            for v in &gap_mismatches {
                let what = if v.gaps_match {
                    "proportions differ"
                } else {
                    "hole topology differs"
                };
                reasons.push(format!(
                    "glyph '{}' at position {}: {} from the reference font",
                    v.char, v.position, what
                ));
            }
            contributions.push(Contribution {
                class: EvidenceClass::GapMismatches,
                points: cfg
                    .gap_mismatch_points
                    .saturating_mul(gap_mismatches.len() as u32)
                    .min(100),
            });
        }

        if let Some(visual) = inputs.visual.filter(|v| v.status == MatchStatus::Divergent) {
            reasons.push(format!(
                "prefix diverges from the reference image (similarity {:.1})",
                visual.similarity
            ));
            contributions.push(Contribution {
                class: EvidenceClass::VisualDivergence,
                points: cfg.visual_divergence_points,
            });
        }

        if let Some(opinion) = inputs.opinion {
            if let Some(points) = self.opinion_points(opinion, !gap_mismatches.is_empty(), &mut reasons)
            {
                contributions.push(Contribution {
                    class: EvidenceClass::ExternalOpinion,
                    points,
                });
            }
        }

        let combined = match cfg.combine {
            ContributionCombine::Max => contributions.iter().map(|c| c.points).max().unwrap_or(0),
            ContributionCombine::Sum => contributions
                .iter()
                .fold(0u32, |acc, c| acc.saturating_add(c.points)),
        };
        let has_critical = inputs
            .findings
            .iter()
            .any(|f| f.severity == Severity::Critical);
        let mut score = combined.min(100);
        if has_critical && score < cfg.critical_floor {
            let critical = inputs
                .findings
                .iter()
                .filter(|f| f.severity == Severity::Critical)
                .count();
            reasons.push(format!(
                "{} critical finding(s): score raised to {}",
                critical, cfg.critical_floor
            ));
            score = cfg.critical_floor;
        }
        let score = score.min(100);
        let verdict = cfg.bands.verdict(score);
        tracing::info!(
            "risk score {} ({:?}) from {} evidence class(es)",
            score,
            verdict,
            contributions.len()
        );

        RiskAssessment {
            score,
            verdict,
            reasons,
            contributions,
        }
    }

    /// Strongest scored opinion item, if any. Unscored flags are only noted.
    fn opinion_points(
        &self,
        opinion: &ExternalOpinion,
        gap_mismatch_seen: bool,
        reasons: &mut Vec<String>,
    ) -> Option<u32> {
        let cfg = self.config;
        if opinion.confidence < cfg.opinion_min_confidence {
            reasons.push(format!(
                "external opinion noted, not scored (confidence {:.2} < {:.2})",
                opinion.confidence, cfg.opinion_min_confidence
            ));
            return None;
        }

        let mut best: Option<u32> = None;
        let mut take = |p: u32| best = Some(best.map_or(p, |b| b.max(p)));
        if opinion.claims_ghost_numbers() {
            reasons.push("external opinion: ghost numbers under the current code".to_string());
            take(cfg.ghost_numbers_points);
        }
        if opinion.claims_mixed_engraving() {
            reasons.push("external opinion: mixed engraving techniques".to_string());
            take(cfg.mixed_engraving_points);
        }
        if opinion.claims_glyph_shape() {
            let points = if gap_mismatch_seen {
                reasons.push("external opinion: glyph shape, corroborated by gap mismatch".to_string());
                cfg.glyph_shape_points
            } else {
                reasons.push("external opinion: glyph shape, uncorroborated".to_string());
                cfg.glyph_shape_points.min(cfg.glyph_shape_uncorroborated_cap)
            };
            take(points);
        }
        for flag in &opinion.adulteration_flags {
            if matches!(
                flag,
                AdulterationFlag::Misalignment
                    | AdulterationFlag::SurfaceAbrasion
                    | AdulterationFlag::DifferentFromOriginals
            ) {
                reasons.push(format!("external opinion noted: {}", flag.label()));
            }
        }
        best
    }
}
