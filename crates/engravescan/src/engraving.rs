//! Whole-image engraving technique classification (laser vs. stamped).
//!
//! Laser/micro-point marks show dense, thin, uniform edges, a quiet texture
//! and many tiny blobs; stamped marks show thick, shadowed strokes. Five
//! texture statistics feed a points scorecard.

use image::GrayImage;
use imageproc::distance_transform::Norm;

use crate::imaging::{self, Polarity};

/// Marking technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngravingType {
    Laser,
    Stamped,
    Unknown,
}

impl std::fmt::Display for EngravingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Laser => "LASER",
            Self::Stamped => "STAMPED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Earliest manufacture year with a technique expectation.
pub const MIN_PLAUSIBLE_YEAR: i32 = 1980;
/// Latest manufacture year with a technique expectation.
pub const MAX_PLAUSIBLE_YEAR: i32 = 2100;

/// Technique expected for a manufacture year. Implausible years carry no
/// expectation.
pub fn expected_type(year: i32, transition_year: i32) -> EngravingType {
    if !(MIN_PLAUSIBLE_YEAR..=MAX_PLAUSIBLE_YEAR).contains(&year) {
        return EngravingType::Unknown;
    }
    if year >= transition_year {
        EngravingType::Laser
    } else {
        EngravingType::Stamped
    }
}

/// Raw texture statistics of one image.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngravingFeatures {
    /// Fraction of Canny edge pixels.
    pub edge_density: f64,
    /// Dilated / (eroded + 1) edge pixel counts.
    pub thickness_ratio: f64,
    /// Variance of the image minus its Gaussian blur.
    pub texture_variance: f64,
    /// Coefficient of variation of the Sobel magnitude, std / (mean + 1).
    pub gradient_std: f64,
    /// Otsu-mask contours with area inside the small-contour window.
    pub small_contours: usize,
    pub laser_score: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngravingClassification {
    #[serde(rename = "type")]
    pub engraving_type: EngravingType,
    pub confidence: f32,
    pub features: EngravingFeatures,
}

/// Points awarded when a feature clears a threshold.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tier {
    pub threshold: f64,
    pub points: u32,
}

/// Two-tier scorecard line; `strong` is checked first.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoreBand {
    pub strong: Tier,
    pub weak: Tier,
}

impl ScoreBand {
    const fn new(strong: (f64, u32), weak: (f64, u32)) -> Self {
        Self {
            strong: Tier {
                threshold: strong.0,
                points: strong.1,
            },
            weak: Tier {
                threshold: weak.0,
                points: weak.1,
            },
        }
    }

    fn above(&self, v: f64) -> u32 {
        if v > self.strong.threshold {
            self.strong.points
        } else if v > self.weak.threshold {
            self.weak.points
        } else {
            0
        }
    }

    fn below(&self, v: f64) -> u32 {
        if v < self.strong.threshold {
            self.strong.points
        } else if v < self.weak.threshold {
            self.weak.points
        } else {
            0
        }
    }
}

/// Engraving classifier thresholds and scorecard.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngravingConfig {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Sigma of the texture blur (matches a 5x5 kernel).
    pub blur_sigma: f32,
    /// Open interval of contour areas counted as micro-points.
    pub small_contour_area: [f64; 2],
    /// Higher edge density favors laser.
    pub edge_density: ScoreBand,
    /// Lower thickness ratio favors laser.
    pub thickness_ratio: ScoreBand,
    /// Lower texture variance favors laser.
    pub texture_variance: ScoreBand,
    /// Lower gradient spread favors laser.
    pub gradient_std: ScoreBand,
    /// More micro-points favor laser.
    pub small_contours: ScoreBand,
    /// Scores at or above this classify as laser.
    pub laser_min_score: u32,
    /// Scores at or below this classify as stamped.
    pub stamped_max_score: u32,
    pub max_confidence: f32,
    pub unknown_confidence: f32,
}

impl Default for EngravingConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            blur_sigma: 1.1,
            small_contour_area: [5.0, 100.0],
            edge_density: ScoreBand::new((0.08, 25), (0.05, 15)),
            thickness_ratio: ScoreBand::new((2.0, 25), (2.5, 15)),
            texture_variance: ScoreBand::new((300.0, 20), (500.0, 10)),
            gradient_std: ScoreBand::new((1.2, 15), (1.5, 8)),
            small_contours: ScoreBand::new((100.0, 15), (50.0, 8)),
            laser_min_score: 65,
            stamped_max_score: 35,
            max_confidence: 0.95,
            unknown_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngravingClassifier<'a> {
    config: &'a EngravingConfig,
}

impl<'a> EngravingClassifier<'a> {
    pub fn new(config: &'a EngravingConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, gray: &GrayImage) -> EngravingClassification {
        let mut features = self.measure(gray);
        features.laser_score = self.score(&features);
        let (engraving_type, confidence) = self.decide(features.laser_score);
        tracing::debug!(
            "engraving features: edge={:.4} thick={:.2} var={:.1} grad={:.2} small={} score={}",
            features.edge_density,
            features.thickness_ratio,
            features.texture_variance,
            features.gradient_std,
            features.small_contours,
            features.laser_score
        );
        EngravingClassification {
            engraving_type,
            confidence,
            features,
        }
    }

    /// Texture statistics without scoring (`laser_score` is left at 0).
    pub fn measure(&self, gray: &GrayImage) -> EngravingFeatures {
        let cfg = self.config;
        let n = (gray.width() as f64 * gray.height() as f64).max(1.0);

        let edges = imageproc::edges::canny(gray, cfg.canny_low, cfg.canny_high);
        let edge_px = imaging::count_foreground(&edges);
        let dilated = imageproc::morphology::dilate(&edges, Norm::LInf, 1);
        let eroded = imageproc::morphology::erode(&edges, Norm::LInf, 1);
        let thickness_ratio = imaging::count_foreground(&dilated) as f64
            / (imaging::count_foreground(&eroded) as f64 + 1.0);

        let blurred = imageproc::filter::gaussian_blur_f32(gray, cfg.blur_sigma);
        let residuals: Vec<f64> = gray
            .pixels()
            .zip(blurred.pixels())
            .map(|(a, b)| a.0[0] as f64 - b.0[0] as f64)
            .collect();
        let (_, texture_variance) = mean_and_variance(&residuals);

        let gx = imageproc::gradients::horizontal_sobel(gray);
        let gy = imageproc::gradients::vertical_sobel(gray);
        let magnitudes: Vec<f64> = gx
            .pixels()
            .zip(gy.pixels())
            .map(|(x, y)| (x.0[0] as f64).hypot(y.0[0] as f64))
            .collect();
        let (g_mean, g_var) = mean_and_variance(&magnitudes);
        let gradient_std = g_var.sqrt() / (g_mean + 1.0);

        let bright = imaging::otsu_mask(gray, Polarity::LightInk);
        let [lo, hi] = cfg.small_contour_area;
        let small_contours = imaging::count_contours_in_range(&bright, lo, hi);

        EngravingFeatures {
            edge_density: edge_px as f64 / n,
            thickness_ratio,
            texture_variance,
            gradient_std,
            small_contours,
            laser_score: 0,
        }
    }

    /// Scorecard total in [0, 100].
    pub fn score(&self, f: &EngravingFeatures) -> u32 {
        let cfg = self.config;
        let total = cfg.edge_density.above(f.edge_density)
            + cfg.thickness_ratio.below(f.thickness_ratio)
            + cfg.texture_variance.below(f.texture_variance)
            + cfg.gradient_std.below(f.gradient_std)
            + cfg.small_contours.above(f.small_contours as f64);
        total.min(100)
    }

    /// Map a laser score to a type and confidence.
    pub fn decide(&self, laser_score: u32) -> (EngravingType, f32) {
        let cfg = self.config;
        let s = laser_score as f32;
        if laser_score >= cfg.laser_min_score {
            (EngravingType::Laser, (s / 100.0).min(cfg.max_confidence))
        } else if laser_score <= cfg.stamped_max_score {
            (
                EngravingType::Stamped,
                ((100.0 - s) / 100.0).min(cfg.max_confidence),
            )
        } else {
            (EngravingType::Unknown, cfg.unknown_confidence)
        }
    }
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render_dot_matrix_block, render_solid_block};
    use approx::assert_abs_diff_eq;
    use image::Luma;

    fn features(edge: f64, thick: f64, var: f64, grad: f64, small: usize) -> EngravingFeatures {
        EngravingFeatures {
            edge_density: edge,
            thickness_ratio: thick,
            texture_variance: var,
            gradient_std: grad,
            small_contours: small,
            laser_score: 0,
        }
    }

    #[test]
    fn expected_type_follows_transition_year() {
        assert_eq!(expected_type(2020, 2010), EngravingType::Laser);
        assert_eq!(expected_type(2010, 2010), EngravingType::Laser);
        assert_eq!(expected_type(2009, 2010), EngravingType::Stamped);
        assert_eq!(expected_type(1979, 2010), EngravingType::Unknown);
        assert_eq!(expected_type(2101, 2010), EngravingType::Unknown);
    }

    #[test]
    fn laser_like_features_classify_as_laser() {
        let cfg = EngravingConfig::default();
        let c = EngravingClassifier::new(&cfg);
        let f = features(0.12, 1.8, 150.0, 1.0, 140);
        assert_eq!(c.score(&f), 100);
        let (t, conf) = c.decide(c.score(&f));
        assert_eq!(t, EngravingType::Laser);
        assert_abs_diff_eq!(conf, 0.95, epsilon = 1e-6);
    }

    #[test]
    fn stamped_like_features_classify_as_stamped() {
        let cfg = EngravingConfig::default();
        let c = EngravingClassifier::new(&cfg);
        let f = features(0.03, 3.1, 900.0, 1.4, 20);
        assert_eq!(c.score(&f), 8);
        let (t, conf) = c.decide(8);
        assert_eq!(t, EngravingType::Stamped);
        assert_abs_diff_eq!(conf, 0.92, epsilon = 1e-6);
    }

    #[test]
    fn weak_tiers_and_band_edges() {
        let cfg = EngravingConfig::default();
        let c = EngravingClassifier::new(&cfg);
        // Exactly on the strong thresholds only earns the weak tier.
        let f = features(0.08, 2.0, 300.0, 1.2, 100);
        assert_eq!(c.score(&f), 15 + 15 + 10 + 8 + 8);
        assert_eq!(c.decide(65).0, EngravingType::Laser);
        assert_eq!(c.decide(64).0, EngravingType::Unknown);
        assert_eq!(c.decide(36).0, EngravingType::Unknown);
        assert_eq!(c.decide(35).0, EngravingType::Stamped);
        assert_abs_diff_eq!(c.decide(50).1, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn flat_image_has_no_edges_and_is_inconclusive() {
        let cfg = EngravingConfig::default();
        let c = EngravingClassifier::new(&cfg);
        let img = GrayImage::from_pixel(64, 48, Luma([128]));
        let result = c.classify(&img);
        assert_eq!(result.features.edge_density, 0.0);
        assert_eq!(result.features.small_contours, 0);
        assert_abs_diff_eq!(result.features.texture_variance, 0.0, epsilon = 1e-9);
        // Thickness, texture and gradient all sit in the laser-favoring tiers.
        assert_eq!(result.features.laser_score, 60);
        assert_eq!(result.engraving_type, EngravingType::Unknown);
    }

    #[test]
    fn micro_points_raise_small_contour_count() {
        let cfg = EngravingConfig::default();
        let c = EngravingClassifier::new(&cfg);
        let mut dots = GrayImage::from_pixel(120, 80, Luma([210]));
        render_dot_matrix_block(&mut dots, 6, 6, 18, 11, 6, 4, 40);
        let mut solid = GrayImage::from_pixel(120, 80, Luma([210]));
        render_solid_block(&mut solid, 10, 10, 30, 50, 40);
        render_solid_block(&mut solid, 60, 10, 30, 50, 40);

        let fd = c.measure(&dots);
        let fs = c.measure(&solid);
        assert!(fd.small_contours >= 150, "dots {}", fd.small_contours);
        assert_eq!(fs.small_contours, 0);
        assert!(fd.edge_density > fs.edge_density);
    }
}
