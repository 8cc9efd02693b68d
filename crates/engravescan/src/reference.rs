//! Visual comparison of the code prefix against known-genuine reference
//! images.
//!
//! References are grayscale crops of the leading characters of a genuine
//! code, keyed by catalog prefix and manufacture year. A lookup falls back to
//! neighbouring years and then to a year-less default.

use std::collections::BTreeMap;
use std::path::Path;

use image::GrayImage;

use crate::glyph::{BoundingBox, RawGlyph};
use crate::imaging;

/// Year offsets tried after the exact year, in order.
const YEAR_FALLBACKS: [i32; 4] = [1, -1, 2, -2];
/// Directory holding references valid for any year.
const DEFAULT_DIR: &str = "default";

/// Prefix comparison settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VisualMatchConfig {
    /// Leading characters cropped from the submitted image.
    pub prefix_chars: usize,
    /// Pixels added around the union of their boxes.
    pub crop_margin: u32,
    /// Both crops are resized to this size before comparison.
    pub compare_width: u32,
    pub compare_height: u32,
    /// SSIM strictly above this is compatible.
    pub ssim_threshold: f32,
}

impl Default for VisualMatchConfig {
    fn default() -> Self {
        Self {
            prefix_chars: 3,
            crop_margin: 5,
            compare_width: 200,
            compare_height: 100,
            ssim_threshold: 0.55,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Compatible,
    Divergent,
}

/// Outcome of one prefix comparison.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VisualMatch {
    /// Structural similarity scaled to [-100, 100].
    pub similarity: f32,
    pub status: MatchStatus,
}

/// Reference crops keyed by prefix and optional year.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    images: BTreeMap<(String, Option<i32>), GrayImage>,
}

impl ReferenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a reference. `year = None` is the default for the prefix.
    pub fn insert(&mut self, prefix: &str, year: Option<i32>, image: GrayImage) {
        self.images.insert((prefix.to_ascii_uppercase(), year), image);
    }

    /// Exact year, then years ±1 and ±2, then the default.
    pub fn lookup(&self, prefix: &str, year: i32) -> Option<&GrayImage> {
        let prefix = prefix.to_ascii_uppercase();
        std::iter::once(0)
            .chain(YEAR_FALLBACKS)
            .map(|delta| Some(year + delta))
            .chain(std::iter::once(None))
            .find_map(|y| self.images.get(&(prefix.clone(), y)))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Load `<dir>/<year>/<PREFIX>.<png|jpg|jpeg>` and
    /// `<dir>/default/<PREFIX>.<ext>`. Other entries are ignored.
    pub fn from_dir(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut library = Self::new();
        let mut year_dirs: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        year_dirs.sort();
        for year_dir in year_dirs {
            let name = year_dir
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let year = if name.eq_ignore_ascii_case(DEFAULT_DIR) {
                None
            } else if let Ok(y) = name.parse::<i32>() {
                Some(y)
            } else {
                tracing::debug!("skipping reference directory {}", year_dir.display());
                continue;
            };
            for entry in std::fs::read_dir(&year_dir)? {
                let path = entry?.path();
                let is_image = path.extension().and_then(|e| e.to_str()).is_some_and(|e| {
                    ["png", "jpg", "jpeg"]
                        .iter()
                        .any(|ext| e.eq_ignore_ascii_case(ext))
                });
                let Some(prefix) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if !is_image || prefix.is_empty() {
                    continue;
                }
                let gray = image::open(&path)?.to_luma8();
                library.insert(prefix, year, gray);
            }
        }
        tracing::info!(
            "loaded {} reference images from {}",
            library.len(),
            dir.display()
        );
        Ok(library)
    }
}

/// Compares the prefix region of a submitted image with a reference crop.
#[derive(Debug, Clone, Copy)]
pub struct VisualMatcher<'a> {
    config: &'a VisualMatchConfig,
}

impl<'a> VisualMatcher<'a> {
    pub fn new(config: &'a VisualMatchConfig) -> Self {
        Self { config }
    }

    /// Crop spanning the first `prefix_chars` characters plus margin.
    pub fn prefix_crop(&self, gray: &GrayImage, glyphs: &[RawGlyph]) -> Option<GrayImage> {
        let corners: Vec<[f32; 2]> = glyphs
            .iter()
            .flat_map(RawGlyph::char_boxes)
            .take(self.config.prefix_chars)
            .flat_map(|(_, b)| [[b.x, b.y], [b.x + b.width, b.y + b.height]])
            .collect();
        if corners.len() < 2 * self.config.prefix_chars {
            return None;
        }
        let (w, h) = gray.dimensions();
        let rect = BoundingBox::from_points(&corners)?.pixel_rect(w, h, self.config.crop_margin)?;
        Some(imaging::crop(gray, rect))
    }

    /// Structural similarity of two crops at comparison size.
    pub fn compare(&self, crop: &GrayImage, reference: &GrayImage) -> Option<VisualMatch> {
        let empty = |g: &GrayImage| g.width() == 0 || g.height() == 0;
        if empty(crop) || empty(reference) {
            return None;
        }
        let (cw, ch) = (self.config.compare_width, self.config.compare_height);
        let score = imaging::ssim(
            &imaging::resize_to(crop, cw, ch),
            &imaging::resize_to(reference, cw, ch),
        )? as f32;
        let status = if score > self.config.ssim_threshold {
            MatchStatus::Compatible
        } else {
            MatchStatus::Divergent
        };
        tracing::debug!("prefix SSIM {:.3} -> {:?}", score, status);
        Some(VisualMatch {
            similarity: score * 100.0,
            status,
        })
    }

    /// Crop the prefix of `gray` and compare it with `reference`.
    pub fn match_glyphs(
        &self,
        gray: &GrayImage,
        glyphs: &[RawGlyph],
        reference: &GrayImage,
    ) -> Option<VisualMatch> {
        self.compare(&self.prefix_crop(gray, glyphs)?, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render_code, render_noise};

    #[test]
    fn lookup_prefers_exact_then_near_years_then_default() {
        let mut lib = ReferenceLibrary::new();
        lib.insert("md09e1", Some(2015), GrayImage::new(1, 1));
        lib.insert("MD09E1", Some(2012), GrayImage::new(2, 2));
        lib.insert("MD09E1", None, GrayImage::new(3, 3));
        let width = |year| lib.lookup("MD09E1", year).map(|g| g.width());
        assert_eq!(width(2015), Some(1));
        assert_eq!(width(2014), Some(1));
        // 2013: -1 reaches 2012 before +2 reaches 2015.
        assert_eq!(width(2013), Some(2));
        assert_eq!(width(2011), Some(2));
        assert_eq!(width(2030), Some(3));
        assert!(lib.lookup("KD08E2", 2015).is_none());
    }

    #[test]
    fn same_prefix_is_compatible() {
        let cfg = VisualMatchConfig::default();
        let matcher = VisualMatcher::new(&cfg);
        let (img, glyphs) = render_code("MD09E1B215797", 50, 70, 10);
        let reference = matcher.prefix_crop(&img, &glyphs).expect("crop");
        // Three 50 px glyphs and two 10 px gaps, plus 5 px on each side.
        assert_eq!(reference.dimensions(), (180, 80));
        let m = matcher.match_glyphs(&img, &glyphs, &reference).expect("match");
        assert_eq!(m.status, MatchStatus::Compatible);
        assert!(m.similarity > 99.0, "similarity {}", m.similarity);
    }

    #[test]
    fn unrelated_reference_is_divergent() {
        let cfg = VisualMatchConfig::default();
        let matcher = VisualMatcher::new(&cfg);
        let (img, glyphs) = render_code("MD09E1B215797", 50, 70, 10);
        let m = matcher
            .match_glyphs(&img, &glyphs, &render_noise(180, 80, 5))
            .expect("match");
        assert_eq!(m.status, MatchStatus::Divergent);
    }

    #[test]
    fn too_few_glyphs_give_no_match() {
        let cfg = VisualMatchConfig::default();
        let matcher = VisualMatcher::new(&cfg);
        let (img, glyphs) = render_code("MD", 50, 70, 10);
        assert!(matcher.prefix_crop(&img, &glyphs).is_none());
        assert!(matcher.compare(&img, &GrayImage::new(0, 0)).is_none());
    }

    #[test]
    fn loads_year_and_default_directories() {
        let dir = std::env::temp_dir().join(format!("engravescan-refs-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("2015")).expect("mkdir");
        std::fs::create_dir_all(dir.join("default")).expect("mkdir");
        std::fs::create_dir_all(dir.join("misc")).expect("mkdir");
        let (img, _) = render_code("MD0", 50, 70, 10);
        img.save(dir.join("2015").join("MD09E1.png")).expect("save");
        img.save(dir.join("default").join("KD08E2.png")).expect("save");
        std::fs::write(dir.join("2015").join("notes.txt"), "x").expect("write");

        let lib = ReferenceLibrary::from_dir(&dir).expect("load");
        assert_eq!(lib.len(), 2);
        assert!(lib.lookup("MD09E1", 2016).is_some());
        assert!(lib.lookup("KD08E2", 1999).is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
