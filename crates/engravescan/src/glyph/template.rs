//! Reference glyph templates and their hole topology.

use std::collections::BTreeMap;
use std::path::Path;

use image::GrayImage;

use crate::imaging::{self, EnclosedHole, Polarity};

use super::VerifierConfig;

/// Enclosed-hole counts per vertical third of a glyph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HoleSignature {
    pub top: u8,
    pub middle: u8,
    pub bottom: u8,
}

impl HoleSignature {
    /// Bucket holes by the vertical third of their centroid in a glyph of
    /// height `height`.
    pub fn from_holes(holes: &[EnclosedHole], height: u32) -> Self {
        let h = height as f32;
        let mut sig = Self::default();
        for hole in holes {
            let cy = hole.centroid[1];
            let slot = if cy < h * 0.33 {
                &mut sig.top
            } else if cy > h * 0.66 {
                &mut sig.bottom
            } else {
                &mut sig.middle
            };
            *slot = slot.saturating_add(1);
        }
        sig
    }

    /// Measure the signature of an ink mask (ink = 255).
    pub fn measure(mask: &GrayImage, min_area: f64) -> Self {
        Self::from_holes(&imaging::enclosed_holes(mask, min_area), mask.height())
    }

    /// At least as many holes as `min` in every third.
    pub fn covers(&self, min: &HoleSignature) -> bool {
        self.top >= min.top && self.middle >= min.middle && self.bottom >= min.bottom
    }

    pub fn total(&self) -> u32 {
        self.top as u32 + self.middle as u32 + self.bottom as u32
    }
}

impl std::fmt::Display for HoleSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "top={} middle={} bottom={}", self.top, self.middle, self.bottom)
    }
}

/// One normalized reference glyph.
#[derive(Debug, Clone)]
pub struct ReferenceTemplate {
    pub char: char,
    /// Ink mask at template size (ink = 255).
    pub mask: GrayImage,
    /// Hole topology of the official glyph.
    pub holes: HoleSignature,
}

/// Reference templates keyed by character, all at one size.
///
/// Built once at startup; read-only afterwards.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    width: u32,
    height: u32,
    threshold: u8,
    min_hole_area: f64,
    templates: BTreeMap<char, ReferenceTemplate>,
}

impl TemplateSet {
    /// Empty set sized and thresholded per `config`.
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            width: config.template_width,
            height: config.template_height,
            threshold: config.template_threshold,
            min_hole_area: config.min_hole_area,
            templates: BTreeMap::new(),
        }
    }

    /// Add (or replace) the template for `ch` from a grayscale rendering of
    /// the official glyph: dark ink on a light background, any size.
    pub fn insert(&mut self, ch: char, gray: &GrayImage) -> Result<(), String> {
        let ch = ch.to_ascii_uppercase();
        if !ch.is_ascii_alphanumeric() {
            return Err(format!("template character '{ch}' is not alphanumeric"));
        }
        if gray.width() == 0 || gray.height() == 0 {
            return Err(format!("template image for '{ch}' is empty"));
        }
        let resized = imaging::resize_to(gray, self.width, self.height);
        let mask = imaging::threshold_mask(&resized, self.threshold, Polarity::DarkInk);
        if imaging::count_foreground(&mask) == 0 {
            return Err(format!("template image for '{ch}' has no ink"));
        }
        let holes = HoleSignature::measure(&mask, self.min_hole_area);
        tracing::debug!("template '{}': holes {}", ch, holes);
        self.templates.insert(ch, ReferenceTemplate { char: ch, mask, holes });
        Ok(())
    }

    /// Load `<CHAR>.png` files from a directory. Other files are ignored.
    pub fn from_dir(dir: &Path, config: &VerifierConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let mut set = Self::new(config);
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        paths.sort();
        for path in paths {
            let is_png = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let mut chars = stem.chars();
            let ch = match (chars.next(), chars.next()) {
                (Some(c), None) if is_png && c.is_ascii_alphanumeric() => c,
                _ => {
                    tracing::debug!("skipping non-template file {}", path.display());
                    continue;
                }
            };
            let gray = image::open(&path)?.to_luma8();
            set.insert(ch, &gray)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
        }
        tracing::info!(
            "loaded {} glyph templates from {}",
            set.len(),
            dir.display()
        );
        Ok(set)
    }

    pub fn get(&self, ch: char) -> Option<&ReferenceTemplate> {
        self.templates.get(&ch.to_ascii_uppercase())
    }

    /// Characters with a template, sorted.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.templates.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Template size `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn min_hole_area(&self) -> f64 {
        self.min_hole_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::render_glyph;

    #[test]
    fn hole_signature_follows_glyph_topology() {
        let cfg = VerifierConfig::default();
        let mut set = TemplateSet::new(&cfg);
        for ch in ['0', '1', '8', '6', '9'] {
            set.insert(ch, &render_glyph(ch, 100, 140)).expect("insert");
        }
        let sig = |c| set.get(c).expect("template").holes;
        assert_eq!(sig('0'), HoleSignature { top: 0, middle: 1, bottom: 0 });
        assert_eq!(sig('1'), HoleSignature::default());
        assert_eq!(sig('8'), HoleSignature { top: 1, middle: 0, bottom: 1 });
        assert_eq!(sig('6'), HoleSignature { top: 0, middle: 0, bottom: 1 });
        assert_eq!(sig('9'), HoleSignature { top: 1, middle: 0, bottom: 0 });
        assert_eq!(set.size(), (50, 70));
        assert_eq!(set.chars().collect::<String>(), "01689");
    }

    #[test]
    fn rejects_blank_and_invalid_templates() {
        let cfg = VerifierConfig::default();
        let mut set = TemplateSet::new(&cfg);
        let blank = GrayImage::from_pixel(10, 10, image::Luma([255]));
        assert!(set.insert('7', &blank).unwrap_err().contains("no ink"));
        assert!(set.insert('#', &render_glyph('1', 50, 70)).is_err());
        assert!(set.insert('7', &GrayImage::new(0, 0)).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn lowercase_lookup_hits_uppercase_template() {
        let cfg = VerifierConfig::default();
        let mut set = TemplateSet::new(&cfg);
        set.insert('e', &render_glyph('E', 50, 70)).expect("insert");
        assert!(set.get('E').is_some());
        assert!(set.get('e').is_some());
    }

    #[test]
    fn loads_png_directory() {
        let dir = std::env::temp_dir().join(format!("engravescan-templates-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        render_glyph('0', 50, 70).save(dir.join("0.png")).expect("save");
        render_glyph('8', 50, 70).save(dir.join("8.png")).expect("save");
        std::fs::write(dir.join("README.txt"), "not a template").expect("write");

        let set = TemplateSet::from_dir(&dir, &VerifierConfig::default()).expect("load");
        assert_eq!(set.len(), 2);
        assert_eq!(set.get('8').map(|t| t.holes.total()), Some(2));
        std::fs::remove_dir_all(&dir).ok();
    }
}
