//! Grayscale image helpers shared by the analysis stages.
//!
//! Masks are `GrayImage`s with foreground = 255 and background = 0, the
//! convention `imageproc::contours` expects.

use image::imageops::FilterType;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};

use crate::error::InputError;

/// Which side of the threshold is treated as engraving ("ink").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Engraving is darker than the surrounding metal.
    #[default]
    DarkInk,
    /// Engraving is brighter (e.g. reflective laser marks).
    LightInk,
}

/// Decode encoded image bytes (PNG/JPEG) into 8-bit grayscale.
pub fn load_image(bytes: &[u8]) -> Result<GrayImage, InputError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| InputError::UndecodableImage(e.to_string()))?;
    let gray = decoded.to_luma8();
    ensure_non_empty(&gray)?;
    Ok(gray)
}

pub fn ensure_non_empty(img: &GrayImage) -> Result<(), InputError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(InputError::EmptyImage);
    }
    Ok(())
}

/// Foreground mask at a fixed level. `DarkInk` keeps pixels `<= level`.
pub fn threshold_mask(img: &GrayImage, level: u8, polarity: Polarity) -> GrayImage {
    let mut out = GrayImage::new(img.width(), img.height());
    for (dst, src) in out.pixels_mut().zip(img.pixels()) {
        let ink = match polarity {
            Polarity::DarkInk => src.0[0] <= level,
            Polarity::LightInk => src.0[0] > level,
        };
        *dst = Luma([if ink { 255 } else { 0 }]);
    }
    out
}

/// Foreground mask at the Otsu level of `img`.
pub fn otsu_mask(img: &GrayImage, polarity: Polarity) -> GrayImage {
    let level = imageproc::contrast::otsu_level(img);
    tracing::trace!("otsu level {} ({}x{})", level, img.width(), img.height());
    threshold_mask(img, level, polarity)
}

/// Copy of the `[x0, y0, x1, y1)` rectangle.
pub fn crop(img: &GrayImage, rect: [u32; 4]) -> GrayImage {
    let [x0, y0, x1, y1] = rect;
    image::imageops::crop_imm(img, x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
        .to_image()
}

/// Bilinear resize to exactly `w`×`h`.
pub fn resize_to(img: &GrayImage, w: u32, h: u32) -> GrayImage {
    if img.dimensions() == (w, h) {
        return img.clone();
    }
    image::imageops::resize(img, w, h, FilterType::Triangle)
}

/// Side of the square SSIM window.
const SSIM_WINDOW: u32 = 7;

/// Mean structural similarity of two equally sized images, using uniform
/// 7x7 windows over the fully covered interior and sample covariance.
///
/// Returns `None` when the sizes differ or the images are smaller than one
/// window.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> Option<f64> {
    let (w, h) = a.dimensions();
    if b.dimensions() != (w, h) || w < SSIM_WINDOW || h < SSIM_WINDOW {
        return None;
    }
    let c1 = (0.01f64 * 255.0).powi(2);
    let c2 = (0.03f64 * 255.0).powi(2);
    let n = (SSIM_WINDOW * SSIM_WINDOW) as f64;
    let cov_norm = n / (n - 1.0);

    // Summed-area tables of x, y, x², y² and xy, (w + 1) x (h + 1).
    let stride = (w + 1) as usize;
    let mut tables = vec![[0.0f64; 5]; stride * (h + 1) as usize];
    for y in 0..h {
        for x in 0..w {
            let px = a.get_pixel(x, y).0[0] as f64;
            let py = b.get_pixel(x, y).0[0] as f64;
            let at = |xx: u32, yy: u32| yy as usize * stride + xx as usize;
            let (up, left, diag) = (tables[at(x + 1, y)], tables[at(x, y + 1)], tables[at(x, y)]);
            let vals = [px, py, px * px, py * py, px * py];
            let cell = &mut tables[at(x + 1, y + 1)];
            for k in 0..5 {
                cell[k] = vals[k] + up[k] + left[k] - diag[k];
            }
        }
    }
    let window_sum = |x0: u32, y0: u32| -> [f64; 5] {
        let (x1, y1) = (x0 + SSIM_WINDOW, y0 + SSIM_WINDOW);
        let at = |xx: u32, yy: u32| tables[yy as usize * stride + xx as usize];
        let (br, tr, bl, tl) = (at(x1, y1), at(x1, y0), at(x0, y1), at(x0, y0));
        std::array::from_fn(|k| br[k] - tr[k] - bl[k] + tl[k])
    };

    let mut total = 0.0;
    let mut count = 0usize;
    for y0 in 0..=(h - SSIM_WINDOW) {
        for x0 in 0..=(w - SSIM_WINDOW) {
            let [sx, sy, sxx, syy, sxy] = window_sum(x0, y0);
            let (ux, uy) = (sx / n, sy / n);
            let vx = cov_norm * (sxx / n - ux * ux);
            let vy = cov_norm * (syy / n - uy * uy);
            let vxy = cov_norm * (sxy / n - ux * uy);
            total += ((2.0 * ux * uy + c1) * (2.0 * vxy + c2))
                / ((ux * ux + uy * uy + c1) * (vx + vy + c2));
            count += 1;
        }
    }
    Some(total / count as f64)
}

pub fn count_foreground(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] > 0).count()
}

/// Polygon area (shoelace) of a traced contour.
pub fn contour_area(contour: &Contour<i32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let mut acc = 0i64;
    for (i, p) in pts.iter().enumerate() {
        let q = &pts[(i + 1) % pts.len()];
        acc += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    acc.unsigned_abs() as f64 * 0.5
}

fn contour_centroid(contour: &Contour<i32>) -> [f32; 2] {
    let n = contour.points.len().max(1) as f32;
    let (sx, sy) = contour
        .points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x as f32, sy + p.y as f32));
    [sx / n, sy / n]
}

/// Tight `[x0, y0, x1, y1)` box around all foreground pixels.
pub fn ink_extent(mask: &GrayImage) -> Option<[u32; 4]> {
    let mut extent: Option<[u32; 4]> = None;
    for (x, y, p) in mask.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        let e = extent.get_or_insert([x, y, x + 1, y + 1]);
        e[0] = e[0].min(x);
        e[1] = e[1].min(y);
        e[2] = e[2].max(x + 1);
        e[3] = e[3].max(y + 1);
    }
    extent
}

/// Outermost foreground components with contour area strictly above `min_area`.
pub fn count_external_blobs(mask: &GrayImage, min_area: f64) -> usize {
    find_contours::<i32>(mask)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| contour_area(c) > min_area)
        .count()
}

/// All traced borders (outer and hole) with area strictly inside `(lo, hi)`.
pub fn count_contours_in_range(mask: &GrayImage, lo: f64, hi: f64) -> usize {
    find_contours::<i32>(mask)
        .iter()
        .map(contour_area)
        .filter(|&a| a > lo && a < hi)
        .count()
}

/// Background region fully enclosed by foreground strokes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnclosedHole {
    /// Centroid in mask pixels.
    pub centroid: [f32; 2],
    pub area: f32,
}

/// Enclosed background regions of `mask` above `min_area`.
///
/// The mask is inverted so that background regions become components; a
/// component whose outer border has a parent is enclosed by ink, while the
/// open background touching the frame has none.
pub fn enclosed_holes(mask: &GrayImage, min_area: f64) -> Vec<EnclosedHole> {
    let mut inverted = mask.clone();
    for p in inverted.pixels_mut() {
        p.0[0] = if p.0[0] > 0 { 0 } else { 255 };
    }
    find_contours::<i32>(&inverted)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_some())
        .filter_map(|c| {
            let area = contour_area(c);
            (area > min_area).then(|| EnclosedHole {
                centroid: contour_centroid(c),
                area: area as f32,
            })
        })
        .collect()
}
