//! Synthetic image renderers shared by unit tests.

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::glyph::{BoundingBox, RawGlyph};

pub(crate) const INK: u8 = 30;
pub(crate) const PAPER: u8 = 230;

/// Fill an axis-aligned rectangle, clipped to the image.
pub(crate) fn draw_rect(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
    let x1 = (x + w).min(img.width());
    let y1 = (y + h).min(img.height());
    for yy in y.min(y1)..y1 {
        for xx in x.min(x1)..x1 {
            img.put_pixel(xx, yy, Luma([value]));
        }
    }
}

pub(crate) fn encode_png(img: &GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageLuma8(img.clone())
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("png encoding");
    buf
}

/// Grid of square dots, the way a micro-point laser marks a character.
#[allow(clippy::too_many_arguments)]
pub(crate) fn render_dot_matrix_block(
    img: &mut GrayImage,
    x0: u32,
    y0: u32,
    cols: u32,
    rows: u32,
    pitch: u32,
    dot: u32,
    value: u8,
) {
    for r in 0..rows {
        for c in 0..cols {
            draw_rect(img, x0 + c * pitch, y0 + r * pitch, dot, dot, value);
        }
    }
}

/// One continuous stroke area, the way a stamp marks a character.
pub(crate) fn render_solid_block(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
    draw_rect(img, x, y, w, h, value);
}

/// Seven-segment layout: a top, b top-right, c bottom-right, d bottom,
/// e bottom-left, f top-left, g middle, s serif left of the top of b.
fn segments(ch: char) -> &'static str {
    match ch.to_ascii_uppercase() {
        '0' | 'D' | 'O' => "abcdef",
        '1' => "bcs",
        'I' => "bc",
        '2' => "abged",
        '3' => "abgcd",
        '4' => "fgbc",
        '5' | 'S' => "afgcd",
        '6' => "afgedc",
        '7' => "abc",
        '8' | 'B' => "abcdefg",
        '9' => "abfgcd",
        'A' => "abcefg",
        'C' => "adef",
        'E' => "adefg",
        'F' => "aefg",
        'H' | 'X' | 'K' => "bcefg",
        'L' => "def",
        'P' => "abefg",
        'U' | 'V' | 'W' => "bcdef",
        // M, N and the rest: an open arch.
        _ => "abcef",
    }
}

/// Dark seven-segment glyph on a light background, `w` x `h` pixels.
pub(crate) fn render_glyph(ch: char, w: u32, h: u32) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([PAPER]));
    draw_glyph(&mut img, ch, 0, 0, w, h);
    img
}

fn draw_glyph(img: &mut GrayImage, ch: char, ox: u32, oy: u32, w: u32, h: u32) {
    let mh = w / 10;
    let mv = h / 28;
    let t = (w * 16 / 100).max(1);
    let (x0, x1) = (ox + mh, ox + w - mh);
    let (y0, y1) = (oy + mv, oy + h - mv);
    let ym = oy + h / 2;
    let span = x1 - x0;
    for seg in segments(ch).chars() {
        match seg {
            'a' => draw_rect(img, x0, y0, span, t, INK),
            'b' => draw_rect(img, x1 - t, y0, t, ym - y0, INK),
            'c' => draw_rect(img, x1 - t, ym, t, y1 - ym, INK),
            'd' => draw_rect(img, x0, y1 - t, span, t, INK),
            'e' => draw_rect(img, x0, ym, t, y1 - ym, INK),
            'f' => draw_rect(img, x0, y0, t, ym - y0, INK),
            'g' => draw_rect(img, x0, ym - t / 2, span, t, INK),
            's' => draw_rect(img, x1 - 2 * t, y0, t, t, INK),
            _ => {}
        }
    }
}

/// Render `text` as one row of glyphs and return the matching OCR boxes.
///
/// Hyphens become a gap. Every glyph box carries confidence 0.95.
pub(crate) fn render_code(text: &str, glyph_w: u32, glyph_h: u32, gap: u32) -> (GrayImage, Vec<RawGlyph>) {
    let margin = gap.max(4);
    let n = text.chars().count() as u32;
    let width = 2 * margin + n * glyph_w + n.saturating_sub(1) * gap;
    let mut img = GrayImage::from_pixel(width, glyph_h + 2 * margin, Luma([PAPER]));
    let mut glyphs = Vec::new();
    for (i, ch) in text.chars().enumerate() {
        let x = margin + i as u32 * (glyph_w + gap);
        if ch == '-' {
            continue;
        }
        draw_glyph(&mut img, ch, x, margin, glyph_w, glyph_h);
        let bbox = BoundingBox::new(x as f32, margin as f32, glyph_w as f32, glyph_h as f32);
        glyphs.push(RawGlyph::new(&ch.to_string(), bbox, 0.95, glyphs.len()));
    }
    (img, glyphs)
}

/// Add zero-mean Gaussian noise (Box-Muller), clamped to `u8`.
pub(crate) fn add_gaussian_noise(img: &mut GrayImage, sigma: f32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for p in img.pixels_mut() {
        let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
        let u2: f32 = rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos();
        let v = p.0[0] as f32 + sigma * z;
        p.0[0] = v.round().clamp(0.0, 255.0) as u8;
    }
}

/// Uniform random pixels.
pub(crate) fn render_noise(w: u32, h: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    GrayImage::from_fn(w, h, |_, _| Luma([rng.gen::<u8>()]))
}
