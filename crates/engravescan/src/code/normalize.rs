//! OCR text normalization: reading order, pass selection, line-order repair
//! and position-anchored confusion fixes.

use std::ops::Range;

use crate::glyph::RawGlyph;

use super::catalog::PrefixCatalog;

/// Configuration for turning raw OCR passes into one candidate string.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Glyphs with OCR confidence below this floor are dropped.
    pub min_confidence: f32,
    /// Row grouping tolerance as a fraction of the median glyph height.
    pub row_merge_frac: f32,
    /// Candidates shorter than this are never reordered.
    pub min_reorder_len: usize,
    /// Candidates shorter than this get no position-anchored corrections.
    pub min_correction_len: usize,
    /// Serial-body digit corrections only apply to candidates at least this long.
    pub min_serial_correction_len: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            row_merge_frac: 0.5,
            min_reorder_len: 10,
            min_correction_len: 6,
            min_serial_correction_len: 13,
        }
    }
}

/// Shortest candidate covering every anchored prefix position.
pub(crate) const ANCHORED_PREFIX_LEN: usize = 6;
/// First serial-body index (0-based) subject to digit correction.
pub(crate) const SERIAL_BODY_START: usize = 7;
/// One past the last serial-body index subject to digit correction.
const SERIAL_BODY_END: usize = 14;

/// Merges and repairs raw OCR output. Never fails.
#[derive(Debug, Clone, Copy)]
pub struct CodeNormalizer<'a> {
    catalog: &'a PrefixCatalog,
    config: &'a NormalizerConfig,
}

impl<'a> CodeNormalizer<'a> {
    pub fn new(catalog: &'a PrefixCatalog, config: &'a NormalizerConfig) -> Self {
        Self { catalog, config }
    }

    /// Normalize several independent OCR passes of the same image.
    ///
    /// Each pass is read in (row, column) order; the longest reading wins and
    /// is then reordered and corrected.
    pub fn normalize_passes(&self, passes: &[Vec<RawGlyph>]) -> String {
        let best = self.best_pass(passes);
        self.normalize_text(&concat_text(&best))
    }

    /// Glyphs of the pass with the longest reading, in reading order.
    pub fn best_pass(&self, passes: &[Vec<RawGlyph>]) -> Vec<RawGlyph> {
        let mut best: Vec<RawGlyph> = Vec::new();
        let mut best_len = 0usize;
        for (i, pass) in passes.iter().enumerate() {
            let ordered = self.reading_order(pass);
            let text = concat_text(&ordered);
            tracing::debug!("OCR pass {}: '{}'", i, text);
            if text.len() > best_len {
                best_len = text.len();
                best = ordered;
            }
        }
        best
    }

    /// Reorder and correct one candidate string.
    pub fn normalize_text(&self, text: &str) -> String {
        let reordered = self.reorder(text);
        let corrected = apply_position_corrections(&reordered, self.config);
        if corrected != text {
            tracing::debug!("normalized '{}' -> '{}'", text, corrected);
        }
        corrected
    }

    /// Concatenate one pass in reading order, dropping low-confidence glyphs.
    pub fn read_pass(&self, glyphs: &[RawGlyph]) -> String {
        concat_text(&self.reading_order(glyphs))
    }

    /// Confident glyphs sorted into rows (top to bottom), each row left to right.
    pub fn reading_order(&self, glyphs: &[RawGlyph]) -> Vec<RawGlyph> {
        let mut kept: Vec<&RawGlyph> = glyphs
            .iter()
            .filter(|g| g.ocr_confidence >= self.config.min_confidence)
            .filter(|g| !g.bounding_box.is_degenerate())
            .collect();
        if kept.is_empty() {
            return Vec::new();
        }

        let mut heights: Vec<f32> = kept.iter().map(|g| g.bounding_box.height).collect();
        heights.sort_by(f32::total_cmp);
        let row_tol = heights[heights.len() / 2] * self.config.row_merge_frac;

        kept.sort_by(|a, b| {
            a.bounding_box
                .center_y()
                .total_cmp(&b.bounding_box.center_y())
                .then_with(|| a.bounding_box.x.total_cmp(&b.bounding_box.x))
        });

        let mut rows: Vec<Vec<&RawGlyph>> = Vec::new();
        let mut anchor = f32::NEG_INFINITY;
        for glyph in kept {
            let cy = glyph.bounding_box.center_y();
            match rows.last_mut() {
                Some(row) if (cy - anchor).abs() <= row_tol => row.push(glyph),
                _ => {
                    anchor = cy;
                    rows.push(vec![glyph]);
                }
            }
        }

        let mut ordered = Vec::new();
        for mut row in rows {
            row.sort_by(|a, b| a.bounding_box.x.total_cmp(&b.bounding_box.x));
            ordered.extend(row.into_iter().cloned());
        }
        ordered
    }

    /// Rotate the candidate so a (possibly misread) catalog prefix starts it.
    ///
    /// OCR engines sometimes read the serial line before the prefix line. The
    /// search tolerates 0/O and 1/I confusion in both the candidate and the
    /// catalog prefixes.
    pub fn reorder(&self, text: &str) -> String {
        match self.find_rotation(text) {
            Some(span) => {
                let rotated = rotate(text, span.clone());
                tracing::debug!(
                    "prefix found at {:?}; reordered '{}' -> '{}'",
                    span,
                    text,
                    rotated
                );
                rotated
            }
            None => text.to_string(),
        }
    }

    /// Byte span of a catalog prefix that should be moved to the front, if
    /// the candidate does not already start with one.
    pub fn find_rotation(&self, text: &str) -> Option<Range<usize>> {
        if text.len() < self.config.min_reorder_len || !text.is_ascii() {
            return None;
        }
        let variants = text_variants(text);
        let prefix_variants: Vec<String> = self
            .catalog
            .entries()
            .iter()
            .flat_map(|e| prefix_variants(&e.prefix))
            .collect();

        let already_leading = variants
            .iter()
            .any(|v| prefix_variants.iter().any(|pv| v.starts_with(pv.as_str())));
        if already_leading {
            return None;
        }

        // Longest catalog prefix first, so MD09E1 wins over MD09E.
        prefix_variants.iter().find_map(|pv| {
            variants
                .iter()
                .find_map(|v| v.find(pv.as_str()).map(|idx| idx..idx + pv.len()))
        })
    }
}

/// Move `span` of `text` to the front.
fn rotate(text: &str, span: Range<usize>) -> String {
    format!("{}{}{}", &text[span.clone()], &text[..span.start], &text[span.end..])
}

/// Apply the permutation of [`CodeNormalizer::find_rotation`] to any
/// per-character sequence of the same length.
pub fn rotate_items<T: Clone>(items: &[T], span: Range<usize>) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    out.extend_from_slice(&items[span.clone()]);
    out.extend_from_slice(&items[..span.start]);
    out.extend_from_slice(&items[span.end..]);
    out
}

fn concat_text(glyphs: &[RawGlyph]) -> String {
    glyphs.iter().flat_map(|g| g.clean_chars()).collect()
}

/// OCR-confusable spellings of a candidate (0<->O, 1<->I).
fn text_variants(text: &str) -> Vec<String> {
    let o_to_zero = text.replace('O', "0");
    let i_to_one = text.replace('I', "1");
    let both = i_to_one.replace('O', "0");
    let mut out = vec![
        text.to_string(),
        o_to_zero,
        text.replace('0', "O"),
        i_to_one,
        both,
    ];
    out.dedup();
    out
}

/// Misreadings of a catalog prefix: D read as O/0, 0 read as O, 1 read as I.
fn prefix_variants(prefix: &str) -> Vec<String> {
    let mut out = vec![prefix.to_string()];
    if prefix.contains('D') {
        out.push(prefix.replace('D', "O"));
        out.push(prefix.replace('D', "0"));
    }
    if prefix.contains('0') {
        out.push(prefix.replace('0', "O"));
    }
    if prefix.contains('1') {
        out.push(prefix.replace('1', "I"));
    }
    out
}

fn to_digit(c: char) -> char {
    match c {
        'O' => '0',
        'I' => '1',
        other => other,
    }
}

/// Apply the position-anchored corrections of the engine-code layout:
/// `[family letter][family letter][digit][digit]E[digit?]...[serial]`.
pub fn apply_position_corrections(text: &str, config: &NormalizerConfig) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    if chars.len() < config.min_correction_len {
        return text.to_string();
    }

    // Position 2 of a family code is never O/0.
    let first = chars.first().copied();
    if let (Some(first), Some(second)) = (first, chars.get_mut(1)) {
        if matches!(*second, 'O' | '0') {
            let replacement = match first {
                'N' | 'M' => Some('D'),
                'J' | 'P' => Some('C'),
                _ => None,
            };
            if let Some(r) = replacement {
                tracing::debug!("position 2: '{}' -> '{}' after '{}'", second, r, first);
                *second = r;
            }
        }
    }

    // Positions 3, 4 and 6 are digits.
    for idx in [2usize, 3, 5] {
        if let Some(c) = chars.get_mut(idx) {
            let fixed = to_digit(*c);
            if fixed != *c {
                tracing::debug!("position {}: '{}' -> '{}'", idx + 1, c, fixed);
                *c = fixed;
            }
        }
    }

    if chars.len() >= config.min_serial_correction_len && chars.len() > SERIAL_BODY_START {
        let end = SERIAL_BODY_END.min(chars.len());
        for c in &mut chars[SERIAL_BODY_START..end] {
            *c = to_digit(*c);
        }
    }

    chars.into_iter().collect()
}
