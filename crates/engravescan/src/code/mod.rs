//! Engine-code text handling: prefix catalog, OCR normalization and parsing.

mod catalog;
mod normalize;
mod parse;

pub use catalog::{PrefixCatalog, PrefixEntry, FAMILY_LEN};
pub use normalize::{apply_position_corrections, rotate_items, CodeNormalizer, NormalizerConfig};
pub(crate) use normalize::{ANCHORED_PREFIX_LEN, SERIAL_BODY_START};
pub use parse::{CodeParser, ModelInfo, NormalizedCode, ParserConfig};

/// Characters most often targeted by re-stamping (easy to convert into one another).
pub const HIGH_RISK_CHARS: [char; 5] = ['0', '1', '3', '4', '9'];

pub fn is_high_risk_char(c: char) -> bool {
    HIGH_RISK_CHARS.contains(&c.to_ascii_uppercase())
}

/// 0-based positions and characters of high-risk characters in `code`.
pub fn high_risk_positions(code: &str) -> Vec<(usize, char)> {
    code.chars()
        .enumerate()
        .filter(|&(_, c)| is_high_risk_char(c))
        .collect()
}

/// Positional similarity of two codes in [0, 1], ignoring case, spaces and
/// hyphens. Length differences are penalized proportionally.
pub fn code_similarity(a: &str, b: &str) -> f32 {
    let clean = |s: &str| -> Vec<char> {
        s.chars()
            .filter(|&c| c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    };
    let (a, b) = (clean(a), clean(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let longest = a.len().max(b.len()) as f32;
    let len_penalty = a.len().abs_diff(b.len()) as f32 / longest;
    let matches = a.iter().zip(&b).filter(|(x, y)| x == y).count() as f32;
    (matches / longest - len_penalty).max(0.0)
}
