//! Error types for the few operations that can actually fail.
//!
//! Irregularities in the engraving itself are never errors: they are reported
//! as findings and issues. Only unusable input raises.

/// Input that cannot be analyzed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The image buffer could not be decoded.
    UndecodableImage(String),
    /// The decoded image has zero width or height.
    EmptyImage,
    /// No OCR pass produced any glyph.
    EmptyGlyphList,
    /// Glyphs were supplied but none passed the confidence and box filters.
    NoUsableGlyphs,
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndecodableImage(msg) => write!(f, "undecodable image: {}", msg),
            Self::EmptyImage => write!(f, "image has zero width or height"),
            Self::EmptyGlyphList => write!(f, "no OCR glyphs supplied"),
            Self::NoUsableGlyphs => write!(f, "no OCR glyph passed the confidence filter"),
        }
    }
}

impl std::error::Error for InputError {}

/// Failure of the optional external-opinion step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpinionError {
    /// The provider did not answer within the caller's timeout.
    Timeout,
    /// The provider is not configured or not reachable.
    Unavailable(String),
    /// The provider answered with a payload that could not be interpreted.
    Malformed(String),
}

impl std::fmt::Display for OpinionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "external opinion timed out"),
            Self::Unavailable(msg) => write!(f, "external opinion unavailable: {}", msg),
            Self::Malformed(msg) => write!(f, "malformed external opinion: {}", msg),
        }
    }
}

impl std::error::Error for OpinionError {}
