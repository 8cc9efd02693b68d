//! Engine-code parsing: catalog match, regex fallback, serial validation.

use std::sync::LazyLock;

use regex::Regex;

use super::catalog::PrefixCatalog;

/// Structural patterns tried in order when no catalog prefix matches.
/// Group 1 is the prefix, group 2 the serial.
static CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let patterns = [
        r"^([A-Z]{2,4}\d{0,2}[A-Z]?\d?[A-Z]?)-?([A-Z]?\d{5,8})$",
        r"^([A-Z]{2}[A-Z0-9]{2,5})-?([A-Z0-9]{5,8})$",
    ];
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
});

/// Model data attached to a recognized prefix.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub displacement_cc: u32,
}

/// Validated reading of an engine code. Built once per request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedCode {
    /// Text as handed to the parser.
    pub original: String,
    /// Trimmed, uppercased, space-free text (hyphens kept).
    pub cleaned: String,
    pub prefix: Option<String>,
    /// Serial part; only `[A-Z0-9]`.
    pub serial: Option<String>,
    pub model_info: Option<ModelInfo>,
    /// Parsing confidence in [0, 1].
    pub confidence: f32,
    /// Non-fatal format issues.
    pub issues: Vec<String>,
    pub valid: bool,
}

impl NormalizedCode {
    fn unparsed(original: &str) -> Self {
        Self {
            original: original.to_string(),
            cleaned: String::new(),
            prefix: None,
            serial: None,
            model_info: None,
            confidence: 0.0,
            issues: Vec::new(),
            valid: false,
        }
    }

    /// Prefix and serial joined without separator, when both are known.
    pub fn canonical(&self) -> Option<String> {
        match (&self.prefix, &self.serial) {
            (Some(p), Some(s)) => Some(format!("{p}{s}")),
            _ => None,
        }
    }
}

/// Parser thresholds and confidence factors.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub min_code_len: usize,
    pub max_code_len: usize,
    /// Confidence of a catalogued prefix match.
    pub catalog_confidence: f32,
    /// Confidence of a structural (regex) match.
    pub pattern_confidence: f32,
    pub min_serial_digits: usize,
    pub max_serial_digits: usize,
    /// Multiplier applied when the serial has too few digits.
    pub short_serial_factor: f32,
    /// Multiplier applied when the serial has too many digits.
    pub long_serial_factor: f32,
    /// Multiplier applied when the serial carries non-alphanumerics.
    pub invalid_char_factor: f32,
    /// Only accept regex matches whose two-letter family is catalogued.
    pub require_known_family: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_code_len: 8,
            max_code_len: 16,
            catalog_confidence: 0.95,
            pattern_confidence: 0.70,
            min_serial_digits: 5,
            max_serial_digits: 8,
            short_serial_factor: 0.5,
            long_serial_factor: 0.8,
            invalid_char_factor: 0.7,
            require_known_family: true,
        }
    }
}

/// Pure engine-code parser over an immutable catalog.
#[derive(Debug, Clone, Copy)]
pub struct CodeParser<'a> {
    catalog: &'a PrefixCatalog,
    config: &'a ParserConfig,
}

impl<'a> CodeParser<'a> {
    pub fn new(catalog: &'a PrefixCatalog, config: &'a ParserConfig) -> Self {
        Self { catalog, config }
    }

    /// Parse one candidate code. Never fails; problems land in `issues`.
    pub fn parse(&self, text: &str) -> NormalizedCode {
        let cfg = self.config;
        let mut out = NormalizedCode::unparsed(text);

        let cleaned: String = text
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if cleaned.is_empty() {
            out.issues.push("empty engine code".to_string());
            return out;
        }
        out.cleaned = cleaned;
        let analysis: String = out.cleaned.chars().filter(|&c| c != '-').collect();

        let n = analysis.chars().count();
        if n < cfg.min_code_len {
            out.issues.push(format!(
                "code too short: {} characters (minimum {})",
                n, cfg.min_code_len
            ));
            return out;
        }
        if n > cfg.max_code_len {
            out.issues.push(format!(
                "code too long: {} characters (maximum {})",
                n, cfg.max_code_len
            ));
            return out;
        }

        if let Some(entry) = self.catalog.match_prefix(&analysis) {
            out.prefix = Some(entry.prefix.clone());
            out.serial = Some(analysis[entry.prefix.len()..].to_string());
            out.model_info = Some(ModelInfo {
                model: entry.model.clone(),
                displacement_cc: entry.displacement_cc,
            });
            out.valid = true;
            out.confidence = cfg.catalog_confidence;
        } else if let Some((prefix, serial)) = self.match_pattern(&analysis) {
            out.model_info = self.catalog.lookup(&prefix).map(|e| ModelInfo {
                model: e.model.clone(),
                displacement_cc: e.displacement_cc,
            });
            out.issues.push(format!("prefix not catalogued: '{prefix}'"));
            out.prefix = Some(prefix);
            out.serial = Some(serial);
            out.valid = true;
            out.confidence = cfg.pattern_confidence;
        } else {
            out.issues.push(format!(
                "format '{}' not recognized as an engine code",
                out.cleaned
            ));
            out.confidence = 0.0;
        }

        if let Some(serial) = out.serial.take() {
            out.serial = Some(self.validate_serial(serial, &mut out));
        }
        tracing::debug!(
            "parsed '{}': prefix={:?} serial={:?} valid={} confidence={:.2}",
            out.cleaned,
            out.prefix,
            out.serial,
            out.valid,
            out.confidence
        );
        out
    }

    fn match_pattern(&self, analysis: &str) -> Option<(String, String)> {
        if self.config.require_known_family && !self.catalog.has_family_of(analysis) {
            return None;
        }
        CODE_PATTERNS.iter().find_map(|re| {
            let caps = re.captures(analysis)?;
            Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string()))
        })
    }

    /// Digit-count checks and invalid-character stripping.
    fn validate_serial(&self, serial: String, out: &mut NormalizedCode) -> String {
        let cfg = self.config;
        let digits = serial.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < cfg.min_serial_digits {
            out.issues.push(format!(
                "serial too short: {} digits (minimum {})",
                digits, cfg.min_serial_digits
            ));
            out.valid = false;
            out.confidence *= cfg.short_serial_factor;
        }
        if digits > cfg.max_serial_digits {
            out.issues.push(format!(
                "serial too long: {} digits (maximum {})",
                digits, cfg.max_serial_digits
            ));
            out.confidence *= cfg.long_serial_factor;
        }

        let is_valid = |c: &char| c.is_ascii_uppercase() || c.is_ascii_digit();
        let invalid: Vec<char> = serial.chars().filter(|c| !is_valid(c)).collect();
        if invalid.is_empty() {
            return serial;
        }
        let listed: String = invalid.iter().collect();
        out.issues.push(format!("invalid characters in serial: '{listed}'"));
        out.confidence *= cfg.invalid_char_factor;
        serial.chars().filter(is_valid).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn parse(text: &str) -> NormalizedCode {
        let catalog = PrefixCatalog::default();
        let cfg = ParserConfig::default();
        CodeParser::new(&catalog, &cfg).parse(text)
    }

    #[test]
    fn catalogued_code_parses_with_high_confidence() {
        let code = parse("MD09E1B215797");
        assert_eq!(code.prefix.as_deref(), Some("MD09E1"));
        assert_eq!(code.serial.as_deref(), Some("B215797"));
        assert!(code.valid);
        assert_abs_diff_eq!(code.confidence, 0.95, epsilon = 1e-6);
        assert!(code.issues.is_empty());
        assert_eq!(code.model_info.as_ref().map(|m| m.displacement_cc), Some(300));
        assert_eq!(code.canonical().as_deref(), Some("MD09E1B215797"));
    }

    #[test]
    fn hyphen_and_spaces_are_ignored() {
        let code = parse("  md09e1-b215 797 ");
        assert_eq!(code.cleaned, "MD09E1-B215797");
        assert_eq!(code.prefix.as_deref(), Some("MD09E1"));
        assert_eq!(code.serial.as_deref(), Some("B215797"));
    }

    #[test]
    fn longest_prefix_wins_for_nested_entries() {
        let code = parse("NC49E1F105588");
        assert_eq!(code.prefix.as_deref(), Some("NC49E1F"));
        assert_eq!(code.serial.as_deref(), Some("105588"));
    }

    #[test]
    fn unknown_family_is_rejected() {
        let code = parse("ZZ00X-999999");
        assert!(!code.valid);
        assert_eq!(code.confidence, 0.0);
        assert!(!code.issues.is_empty());
        assert!(code.prefix.is_none());
    }

    #[test]
    fn unknown_family_matches_pattern_when_gate_is_off() {
        let catalog = PrefixCatalog::default();
        let cfg = ParserConfig {
            require_known_family: false,
            ..ParserConfig::default()
        };
        let code = CodeParser::new(&catalog, &cfg).parse("ZZ00X-999999");
        assert!(code.valid);
        assert!(code.prefix.as_deref().is_some_and(|p| p.starts_with("ZZ00X")));
    }

    #[test]
    fn uncatalogued_prefix_of_known_family_uses_pattern() {
        let code = parse("MD99E1-1234567");
        assert!(code.valid);
        assert_abs_diff_eq!(code.confidence, 0.70, epsilon = 1e-6);
        assert_eq!(code.prefix.as_deref(), Some("MD99E1"));
        assert_eq!(code.serial.as_deref(), Some("1234567"));
        assert!(code.model_info.is_none());
        assert!(code.issues.iter().any(|i| i.contains("prefix not catalogued")));
    }

    #[test]
    fn short_serial_invalidates() {
        let code = parse("MD09E1B21X");
        assert!(!code.valid);
        assert_abs_diff_eq!(code.confidence, 0.475, epsilon = 1e-6);
        assert!(code.issues.iter().any(|i| i.contains("serial too short")));
    }

    #[test]
    fn long_serial_is_only_penalized() {
        let code = parse("MD09E1234567890");
        assert!(code.valid);
        assert_abs_diff_eq!(code.confidence, 0.95 * 0.8, epsilon = 1e-6);
    }

    #[test]
    fn invalid_serial_characters_are_stripped() {
        let code = parse("MD09E1B2157/97");
        assert_eq!(code.serial.as_deref(), Some("B215797"));
        assert_abs_diff_eq!(code.confidence, 0.95 * 0.7, epsilon = 1e-6);
        assert!(code.valid);
    }

    #[test]
    fn length_bounds_are_enforced() {
        let short = parse("MD09E1");
        assert!(!short.valid);
        assert!(short.issues[0].contains("too short"));
        let long = parse("MD09E1B2157971234567");
        assert!(!long.valid);
        assert!(long.issues[0].contains("too long"));
        assert!(parse("   ").issues[0].contains("empty"));
    }
}
