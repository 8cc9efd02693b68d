//! Immutable reference data shared by every analysis.

use std::path::Path;

use crate::code::PrefixCatalog;
use crate::glyph::{TemplateSet, VerifierConfig};
use crate::reference::ReferenceLibrary;

/// Prefix catalog, reference glyph templates and reference prefix images.
///
/// Loaded once at startup and only read afterwards; share it by reference or
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ReferenceContext {
    catalog: PrefixCatalog,
    templates: TemplateSet,
    references: ReferenceLibrary,
}

impl ReferenceContext {
    pub fn new(catalog: PrefixCatalog, templates: TemplateSet) -> Self {
        Self {
            catalog,
            templates,
            references: ReferenceLibrary::new(),
        }
    }

    /// Attach reference prefix images.
    pub fn with_references(mut self, references: ReferenceLibrary) -> Self {
        self.references = references;
        self
    }

    /// Embedded catalog and no templates. Glyph verification then relies on
    /// the built-in shape rules of [`VerifierConfig`], which cover the digits;
    /// letters are reported unscored.
    pub fn embedded(verifier: &VerifierConfig) -> Self {
        Self::new(PrefixCatalog::default(), TemplateSet::new(verifier))
    }

    /// Load a catalog JSON file and/or a template directory. Missing paths
    /// fall back to the embedded catalog and an empty template set.
    pub fn load(
        catalog: Option<&Path>,
        templates: Option<&Path>,
        verifier: &VerifierConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let catalog = match catalog {
            Some(path) => PrefixCatalog::from_json_file(path)?,
            None => PrefixCatalog::default(),
        };
        let templates = match templates {
            Some(dir) => TemplateSet::from_dir(dir, verifier)?,
            None => {
                tracing::warn!("no glyph template directory given, checking shape rules only");
                TemplateSet::new(verifier)
            }
        };
        tracing::info!(
            "reference context: {} catalog prefixes, {} glyph templates",
            catalog.len(),
            templates.len()
        );
        Ok(Self::new(catalog, templates))
    }

    pub fn catalog(&self) -> &PrefixCatalog {
        &self.catalog
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn references(&self) -> &ReferenceLibrary {
        &self.references
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn context_is_shareable() {
        assert_send_sync::<ReferenceContext>();
    }

    #[test]
    fn load_without_paths_uses_embedded_catalog() {
        let cfg = VerifierConfig::default();
        let ctx = ReferenceContext::load(None, None, &cfg).expect("load");
        assert_eq!(ctx.catalog().len(), PrefixCatalog::default().len());
        assert!(ctx.templates().is_empty());
        assert!(ctx.references().is_empty());
        for ch in crate::code::HIGH_RISK_CHARS {
            assert!(cfg.shape_rules.contains_key(&ch), "no rule for '{ch}'");
        }
    }

    #[test]
    fn missing_catalog_file_is_an_error() {
        let cfg = VerifierConfig::default();
        let path = Path::new("/nonexistent/engravescan/catalog.json");
        assert!(ReferenceContext::load(Some(path), None, &cfg).is_err());
    }
}
