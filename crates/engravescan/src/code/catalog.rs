//! Known engine-prefix catalog.
//!
//! Catalog JSON follows a versioned schema (`engravescan.catalog.v1`). The
//! catalog is built once at startup and never mutated; entries are kept in
//! match order (longest first, then alphabetical) so the first literal prefix
//! hit is always the most specific one.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

const CATALOG_SCHEMA_V1: &str = "engravescan.catalog.v1";

/// Length of the manufacturer family code at the start of every prefix.
pub const FAMILY_LEN: usize = 2;

/// One catalogued engine prefix.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefixEntry {
    /// Literal prefix text, uppercase alphanumerics (e.g. `MD09E1`).
    pub prefix: String,
    /// Commercial model name.
    pub model: String,
    /// Engine displacement in cubic centimetres (0 when unknown).
    pub displacement_cc: u32,
}

impl PrefixEntry {
    fn new(prefix: &str, model: &str, displacement_cc: u32) -> Self {
        Self {
            prefix: prefix.to_string(),
            model: model.to_string(),
            displacement_cc,
        }
    }

    /// Two-letter manufacturer family of this prefix.
    pub fn family(&self) -> &str {
        &self.prefix[..FAMILY_LEN.min(self.prefix.len())]
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogSpecV1 {
    schema: String,
    entries: Vec<PrefixEntry>,
}

/// Immutable prefix catalog with longest-prefix matching.
#[derive(Debug, Clone)]
pub struct PrefixCatalog {
    /// Entries sorted by (-length, alphabetical).
    entries: Vec<PrefixEntry>,
    /// Exact prefix -> index into `entries`.
    by_prefix: HashMap<String, usize>,
    families: BTreeSet<String>,
}

impl PrefixCatalog {
    /// Build a catalog from arbitrary entries.
    pub fn new(entries: Vec<PrefixEntry>) -> Result<Self, String> {
        let mut entries = entries;
        for entry in &mut entries {
            entry.prefix = entry.prefix.trim().to_ascii_uppercase();
            validate_entry(entry)?;
        }
        entries.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        let mut by_prefix = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if by_prefix.insert(entry.prefix.clone(), i).is_some() {
                return Err(format!("duplicate catalog prefix '{}'", entry.prefix));
            }
        }
        let families = entries.iter().map(|e| e.family().to_string()).collect();

        Ok(Self {
            entries,
            by_prefix,
            families,
        })
    }

    /// Load a catalog from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Parse a catalog from JSON text.
    pub fn from_json_str(data: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let doc: CatalogSpecV1 = serde_json::from_str(data)?;
        if doc.schema != CATALOG_SCHEMA_V1 {
            return Err(format!(
                "unsupported catalog schema '{}' (expected '{}')",
                doc.schema, CATALOG_SCHEMA_V1
            )
            .into());
        }
        Self::new(doc.entries).map_err(Into::into)
    }

    /// Serialize the catalog to its JSON document form.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        serde_json::to_string_pretty(&CatalogSpecV1 {
            schema: CATALOG_SCHEMA_V1.to_string(),
            entries,
        })
    }

    /// Entries in match order (longest first, then alphabetical).
    pub fn entries(&self) -> &[PrefixEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest catalog entry that is a literal prefix of `text`.
    pub fn match_prefix(&self, text: &str) -> Option<&PrefixEntry> {
        self.entries.iter().find(|e| text.starts_with(&e.prefix))
    }

    /// Exact lookup, falling back to the longest catalogued prefix of `prefix`
    /// (an uncatalogued `NC49E1X` reports the `NC49E1` model).
    pub fn lookup(&self, prefix: &str) -> Option<&PrefixEntry> {
        if let Some(&idx) = self.by_prefix.get(prefix) {
            return Some(&self.entries[idx]);
        }
        self.match_prefix(prefix)
    }

    /// Two-letter families present in the catalog.
    pub fn families(&self) -> &BTreeSet<String> {
        &self.families
    }

    /// Whether `text` starts with a catalogued two-letter family.
    pub fn has_family_of(&self, text: &str) -> bool {
        text.get(..FAMILY_LEN)
            .is_some_and(|family| self.families.contains(family))
    }
}

impl Default for PrefixCatalog {
    fn default() -> Self {
        Self::new(default_entries()).expect("embedded catalog must be valid")
    }
}

fn validate_entry(entry: &PrefixEntry) -> Result<(), String> {
    if entry.prefix.len() < FAMILY_LEN {
        return Err(format!(
            "catalog prefix '{}' is shorter than {} characters",
            entry.prefix, FAMILY_LEN
        ));
    }
    if !entry.prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!(
            "catalog prefix '{}' must contain only A-Z and 0-9",
            entry.prefix
        ));
    }
    if !entry.prefix[..FAMILY_LEN]
        .chars()
        .all(|c| c.is_ascii_alphabetic())
    {
        return Err(format!(
            "catalog prefix '{}' must start with a two-letter family",
            entry.prefix
        ));
    }
    if entry.model.trim().is_empty() {
        return Err(format!("catalog prefix '{}' has an empty model", entry.prefix));
    }
    Ok(())
}

fn default_entries() -> Vec<PrefixEntry> {
    [
        // CG
        ("MC27E", "CG 160 Titan/Fan/Start", 160),
        ("MC41E", "CG 150 Titan/Fan", 150),
        ("MC38E", "CG 125 Fan", 125),
        ("MC44E", "CG 150", 150),
        ("MC44E1", "CG 150", 150),
        ("JC30E", "CG 125i Fan", 125),
        ("JC30E7", "CG 125i Fan", 125),
        ("JC75E", "POP 110i", 110),
        ("JC79E", "CG 160 Fan", 160),
        ("JC96E", "CG 160", 160),
        ("JC9RE", "CG 160", 160),
        ("KC08E1", "CG 125", 125),
        ("KC08E2", "CG 125", 125),
        ("KC22E1", "CG 125", 125),
        ("KF34E1", "Titan 150", 150),
        // XRE
        ("MD09E", "XRE 300", 300),
        ("MD09E1", "XRE 300", 300),
        ("ND09E", "XRE 300", 300),
        ("ND09E1", "XRE 300", 300),
        ("ND11E1", "XRE 300", 300),
        ("MD44E", "XRE 190", 190),
        // CB
        ("NC51E", "CB 500F/X/R", 500),
        ("NC49E", "CB 500", 500),
        ("NC49E1", "CB 500", 500),
        ("NC49E1F", "CB 500F", 500),
        ("NC56E", "CB 650F", 650),
        ("NC61E", "CB 650", 650),
        ("NC61E0", "CB 650R", 650),
        ("MC52E", "CB 300R Twister", 300),
        ("MC65E", "CB 250F Twister", 250),
        // Bros / NXR
        ("MD37E", "NXR 160 Bros", 160),
        ("MD38E", "XRE 190 Bros", 190),
        ("MD41E", "NXR 160 Bros", 160),
        ("MD41E0", "NXR 160 Bros", 160),
        // Biz / scooters
        ("KYJ", "BIZ 125", 125),
        ("JF77E", "BIZ 110i", 110),
        ("JF83E", "BIZ 125", 125),
        ("JF81E", "Elite 125", 125),
        ("PC40E", "PCX 150", 150),
        ("PC44E", "PCX 160", 160),
        ("JK12E", "ADV 150", 150),
        // Large displacement
        ("NC70E", "Africa Twin CRF1000", 1000),
        ("NC75E", "Africa Twin CRF1100", 1100),
        // Older / export
        ("KD03E3", "Generic engine", 0),
        ("KD08E1", "Sahara/XLR 125", 125),
        ("KD08E2", "Sahara/XLR 125", 125),
    ]
    .into_iter()
    .map(|(prefix, model, cc)| PrefixEntry::new(prefix, model, cc))
    .collect()
}
