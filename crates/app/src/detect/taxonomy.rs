use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Resolved species identity. Any field may be empty when the resolver has
/// nothing for the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxon {
    pub scientific_name: String,
    pub common_name: String,
    pub species_code: String,
}

/// Maps a raw classifier label to a taxon.
pub trait TaxonomyResolver: Send + Sync {
    fn resolve(&self, species: &str) -> Taxon;
}

/// Label-string resolver for the common `"Scientific name_Common Name"`
/// label format, backed by an optional scientific-name → code table.
/// Entries missing from the table get a stable placeholder code so the same
/// species always maps to the same code within and across runs.
#[derive(Default)]
pub struct LabelTaxonomy {
    codes: HashMap<String, String>,
}

impl LabelTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codes(codes: HashMap<String, String>) -> Self {
        Self { codes }
    }
}

/// Stable placeholder code: "XX" plus six hex characters of the species
/// string's hash.
pub fn placeholder_code(species: &str) -> String {
    let mut hasher = DefaultHasher::new();
    species.hash(&mut hasher);
    format!("XX{:06X}", hasher.finish() & 0xFF_FFFF)
}

impl TaxonomyResolver for LabelTaxonomy {
    fn resolve(&self, species: &str) -> Taxon {
        let (scientific, common) = match species.split_once('_') {
            Some((sci, com)) => (sci.trim(), com.trim()),
            None => (species.trim(), ""),
        };
        if scientific.is_empty() && common.is_empty() {
            return Taxon::default();
        }
        let species_code = self
            .codes
            .get(scientific)
            .cloned()
            .unwrap_or_else(|| placeholder_code(species));
        Taxon {
            scientific_name: scientific.to_string(),
            common_name: common.to_string(),
            species_code,
        }
    }
}
