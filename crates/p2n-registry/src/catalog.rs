// crates/p2n-registry/src/catalog.rs
// ============================================================================
// Module: Dataset Catalog
// Description: Immutable registry of known datasets and the block-list.
// Purpose: Resolve dataset names to canonical entries with loader hints.
// Dependencies: p2n-core, serde, toml
// ============================================================================

//! ## Overview
//! The catalog is loaded once at startup from an embedded TOML document and
//! never mutated. Lookups go through [`normalize_name`], so `"SST-2"`,
//! `"sst2"`, and `"Sst 2"` all land on the same entry. The block-list is
//! checked with the same normalization before any registry lookup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use p2n_core::SourceKind;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes a dataset name for catalog comparison.
///
/// Lower-cases and strips every non-alphanumeric character, so the result is
/// a stable lower-alphanumeric key. Idempotent by construction.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).map(|ch| ch.to_ascii_lowercase()).collect()
}

// ============================================================================
// SECTION: Entries
// ============================================================================

/// A single immutable catalog entry.
///
/// # Invariants
/// - `canonical_name` equals its own normalization.
/// - `splits` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Canonical lower-alphanumeric dataset key.
    pub canonical_name: String,
    /// Source family used for generator dispatch.
    pub source: SourceKind,
    /// Loader hints keyed by loader-specific names.
    #[serde(default)]
    pub loader_hints: BTreeMap<String, String>,
    /// Available split names.
    pub splits: Vec<String>,
    /// Alias strings matched after normalization.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Approximate download size in megabytes.
    pub size_mb: u32,
    /// Short human description.
    pub description: String,
}

/// Raw catalog document shape for the embedded TOML.
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    /// Catalog entries.
    #[serde(rename = "entry")]
    entries: Vec<RegistryEntry>,
    /// Blocked dataset names, matched after normalization.
    #[serde(default)]
    blocklist: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog load errors.
///
/// # Invariants
/// - Raised only at startup; a loaded catalog never fails.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The embedded document failed to parse.
    #[error("catalog parse failure: {0}")]
    Parse(String),
    /// An entry violated a catalog invariant.
    #[error("catalog invalid entry: {0}")]
    InvalidEntry(String),
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Immutable dataset registry with alias index and block-list.
///
/// # Invariants
/// - Loaded once at startup; all lookups are read-only.
/// - Alias keys never collide with a different entry's canonical key.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    /// Entries keyed by canonical name.
    entries: BTreeMap<String, RegistryEntry>,
    /// Normalized alias to canonical name index.
    alias_index: BTreeMap<String, String>,
    /// Normalized blocked names.
    blocklist: BTreeSet<String>,
}

impl DatasetRegistry {
    /// Loads the built-in catalog embedded in the binary.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the embedded document is malformed; this
    /// indicates a packaging defect, not a runtime condition.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml(include_str!("builtin.toml"))
    }

    /// Loads a catalog from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on parse failure or invariant violations.
    pub fn from_toml(document: &str) -> Result<Self, CatalogError> {
        let parsed: CatalogDocument =
            toml::from_str(document).map_err(|err| CatalogError::Parse(err.to_string()))?;

        let mut entries = BTreeMap::new();
        let mut alias_index = BTreeMap::new();
        for entry in parsed.entries {
            if entry.canonical_name != normalize_name(&entry.canonical_name) {
                return Err(CatalogError::InvalidEntry(format!(
                    "canonical name is not normalized: {}",
                    entry.canonical_name
                )));
            }
            if entry.splits.is_empty() {
                return Err(CatalogError::InvalidEntry(format!(
                    "entry has no splits: {}",
                    entry.canonical_name
                )));
            }
            for alias in &entry.aliases {
                let key = normalize_name(alias);
                if let Some(existing) = alias_index.get(&key)
                    && existing != &entry.canonical_name
                {
                    return Err(CatalogError::InvalidEntry(format!(
                        "alias {alias} collides across entries"
                    )));
                }
                alias_index.insert(key, entry.canonical_name.clone());
            }
            entries.insert(entry.canonical_name.clone(), entry);
        }

        let blocklist = parsed.blocklist.iter().map(|name| normalize_name(name)).collect();
        Ok(Self {
            entries,
            alias_index,
            blocklist,
        })
    }

    /// Looks up an entry by canonical name or alias.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        let key = normalize_name(name);
        if let Some(entry) = self.entries.get(&key) {
            return Some(entry);
        }
        self.alias_index.get(&key).and_then(|canonical| self.entries.get(canonical))
    }

    /// Returns true when the name normalizes to a block-list member.
    #[must_use]
    pub fn is_blocked(&self, name: &str) -> bool {
        self.blocklist.contains(&normalize_name(name))
    }

    /// Returns every catalog entry in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }
}
