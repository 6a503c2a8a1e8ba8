// crates/p2n-registry/src/resolver.rs
// ============================================================================
// Module: Dataset Resolver
// Description: Pure classifier for a claim's dataset reference.
// Purpose: Map free-text dataset names to a terminal classification.
// Dependencies: crate::catalog, p2n-core
// ============================================================================

//! ## Overview
//! The resolver is a pure function over the registry, the block-list, and an
//! optional paper upload. It is called twice with identical semantics: as a
//! hosted tool during plan reasoning, and inside the deterministic sanitizer.
//! Classification order is fixed: block-list, registry, upload stem match,
//! composite heuristic, unknown. The block-list wins over everything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::Paper;
use serde::Serialize;

use crate::catalog::DatasetRegistry;
use crate::catalog::RegistryEntry;
use crate::catalog::normalize_name;

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Terminal classification of a dataset reference.
///
/// # Invariants
/// - `Blocked` is terminal: no later stage may resurrect the name.
/// - `ResolvedUpload` fires only when the upload filename stem matches the
///   normalized reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum DatasetClass {
    /// Name normalizes to a block-list member.
    Blocked,
    /// Matched a registry entry by canonical name or alias.
    ResolvedRegistry {
        /// The matched entry.
        entry: RegistryEntry,
    },
    /// Matched the paper's dataset upload by filename stem.
    ResolvedUpload {
        /// Canonical name adopted from the reference.
        canonical_name: String,
    },
    /// Looks like a joined or composite dataset; advisory only.
    Complex,
    /// None of the above.
    Unknown,
}

/// Classifies a dataset reference against the registry and paper context.
///
/// Pure and side-effect-free; identical inputs always classify identically.
#[must_use]
pub fn classify(name: &str, registry: &DatasetRegistry, paper: Option<&Paper>) -> DatasetClass {
    if registry.is_blocked(name) {
        return DatasetClass::Blocked;
    }
    if let Some(entry) = registry.lookup(name) {
        return DatasetClass::ResolvedRegistry {
            entry: entry.clone(),
        };
    }
    if let Some(upload) = paper.and_then(|paper| paper.dataset_upload.as_ref())
        && normalize_name(upload.filename_stem()) == normalize_name(name)
    {
        return DatasetClass::ResolvedUpload {
            canonical_name: normalize_name(name),
        };
    }
    if looks_composite(name) {
        return DatasetClass::Complex;
    }
    DatasetClass::Unknown
}

/// Heuristic for joined or composite dataset references.
///
/// Punctuation joins (`+`, `&`, `/`, commas) and conjunction words mark a
/// reference as composite; so does an unusually long multi-word phrase.
fn looks_composite(name: &str) -> bool {
    if name.contains('+') || name.contains('&') || name.contains('/') || name.contains(',') {
        return true;
    }
    let lowered = name.to_ascii_lowercase();
    if lowered.contains(" and ") || lowered.contains(" with ") || lowered.contains(" plus ") {
        return true;
    }
    name.split_whitespace().count() > 5
}
