// crates/p2n-registry/src/tests.rs
// ============================================================================
// Module: Registry Tests
// Description: Tests for normalization, catalog lookup, and classification.
// Purpose: Exercise resolver classification order and block-list dominance.
// Dependencies: p2n-core, p2n-registry, proptest
// ============================================================================

//! ## Overview
//! Validates catalog lookups, normalization properties, and the resolver's
//! fixed classification order.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use p2n_core::DatasetUpload;
use p2n_core::Paper;
use p2n_core::PaperId;
use p2n_core::PaperStatus;
use p2n_core::SourceKind;
use p2n_core::Stage;
use p2n_core::Timestamp;
use p2n_core::UploadFormat;
use proptest::prelude::proptest;

use crate::DatasetClass;
use crate::DatasetRegistry;
use crate::classify;
use crate::normalize_name;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns a paper fixture, optionally carrying a dataset upload.
fn paper_with_upload(filename: Option<&str>) -> Paper {
    Paper {
        id: PaperId::new("paper-1"),
        title: "Fixture".to_string(),
        source_url: None,
        pdf_path: "papers/dev/2024/03/05/paper-1.pdf".to_string(),
        checksum: "00".repeat(32),
        index_handle: None,
        dataset_upload: filename.map(|name| DatasetUpload {
            blob_path: "papers/dev/2024/03/05/paper-1.dataset.xls".to_string(),
            format: UploadFormat::Xls,
            original_filename: name.to_string(),
        }),
        stage: Stage::Ingest,
        status: PaperStatus::Completed,
        created_at: Timestamp::from_unix_millis(0),
        updated_at: Timestamp::from_unix_millis(0),
    }
}

// ============================================================================
// SECTION: Normalization Tests
// ============================================================================

/// Tests normalization strips punctuation and case.
#[test]
fn normalize_strips_punctuation_and_case() {
    assert_eq!(normalize_name("SST-2"), "sst2");
    assert_eq!(normalize_name("Fashion MNIST"), "fashionmnist");
    assert_eq!(normalize_name("  CIFAR_10! "), "cifar10");
}

proptest! {
    /// Tests normalization is idempotent for arbitrary input.
    #[test]
    fn normalize_is_idempotent(name in ".{0,64}") {
        let once = normalize_name(&name);
        assert_eq!(normalize_name(&once), once);
    }
}

// ============================================================================
// SECTION: Catalog Tests
// ============================================================================

/// Tests the built-in catalog loads and resolves aliases.
#[test]
fn builtin_catalog_resolves_aliases() {
    let registry = DatasetRegistry::builtin().unwrap();
    let entry = registry.lookup("SST-2").unwrap();
    assert_eq!(entry.canonical_name, "sst2");
    assert_eq!(entry.source, SourceKind::Huggingface);
    assert_eq!(entry.loader_hints.get("hf_dataset").map(String::as_str), Some("glue"));

    let entry = registry.lookup("Fisher's Iris").unwrap();
    assert_eq!(entry.canonical_name, "iris");
    assert_eq!(entry.source, SourceKind::Sklearn);
}

/// Tests canonical names resolve as their own alias.
#[test]
fn canonical_names_resolve_directly() {
    let registry = DatasetRegistry::builtin().unwrap();
    assert!(registry.lookup("mnist").is_some());
    assert!(registry.lookup("MNIST").is_some());
}

/// Tests block-list membership survives casing and punctuation.
#[test]
fn blocklist_ignores_casing_and_punctuation() {
    let registry = DatasetRegistry::builtin().unwrap();
    for spelling in ["ImageNet", "imagenet", "Image-Net", "IMAGENET", "image net"] {
        assert!(registry.is_blocked(spelling), "spelling {spelling}");
    }
    assert!(registry.is_blocked("ImageNet-1k"));
    assert!(registry.is_blocked("YFCC-100M"));
}

// ============================================================================
// SECTION: Classification Tests
// ============================================================================

/// Tests the block-list wins over every other classification.
#[test]
fn blocked_wins_over_registry_and_upload() {
    let registry = DatasetRegistry::builtin().unwrap();
    let paper = paper_with_upload(Some("ImageNet.xls"));
    assert_eq!(classify("imagenet", &registry, Some(&paper)), DatasetClass::Blocked);
}

/// Tests registry resolution by alias.
#[test]
fn alias_classifies_as_registry_hit() {
    let registry = DatasetRegistry::builtin().unwrap();
    match classify("SST-2", &registry, None) {
        DatasetClass::ResolvedRegistry {
            entry,
        } => assert_eq!(entry.canonical_name, "sst2"),
        other => panic!("unexpected classification: {other:?}"),
    }
}

/// Tests the upload stem guard requires a matching filename.
#[test]
fn upload_match_requires_matching_stem() {
    let registry = DatasetRegistry::builtin().unwrap();

    let matching = paper_with_upload(Some("penalty-shootout-dataset.xls"));
    assert_eq!(
        classify("Penalty Shootout Dataset", &registry, Some(&matching)),
        DatasetClass::ResolvedUpload {
            canonical_name: "penaltyshootoutdataset".to_string(),
        }
    );

    // Archive-style filenames do not match paper-derived names; the sanitizer
    // override handles that case, not the resolver.
    let archive = paper_with_upload(Some("AER20081092_Data.xls"));
    assert_eq!(
        classify("Penalty Shoot-out Dataset", &registry, Some(&archive)),
        DatasetClass::Unknown
    );
}

/// Tests the guard never fires without an upload.
#[test]
fn upload_match_requires_upload() {
    let registry = DatasetRegistry::builtin().unwrap();
    let paper = paper_with_upload(None);
    assert_eq!(
        classify("Penalty Shootout Dataset", &registry, Some(&paper)),
        DatasetClass::Unknown
    );
}

/// Tests composite references classify as complex.
#[test]
fn composite_names_classify_as_complex() {
    let registry = DatasetRegistry::builtin().unwrap();
    for name in ["SQuAD + TriviaQA", "CelebA and LFW", "a/b", "one two three four five six"] {
        assert_eq!(classify(name, &registry, None), DatasetClass::Complex, "name {name}");
    }
}

proptest! {
    /// Tests every casing variant of a block-list member stays blocked.
    #[test]
    fn blocklist_casing_property(flips in proptest::collection::vec(proptest::bool::ANY, 8)) {
        let registry = DatasetRegistry::builtin().unwrap();
        let mut spelling = String::new();
        for (ch, flip) in "imagenet".chars().zip(flips) {
            if flip {
                spelling.push(ch.to_ascii_uppercase());
            } else {
                spelling.push(ch);
            }
        }
        assert_eq!(classify(&spelling, &registry, None), DatasetClass::Blocked);
    }
}
