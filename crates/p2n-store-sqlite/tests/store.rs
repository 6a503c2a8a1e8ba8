// crates/p2n-store-sqlite/tests/store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Tests for entity persistence, transactions, and cascades.
// Purpose: Exercise ownership semantics and replace-claims atomicity.
// Dependencies: p2n-core, p2n-store-sqlite, serde_json, tempfile
// ============================================================================
//! ## Overview
//! Validates row round-trips, dedupe, cascading delete, and event ordering.

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

use std::collections::BTreeMap;

use p2n_core::Claim;
use p2n_core::ClaimId;
use p2n_core::DatasetUpload;
use p2n_core::ErrorCode;
use p2n_core::MetadataStore;
use p2n_core::Paper;
use p2n_core::PaperId;
use p2n_core::PaperStatus;
use p2n_core::PlanConfig;
use p2n_core::PlanDataset;
use p2n_core::PlanId;
use p2n_core::PlanMetrics;
use p2n_core::PlanModel;
use p2n_core::PlanPolicy;
use p2n_core::PlanRecord;
use p2n_core::PlanState;
use p2n_core::PlanV11;
use p2n_core::Run;
use p2n_core::RunId;
use p2n_core::RunStatus;
use p2n_core::SourceKind;
use p2n_core::Stage;
use p2n_core::StoreError;
use p2n_core::Timestamp;
use p2n_core::UploadFormat;
use p2n_store_sqlite::SqliteMetadataStore;
use p2n_store_sqlite::SqliteStoreConfig;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Returns a paper fixture with the given identifier and checksum suffix.
fn paper(id: &str, checksum_byte: &str) -> Paper {
    Paper {
        id: PaperId::new(id),
        title: format!("Paper {id}"),
        source_url: Some("https://example.test/paper.pdf".to_string()),
        pdf_path: format!("papers/dev/2024/03/05/{id}.pdf"),
        checksum: checksum_byte.repeat(32),
        index_handle: None,
        dataset_upload: Some(DatasetUpload {
            blob_path: format!("papers/dev/2024/03/05/{id}.dataset.xls"),
            format: UploadFormat::Xls,
            original_filename: "AER20081092_Data.xls".to_string(),
        }),
        stage: Stage::Ingest,
        status: PaperStatus::Processing,
        created_at: Timestamp::from_unix_millis(1_000),
        updated_at: Timestamp::from_unix_millis(1_000),
    }
}

/// Returns a claim fixture owned by the paper.
fn claim(id: &str, paper_id: &str, dataset: &str) -> Claim {
    Claim {
        id: ClaimId::new(id),
        paper_id: PaperId::new(paper_id),
        dataset_name: dataset.to_string(),
        split: None,
        metric_name: "accuracy".to_string(),
        metric_value: 88.1,
        units: "%".to_string(),
        method_snippet: None,
        source_citation: "Table 2".to_string(),
        confidence: 0.95,
        dataset_format: None,
        target_column: None,
        preprocessing_notes: None,
        dataset_url: None,
    }
}

/// Returns a minimal validated plan document.
fn plan_document() -> PlanV11 {
    let mut justifications = BTreeMap::new();
    for key in ["dataset", "model", "config"] {
        justifications.insert(
            key.to_string(),
            p2n_core::Justification {
                quote: format!("{key} quote"),
                citation: "Section 4".to_string(),
            },
        );
    }
    PlanV11 {
        version: "1.1".to_string(),
        dataset: PlanDataset {
            name: "sst2".to_string(),
            source: SourceKind::Huggingface,
            loader_hints: BTreeMap::new(),
            train_split: "train".to_string(),
            test_split: "test".to_string(),
        },
        model: PlanModel {
            name: "TextCNN".to_string(),
            architecture: "logistic_regression".to_string(),
            framework: "sklearn".to_string(),
        },
        config: PlanConfig {
            seed: 42,
            batch_size: 64,
            epochs: 5,
            learning_rate: 0.001,
            optimizer: "lbfgs".to_string(),
            dropout: None,
            weight_decay: None,
        },
        metrics: PlanMetrics {
            primary: "accuracy".to_string(),
            secondary: Vec::new(),
            goal: 88.1,
            loss: "log_loss".to_string(),
        },
        justifications,
        policy: PlanPolicy {
            budget_minutes: 10,
            license: "research-only".to_string(),
            cpu_only: true,
        },
        visualizations: Vec::new(),
    }
}

/// Returns a plan record owned by the paper.
fn plan_record(id: &str, paper_id: &str) -> PlanRecord {
    PlanRecord {
        id: PlanId::new(id),
        paper_id: PaperId::new(paper_id),
        document: plan_document(),
        env_fingerprint: None,
        state: PlanState::Validated,
        reasoning: Some("stage one text".to_string()),
        created_at: Timestamp::from_unix_millis(2_000),
        updated_at: Timestamp::from_unix_millis(2_000),
    }
}

/// Returns a run record owned by the plan.
fn run_record(id: &str, plan_id: &str, paper_id: &str) -> Run {
    Run {
        id: RunId::new(id),
        plan_id: PlanId::new(plan_id),
        paper_id: PaperId::new(paper_id),
        status: RunStatus::Pending,
        seed: 42,
        env_fingerprint: "ff".repeat(32),
        created_at: Timestamp::from_unix_millis(3_000),
        started_at: None,
        completed_at: None,
        duration_seconds: None,
        error_code: None,
        error_message: None,
    }
}

// ============================================================================
// SECTION: Paper Tests
// ============================================================================

/// Tests a paper with an upload descriptor round-trips.
#[test]
fn paper_round_trips_with_upload() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    let original = paper("p1", "aa");
    store.insert_paper(&original).unwrap();
    let loaded = store.get_paper(&PaperId::new("p1")).unwrap();
    assert_eq!(loaded, original);
    assert_eq!(
        loaded.dataset_upload.unwrap().original_filename,
        "AER20081092_Data.xls"
    );
}

/// Tests checksum lookup finds the paper and a duplicate insert conflicts.
#[test]
fn checksum_is_unique_and_searchable() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();

    let found = store.find_paper_by_checksum(&"aa".repeat(32)).unwrap();
    assert_eq!(found.unwrap().id, PaperId::new("p1"));
    assert!(store.find_paper_by_checksum(&"bb".repeat(32)).unwrap().is_none());

    let duplicate = paper("p2", "aa");
    assert!(matches!(store.insert_paper(&duplicate), Err(StoreError::Conflict(_))));
}

/// Tests stage updates mutate the row and bump the timestamp.
#[test]
fn stage_update_mutates_row() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();
    store
        .update_paper_stage(
            &PaperId::new("p1"),
            Stage::Extract,
            PaperStatus::Completed,
            Timestamp::from_unix_millis(9_000),
        )
        .unwrap();
    let loaded = store.get_paper(&PaperId::new("p1")).unwrap();
    assert_eq!(loaded.stage, Stage::Extract);
    assert_eq!(loaded.status, PaperStatus::Completed);
    assert_eq!(loaded.updated_at, Timestamp::from_unix_millis(9_000));
}

/// Tests the durable store persists across re-open.
#[test]
fn durable_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteStoreConfig {
        path: dir.path().join("p2n.db"),
        busy_timeout_ms: 1_000,
        journal_mode: p2n_store_sqlite::SqliteJournalMode::Wal,
    };
    {
        let store = SqliteMetadataStore::open(&config).unwrap();
        store.insert_paper(&paper("p1", "aa")).unwrap();
    }
    let store = SqliteMetadataStore::open(&config).unwrap();
    assert!(store.get_paper(&PaperId::new("p1")).is_ok());
}

// ============================================================================
// SECTION: Claim Tests
// ============================================================================

/// Tests replace-claims removes every prior claim in one transaction.
#[test]
fn replace_claims_is_a_full_replacement() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();

    let first = vec![claim("c1", "p1", "SST-2"), claim("c2", "p1", "IMDB")];
    store.replace_claims(&PaperId::new("p1"), &first).unwrap();
    assert_eq!(store.list_claims(&PaperId::new("p1")).unwrap().len(), 2);

    let second = vec![claim("c3", "p1", "AG News")];
    store.replace_claims(&PaperId::new("p1"), &second).unwrap();
    let listed = store.list_claims(&PaperId::new("p1")).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, ClaimId::new("c3"));
}

/// Tests claims list in insertion order.
#[test]
fn claims_list_in_insertion_order() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();
    let claims: Vec<Claim> =
        (0..5).map(|index| claim(&format!("c{index}"), "p1", "SST-2")).collect();
    store.replace_claims(&PaperId::new("p1"), &claims).unwrap();
    let listed = store.list_claims(&PaperId::new("p1")).unwrap();
    let ids: Vec<&str> = listed.iter().map(|value| value.id.as_str()).collect();
    assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4"]);
}

// ============================================================================
// SECTION: Plan and Run Tests
// ============================================================================

/// Tests plan documents round-trip and fingerprints update in place.
#[test]
fn plan_round_trips_and_fingerprints() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();
    store.insert_plan(&plan_record("plan1", "p1")).unwrap();

    let loaded = store.get_plan(&PlanId::new("plan1")).unwrap();
    assert_eq!(loaded.document.dataset.name, "sst2");
    assert!(loaded.env_fingerprint.is_none());
    assert_eq!(loaded.reasoning.as_deref(), Some("stage one text"));

    store
        .set_plan_fingerprint(&PlanId::new("plan1"), "fp-1", Timestamp::from_unix_millis(5_000))
        .unwrap();
    let loaded = store.get_plan(&PlanId::new("plan1")).unwrap();
    assert_eq!(loaded.env_fingerprint.as_deref(), Some("fp-1"));
}

/// Tests plans list most recent first.
#[test]
fn plans_list_most_recent_first() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();
    let mut older = plan_record("plan1", "p1");
    older.created_at = Timestamp::from_unix_millis(1_000);
    let mut newer = plan_record("plan2", "p1");
    newer.created_at = Timestamp::from_unix_millis(2_000);
    store.insert_plan(&older).unwrap();
    store.insert_plan(&newer).unwrap();

    let listed = store.list_plans(&PaperId::new("p1")).unwrap();
    assert_eq!(listed[0].id, PlanId::new("plan2"));
}

/// Tests run updates record failure codes.
#[test]
fn run_update_records_failure() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();
    store.insert_plan(&plan_record("plan1", "p1")).unwrap();
    store.insert_run(&run_record("run1", "plan1", "p1")).unwrap();

    let mut run = store.get_run(&RunId::new("run1")).unwrap();
    run.status = RunStatus::Failed;
    run.error_code = Some(ErrorCode::RunTimeout);
    run.error_message = Some("budget exhausted".to_string());
    run.duration_seconds = Some(600.5);
    store.update_run(&run).unwrap();

    let loaded = store.get_run(&RunId::new("run1")).unwrap();
    assert_eq!(loaded.status, RunStatus::Failed);
    assert_eq!(loaded.error_code, Some(ErrorCode::RunTimeout));
    assert_eq!(loaded.duration_seconds, Some(600.5));
}

// ============================================================================
// SECTION: Event Tests
// ============================================================================

/// Tests event sequence numbers are monotonic and order-preserving.
#[test]
fn run_events_are_monotonic() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();
    store.insert_plan(&plan_record("plan1", "p1")).unwrap();
    store.insert_run(&run_record("run1", "plan1", "p1")).unwrap();

    let run_id = RunId::new("run1");
    for index in 0..4 {
        let event = store
            .append_run_event(
                &run_id,
                Timestamp::from_unix_millis(4_000 + index),
                "progress",
                &json!({ "percent": index * 25 }),
            )
            .unwrap();
        assert_eq!(event.seq, u64::try_from(index).unwrap());
    }

    let events = store.list_run_events(&run_id).unwrap();
    assert_eq!(events.len(), 4);
    let sequences: Vec<u64> = events.iter().map(|event| event.seq).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
}

// ============================================================================
// SECTION: Cascade Tests
// ============================================================================

/// Tests deleting a paper cascades to claims, plans, runs, and events.
#[test]
fn delete_paper_cascades() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    store.insert_paper(&paper("p1", "aa")).unwrap();
    store.replace_claims(&PaperId::new("p1"), &[claim("c1", "p1", "SST-2")]).unwrap();
    store.insert_plan(&plan_record("plan1", "p1")).unwrap();
    store.insert_run(&run_record("run1", "plan1", "p1")).unwrap();
    store
        .append_run_event(
            &RunId::new("run1"),
            Timestamp::from_unix_millis(4_000),
            "progress",
            &json!({ "percent": 0 }),
        )
        .unwrap();

    store.delete_paper(&PaperId::new("p1")).unwrap();

    assert!(matches!(store.get_paper(&PaperId::new("p1")), Err(StoreError::NotFound(_))));
    assert!(store.list_claims(&PaperId::new("p1")).unwrap().is_empty());
    assert!(store.list_plans(&PaperId::new("p1")).unwrap().is_empty());
    assert!(matches!(store.get_run(&RunId::new("run1")), Err(StoreError::NotFound(_))));
    assert!(store.list_run_events(&RunId::new("run1")).unwrap().is_empty());
}

/// Tests deleting an absent paper is a typed not-found.
#[test]
fn delete_missing_paper_is_not_found() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    assert!(matches!(
        store.delete_paper(&PaperId::new("ghost")),
        Err(StoreError::NotFound(_))
    ));
}
