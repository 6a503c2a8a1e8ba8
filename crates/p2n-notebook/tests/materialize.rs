// crates/p2n-notebook/tests/materialize.rs
// ============================================================================
// Module: Notebook Materialization Tests
// Description: Tests for generator selection, assembly, and validation.
// Purpose: Exercise the cell skeleton, fingerprints, and the validator.
// Dependencies: p2n-core, p2n-notebook, p2n-registry, serde_json
// ============================================================================
//! ## Overview
//! Validates the builder's fixed skeleton and the static validator.

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

use p2n_core::Justification;
use p2n_core::PlanConfig;
use p2n_core::PlanDataset;
use p2n_core::PlanMetrics;
use p2n_core::PlanModel;
use p2n_core::PlanPolicy;
use p2n_core::PlanV11;
use p2n_core::SourceKind;
use p2n_core::Timestamp;
use p2n_notebook::Cell;
use p2n_notebook::IssueKind;
use p2n_notebook::Notebook;
use p2n_notebook::build_notebook;
use p2n_notebook::select_dataset_generator;
use p2n_notebook::validate_notebook;
use p2n_registry::DatasetRegistry;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Returns a validated plan fixture for the given dataset.
fn plan(dataset_name: &str, source: SourceKind, hints: &[(&str, &str)]) -> PlanV11 {
    let mut justifications = BTreeMap::new();
    for key in ["dataset", "model", "config"] {
        justifications.insert(
            key.to_string(),
            Justification {
                quote: format!("Quoted {key} decision."),
                citation: "Section 4".to_string(),
            },
        );
    }
    PlanV11 {
        version: "1.1".to_string(),
        dataset: PlanDataset {
            name: dataset_name.to_string(),
            source,
            loader_hints: hints
                .iter()
                .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
                .collect(),
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
            secondary: vec!["f1".to_string()],
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

/// Returns the sst2 plan used by the happy-path tests.
fn sst2_plan() -> PlanV11 {
    plan(
        "sst2",
        SourceKind::Huggingface,
        &[
            ("hf_dataset", "glue"),
            ("hf_config", "sst2"),
            ("text_column", "sentence"),
            ("label_column", "label"),
        ],
    )
}

// ============================================================================
// SECTION: Builder Tests
// ============================================================================

/// Tests the fixed five-cell skeleton in order.
#[test]
fn skeleton_has_five_cells_in_order() {
    let registry = DatasetRegistry::builtin().unwrap();
    let built = build_notebook(&sst2_plan(), "Paper Title", Timestamp::from_unix_millis(0), &registry);

    let cells = &built.notebook.cells;
    assert_eq!(cells.len(), 5);
    assert_eq!(cells[0].cell_type, "markdown");
    assert!(cells[0].source_text().contains("Paper Title"));
    assert!(cells[1].source_text().contains("SEED = 42"));
    assert!(cells[1].source_text().contains("CUDA_VISIBLE_DEVICES"));
    assert!(cells[2].source_text().contains("CountVectorizer"));
    assert!(cells[3].source_text().contains("dataset_loaded"));
    assert!(cells[4].source_text().contains("metrics.json"));
    assert!(cells[4].source_text().contains("metric_update"));
}

/// Tests the SST-2 imports include the vectorizer and the linear model.
#[test]
fn sst2_imports_cover_vectorizer_and_model() {
    let registry = DatasetRegistry::builtin().unwrap();
    let built = build_notebook(&sst2_plan(), "Paper", Timestamp::from_unix_millis(0), &registry);
    let imports = built.notebook.cells[2].source_text();
    assert!(imports.contains("CountVectorizer"));
    assert!(imports.contains("LogisticRegression"));
    assert!(imports.contains("load_dataset"));
}

/// Tests requirements union generator pins with the base set.
#[test]
fn requirements_union_base_and_generators() {
    let registry = DatasetRegistry::builtin().unwrap();
    let built = build_notebook(&sst2_plan(), "Paper", Timestamp::from_unix_millis(0), &registry);
    for pin in ["numpy==", "pandas==", "matplotlib==", "scikit-learn==", "datasets=="] {
        assert!(built.requirements.contains(pin), "missing {pin}");
    }
}

/// Tests materialization is idempotent apart from the markdown timestamp.
#[test]
fn materialize_is_idempotent_modulo_timestamp() {
    let registry = DatasetRegistry::builtin().unwrap();
    let first = build_notebook(&sst2_plan(), "Paper", Timestamp::from_unix_millis(1), &registry);
    let second = build_notebook(&sst2_plan(), "Paper", Timestamp::from_unix_millis(2), &registry);

    assert_eq!(first.requirements, second.requirements);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.notebook.cells[1..], second.notebook.cells[1..]);
}

/// Tests generator selection for each source family.
#[test]
fn generator_selection_dispatches_on_source() {
    let registry = DatasetRegistry::builtin().unwrap();
    let cases = [
        ("iris", SourceKind::Sklearn, "dataset/sklearn"),
        ("mnist", SourceKind::Torchvision, "dataset/torchvision"),
        ("sst2", SourceKind::Huggingface, "dataset/huggingface"),
        ("synthetic", SourceKind::Synthetic, "dataset/synthetic"),
    ];
    for (name, source, expected) in cases {
        let generator = select_dataset_generator(&plan(name, source, &[]), &registry);
        assert_eq!(generator.label(), expected, "dataset {name}");
    }
}

/// Tests an upload-backed plan selects the tabular generator.
#[test]
fn upload_plan_selects_tabular_generator() {
    let registry = DatasetRegistry::builtin().unwrap();
    let upload_plan = plan(
        "Penalty Shoot-out Dataset",
        SourceKind::Upload,
        &[("upload_format", "xls"), ("target_column", "Winning Team")],
    );
    let generator = select_dataset_generator(&upload_plan, &registry);
    assert_eq!(generator.label(), "dataset/tabular");

    let built = build_notebook(&upload_plan, "Paper", Timestamp::from_unix_millis(0), &registry);
    let dataset_cell = built.notebook.cells[3].source_text();
    assert!(dataset_cell.contains("P2N_DATASET_PATH"));
    assert!(dataset_cell.contains("Winning Team"));
    assert!(dataset_cell.contains("read_excel"));
    assert!(built.requirements.contains("xlrd=="));
}

/// Tests an unknown dataset without an upload falls back to synthetic.
#[test]
fn unknown_dataset_falls_back_to_synthetic() {
    let registry = DatasetRegistry::builtin().unwrap();
    let generator =
        select_dataset_generator(&plan("mystery", SourceKind::Synthetic, &[]), &registry);
    assert_eq!(generator.label(), "dataset/synthetic");
}

// ============================================================================
// SECTION: Validator Tests
// ============================================================================

/// Tests every built notebook passes validation.
#[test]
fn built_notebooks_validate_cleanly() {
    let registry = DatasetRegistry::builtin().unwrap();
    for (name, source, hints) in [
        ("sst2", SourceKind::Huggingface, vec![("hf_dataset", "glue"), ("hf_config", "sst2")]),
        ("iris", SourceKind::Sklearn, vec![("sklearn_loader", "load_iris")]),
        ("mnist", SourceKind::Torchvision, vec![("torchvision_class", "MNIST")]),
        ("upload", SourceKind::Upload, vec![("upload_format", "csv")]),
        ("synthetic", SourceKind::Synthetic, vec![]),
    ] {
        let built = build_notebook(
            &plan(name, source, &hints),
            "Paper",
            Timestamp::from_unix_millis(0),
            &registry,
        );
        let issues = validate_notebook(&built.notebook);
        assert!(issues.is_empty(), "dataset {name}: {issues:?}");
    }
}

/// Tests the forbidden-argument rule reports cell, line, and reason.
#[test]
fn forbidden_argument_is_reported() {
    let notebook = Notebook::new(vec![
        Cell::markdown("# Title\n"),
        Cell::code("from sklearn.feature_extraction.text import CountVectorizer\n"),
        Cell::code(
            "vectorizer = CountVectorizer(max_features=5000, random_state=42)\n\
             X = vectorizer.fit_transform([\"a\", \"b\"])\n",
        ),
    ]);
    let issues = validate_notebook(&notebook);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].cell_index, 2);
    assert_eq!(issues[0].line, 1);
    assert_eq!(issues[0].kind, IssueKind::ForbiddenArgument);
    assert!(issues[0].message.contains("does not accept random_state"));
}

/// Tests a matching argument in a different call is not flagged.
#[test]
fn forbidden_argument_is_call_scoped() {
    let notebook = Notebook::new(vec![Cell::code(
        "vectorizer = CountVectorizer(max_features=5000)\n\
         split = train_test_split(X, y, random_state=42)\n",
    )]);
    assert!(validate_notebook(&notebook).is_empty());
}

/// Tests unterminated strings are caught with their line.
#[test]
fn unterminated_string_is_caught() {
    let notebook = Notebook::new(vec![Cell::code("a = 1\nb = \"unterminated\n")]);
    let issues = validate_notebook(&notebook);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].line, 2);
    assert_eq!(issues[0].kind, IssueKind::Syntax);
}

/// Tests unbalanced brackets are caught.
#[test]
fn unbalanced_brackets_are_caught() {
    let notebook = Notebook::new(vec![Cell::code("values = [1, 2, 3\n")]);
    let issues = validate_notebook(&notebook);
    assert!(issues.iter().any(|issue| issue.message.contains("opening bracket")));
}

/// Tests a block introducer without a body is caught.
#[test]
fn dangling_block_introducer_is_caught() {
    let notebook = Notebook::new(vec![Cell::code("def f():\nx = 1\n")]);
    let issues = validate_notebook(&notebook);
    assert!(
        issues
            .iter()
            .any(|issue| issue.message.contains("block introducer")),
        "{issues:?}"
    );
}

/// Tests tab and space mixing in indentation is caught.
#[test]
fn mixed_indentation_is_caught() {
    let notebook = Notebook::new(vec![Cell::code("if True:\n \tx = 1\n")]);
    let issues = validate_notebook(&notebook);
    assert!(issues.iter().any(|issue| issue.message.contains("tabs and spaces")));
}

/// Tests markdown cells are exempt from code checks.
#[test]
fn markdown_cells_are_exempt() {
    let notebook = Notebook::new(vec![Cell::markdown("CountVectorizer(random_state=42\n")]);
    assert!(validate_notebook(&notebook).is_empty());
}
