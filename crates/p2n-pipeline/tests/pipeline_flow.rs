// crates/p2n-pipeline/tests/pipeline_flow.rs
// ============================================================================
// Module: Pipeline Flow Tests
// Description: End-to-end stage tests over scripted backends.
// Purpose: Exercise ingest through report with typed failure paths.
// Dependencies: p2n-blobstore, p2n-pipeline, p2n-store-sqlite, tempfile, tokio
// ============================================================================
//! ## Overview
//! Drives the full pipeline with a scripted provider, a stub kernel, and
//! real stores, covering the happy path and the canonical refusals.

#![cfg(unix)]
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
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use p2n_agents::AgentRequest;
use p2n_agents::AgentResponse;
use p2n_agents::FunctionCall;
use p2n_agents::LlmError;
use p2n_agents::LlmProvider;
use p2n_agents::ProviderEvent;
use p2n_blobstore::FsBlobStore;
use p2n_broker::RunStreamBroker;
use p2n_config::Settings;
use p2n_core::ClaimId;
use p2n_core::ErrorCode;
use p2n_core::IndexError;
use p2n_core::IndexHandle;
use p2n_core::IndexProvider;
use p2n_core::MetadataStore;
use p2n_core::RunStatus;
use p2n_executor::KernelConfig;
use p2n_pipeline::IngestRequest;
use p2n_pipeline::NoopMetrics;
use p2n_pipeline::PdfSource;
use p2n_pipeline::Pipeline;
use p2n_pipeline::PipelineDeps;
use p2n_pipeline::StoreReplaySource;
use p2n_pipeline::UploadRequest;
use p2n_registry::DatasetRegistry;
use p2n_store_sqlite::SqliteMetadataStore;
use serde_json::json;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: Scripted Backends
// ============================================================================

/// One scripted provider turn.
struct ScriptedTurn {
    /// Events emitted before completing.
    events: Vec<ProviderEvent>,
    /// Response returned on completion.
    response: AgentResponse,
}

impl ScriptedTurn {
    /// Returns a text-only turn.
    fn text(text: &str) -> Self {
        Self {
            events: Vec::new(),
            response: AgentResponse {
                text: text.to_string(),
                function_calls: Vec::new(),
            },
        }
    }

    /// Returns a turn answering with one function call.
    fn function_call(name: &str, arguments: &str) -> Self {
        Self {
            events: Vec::new(),
            response: AgentResponse {
                text: String::new(),
                function_calls: vec![FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
            },
        }
    }
}

/// Provider replaying scripted turns in order.
struct ScriptedProvider {
    /// Remaining turns.
    turns: Mutex<Vec<ScriptedTurn>>,
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn stream(
        &self,
        _request: &AgentRequest,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<AgentResponse, LlmError> {
        let turn = {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(LlmError::Api("no scripted turn".to_string()));
            }
            turns.remove(0)
        };
        for event in turn.events {
            if events.send(event).await.is_err() {
                return Err(LlmError::Cancelled);
            }
        }
        if events.send(ProviderEvent::Completed).await.is_err() {
            return Err(LlmError::Cancelled);
        }
        Ok(turn.response)
    }
}

/// Index provider handing out deterministic handles.
struct FakeIndexProvider;

#[async_trait]
impl IndexProvider for FakeIndexProvider {
    async fn create_index(&self, _bytes: &[u8], filename: &str) -> Result<IndexHandle, IndexError> {
        Ok(IndexHandle::new(format!("index-{filename}")))
    }

    async fn delete_index(&self, _handle: &IndexHandle) -> Result<(), IndexError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Returns settings pointing at throwaway backends.
fn settings() -> Settings {
    let vars: BTreeMap<String, String> = [
        ("OBJECT_STORE_URL", "/tmp/p2n-test-blobs"),
        ("METADATA_STORE_URL", ":memory:"),
        ("LLM_API_KEY", "test-key"),
        ("LLM_REASONER_MODEL", "reasoner-1"),
        ("LLM_SHAPER_MODEL", "shaper-1"),
        ("LLM_EXTRACTOR_MODEL", "extractor-1"),
        ("LLM_RESCUE_MODEL", "rescue-1"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect();
    Settings::from_lookup(&vars).unwrap()
}

/// Writes a stub kernel that records metrics on its final cell.
fn stub_kernel(dir: &tempfile::TempDir, metrics_body: &str, cells: u32) -> KernelConfig {
    let path = dir.path().join("kernel.sh");
    let script = format!(
        "#!/bin/sh\n\
         count=0\n\
         while read line; do\n\
         \x20 count=$((count+1))\n\
         \x20 echo '{{\"type\":\"dataset_loaded\",\"payload\":{{}}}}' >> events.jsonl\n\
         \x20 if [ \"$count\" -eq {cells} ]; then\n\
         \x20   printf '{metrics_body}' > metrics.json\n\
         \x20 fi\n\
         \x20 echo '{{\"status\":\"ok\",\"stdout\":\"\",\"stderr\":\"\"}}'\n\
         done\n"
    );
    std::fs::write(&path, script).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    KernelConfig {
        program: path.to_string_lossy().to_string(),
        args: Vec::new(),
    }
}

/// Builds a pipeline over scripted turns and a stub kernel.
fn pipeline(
    dir: &tempfile::TempDir,
    turns: Vec<ScriptedTurn>,
    kernel: KernelConfig,
) -> (Pipeline, Arc<SqliteMetadataStore>) {
    let store = Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
    let blobs =
        Arc::new(FsBlobStore::new(dir.path().join("blobs"), b"secret".to_vec()).unwrap());
    let replay = Arc::new(StoreReplaySource::new(store.clone()));
    let broker = Arc::new(RunStreamBroker::new(replay));
    let deps = PipelineDeps {
        settings: settings(),
        store: store.clone(),
        blobs,
        index: Arc::new(FakeIndexProvider),
        provider: Arc::new(ScriptedProvider {
            turns: Mutex::new(turns),
        }),
        registry: Arc::new(DatasetRegistry::builtin().unwrap()),
        broker,
        kernel,
        metrics: Arc::new(NoopMetrics),
    };
    (Pipeline::new(deps).unwrap(), store)
}

/// Returns the extractor's scripted claim sheet for SST-2.
fn sst2_claims_turn() -> ScriptedTurn {
    ScriptedTurn::function_call(
        "record_claims",
        &json!({
            "claims": [{
                "dataset_name": "SST-2",
                "split": "test",
                "metric_name": "accuracy",
                "metric_value": 88.1,
                "units": "%",
                "source_citation": "Table 2",
                "confidence": 0.95,
            }]
        })
        .to_string(),
    )
}

/// Returns the shaper's scripted plan draft.
fn plan_draft_turn(dataset: &str) -> ScriptedTurn {
    ScriptedTurn::function_call(
        "emit_plan",
        &json!({
            "version": "1.1",
            "dataset": { "name": dataset },
            "model": {
                "name": "TextCNN",
                "architecture": "logistic_regression",
                "framework": "sklearn",
            },
            "config": {
                "seed": 42,
                "batch_size": 64,
                "epochs": 5,
                "learning_rate": 0.001,
                "optimizer": "lbfgs",
            },
            "metrics": { "primary": "accuracy", "goal": 88.1, "loss": "log_loss" },
            "justifications": {
                "dataset": { "quote": "We evaluate on SST-2.", "citation": "Section 4" },
                "model": { "quote": "A simple model.", "citation": "Section 2" },
                "config": { "quote": "Few epochs.", "citation": "Section 4.2" },
            },
            "policy": { "budget_minutes": 10, "license": "research-only", "cpu_only": true },
        })
        .to_string(),
    )
}

/// Returns a minimal PDF payload.
fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.7\nfixture paper body\n%%EOF\n".to_vec()
}

/// Waits for a run to reach a terminal status.
async fn wait_for_run(
    store: &Arc<SqliteMetadataStore>,
    run_id: &p2n_core::RunId,
) -> p2n_core::Run {
    for _ in 0..200 {
        let run = store.get_run(run_id).unwrap();
        if matches!(run.status, RunStatus::Succeeded | RunStatus::Failed) {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("run never reached a terminal status");
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

/// Tests the full SST-2 flow from ingest through report.
#[tokio::test(flavor = "multi_thread")]
async fn sst2_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{\"accuracy\": 0.881}", 4);
    let turns = vec![
        sst2_claims_turn(),
        ScriptedTurn::text("Reproduce the SST-2 accuracy claim with a linear baseline."),
        plan_draft_turn("SST-2"),
    ];
    let (pipeline, store) = pipeline(&dir, turns, kernel);

    let paper = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(pdf_bytes()),
            title: "Convolutional Networks for Sentence Classification".to_string(),
            dataset_upload: None,
        })
        .await
        .unwrap();
    assert!(paper.index_handle.is_some());

    let claims = pipeline.extract(&paper.id, None).await.unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].dataset_name, "SST-2");

    let claim_ids: Vec<ClaimId> = claims.iter().map(|claim| claim.id.clone()).collect();
    let plan = pipeline.plan(&paper.id, &claim_ids, 10, None).await.unwrap();
    assert_eq!(plan.document.dataset.name, "sst2");
    assert!((plan.document.metrics.goal - 88.1).abs() < f64::EPSILON);
    assert!(plan.reasoning.is_some());

    let materialized = pipeline.materialize(&plan.id).await.unwrap();
    assert!(!materialized.fingerprint.is_empty());
    let refreshed = pipeline.get_plan(&plan.id).unwrap();
    assert_eq!(refreshed.env_fingerprint.as_deref(), Some(materialized.fingerprint.as_str()));

    let run = pipeline.run(&plan.id).await.unwrap();
    let finished = wait_for_run(&store, &run.id).await;
    assert_eq!(finished.status, RunStatus::Succeeded, "{:?}", finished.error_message);
    assert!(finished.duration_seconds.is_some());

    let events = store.list_run_events(&run.id).unwrap();
    assert!(events.iter().any(|event| event.event_type == "dataset_loaded"));
    let sequences: Vec<u64> = events.iter().map(|event| event.seq).collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    assert_eq!(sequences, sorted, "event order is monotonic");

    let report = pipeline.report(&paper.id).await.unwrap();
    assert_eq!(report.metric, "accuracy");
    assert!(report.representation_normalized, "ratio observation rescaled");
    assert!((report.observed - 88.1).abs() < 1e-9);
    assert!(report.gap_percent.abs() < 1e-6);
    assert_eq!(report.citations, vec!["Table 2".to_string()]);
    assert_eq!(report.artifacts.len(), 3);
}

/// Tests materialize is idempotent over a fixed plan.
#[tokio::test(flavor = "multi_thread")]
async fn materialize_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{\"accuracy\": 0.9}", 4);
    let turns = vec![
        sst2_claims_turn(),
        ScriptedTurn::text("Strategy."),
        plan_draft_turn("SST-2"),
    ];
    let (pipeline, _store) = pipeline(&dir, turns, kernel);

    let paper = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(pdf_bytes()),
            title: "Paper".to_string(),
            dataset_upload: None,
        })
        .await
        .unwrap();
    let claims = pipeline.extract(&paper.id, None).await.unwrap();
    let claim_ids: Vec<ClaimId> = claims.iter().map(|claim| claim.id.clone()).collect();
    let plan = pipeline.plan(&paper.id, &claim_ids, 10, None).await.unwrap();

    let first = pipeline.materialize(&plan.id).await.unwrap();
    let second = pipeline.materialize(&plan.id).await.unwrap();
    assert_eq!(first.fingerprint, second.fingerprint);
}

// ============================================================================
// SECTION: Ingest Behavior
// ============================================================================

/// Tests ingest is idempotent on content checksum.
#[tokio::test(flavor = "multi_thread")]
async fn ingest_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{}", 1);
    let (pipeline, _store) = pipeline(&dir, Vec::new(), kernel);

    let request = IngestRequest {
        source: PdfSource::Bytes(pdf_bytes()),
        title: "Paper".to_string(),
        dataset_upload: None,
    };
    let first = pipeline.ingest(request.clone()).await.unwrap();
    let second = pipeline.ingest(request).await.unwrap();
    assert_eq!(first.id, second.id);
}

/// Tests non-PDF payloads are refused.
#[tokio::test(flavor = "multi_thread")]
async fn non_pdf_payload_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{}", 1);
    let (pipeline, _store) = pipeline(&dir, Vec::new(), kernel);

    let err = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(b"just text".to_vec()),
            title: "Paper".to_string(),
            dataset_upload: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnsupportedMediaType);
}

/// Tests the ingest ceiling accepts 15 MiB and refuses one byte more.
#[tokio::test(flavor = "multi_thread")]
async fn ingest_size_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{}", 1);
    let (pipeline, _store) = pipeline(&dir, Vec::new(), kernel);

    let mut at_limit = b"%PDF-".to_vec();
    at_limit.resize(p2n_pipeline::MAX_PDF_BYTES, b'x');
    let accepted = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(at_limit.clone()),
            title: "Boundary".to_string(),
            dataset_upload: None,
        })
        .await;
    assert!(accepted.is_ok());

    let mut over_limit = at_limit;
    over_limit.push(b'x');
    let err = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(over_limit),
            title: "Boundary".to_string(),
            dataset_upload: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PayloadTooLarge);
}

// ============================================================================
// SECTION: Policy Refusals
// ============================================================================

/// Tests a blocked dataset without an upload persists no plan.
#[tokio::test(flavor = "multi_thread")]
async fn blocked_dataset_persists_no_plan() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{}", 1);
    let claims_turn = ScriptedTurn::function_call(
        "record_claims",
        &json!({
            "claims": [{
                "dataset_name": "ImageNet-1k",
                "metric_name": "top-1 accuracy",
                "metric_value": 76.0,
                "source_citation": "Table 1",
                "confidence": 0.9,
            }]
        })
        .to_string(),
    );
    let turns = vec![
        claims_turn,
        ScriptedTurn::text("Propose ImageNet-1k."),
        plan_draft_turn("ImageNet-1k"),
    ];
    let (pipeline, store) = pipeline(&dir, turns, kernel);

    let paper = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(pdf_bytes()),
            title: "Vision Paper".to_string(),
            dataset_upload: None,
        })
        .await
        .unwrap();
    let claims = pipeline.extract(&paper.id, None).await.unwrap();
    let claim_ids: Vec<ClaimId> = claims.iter().map(|claim| claim.id.clone()).collect();

    let err = pipeline.plan(&paper.id, &claim_ids, 10, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PlanNoAllowedDatasets);
    assert!(store.list_plans(&paper.id).unwrap().is_empty(), "no plan persisted");
}

/// Tests running an unmaterialized plan is refused.
#[tokio::test(flavor = "multi_thread")]
async fn run_requires_materialization() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{}", 1);
    let turns = vec![
        sst2_claims_turn(),
        ScriptedTurn::text("Strategy."),
        plan_draft_turn("SST-2"),
    ];
    let (pipeline, _store) = pipeline(&dir, turns, kernel);

    let paper = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(pdf_bytes()),
            title: "Paper".to_string(),
            dataset_upload: None,
        })
        .await
        .unwrap();
    let claims = pipeline.extract(&paper.id, None).await.unwrap();
    let claim_ids: Vec<ClaimId> = claims.iter().map(|claim| claim.id.clone()).collect();
    let plan = pipeline.plan(&paper.id, &claim_ids, 10, None).await.unwrap();

    let err = pipeline.run(&plan.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PlanNotMaterialized);
}

/// Tests premature stages are refused without mutating state.
#[tokio::test(flavor = "multi_thread")]
async fn premature_plan_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{}", 1);
    let (pipeline, store) = pipeline(&dir, Vec::new(), kernel);

    let paper = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(pdf_bytes()),
            title: "Paper".to_string(),
            dataset_upload: None,
        })
        .await
        .unwrap();
    let err = pipeline
        .plan(&paper.id, &[ClaimId::new("ghost")], 10, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::IllegalStageTransition);
    let reloaded = store.get_paper(&paper.id).unwrap();
    assert_eq!(reloaded.stage, p2n_core::Stage::Ingest);
}

// ============================================================================
// SECTION: Upload Flow
// ============================================================================

/// Tests the user-uploaded tabular dataset flow end to end.
#[tokio::test(flavor = "multi_thread")]
async fn uploaded_tabular_dataset_flow() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = stub_kernel(&dir, "{\"accuracy\": 0.71}", 4);
    let claims_turn = ScriptedTurn::function_call(
        "record_claims",
        &json!({
            "claims": [{
                "dataset_name": "Penalty Shoot-out Dataset",
                "metric_name": "accuracy",
                "metric_value": 71.0,
                "units": "%",
                "source_citation": "Section 5",
                "confidence": 0.9,
                "target_column": "Winning Team",
            }]
        })
        .to_string(),
    );
    let turns = vec![
        claims_turn,
        ScriptedTurn::text("Use the uploaded spreadsheet."),
        plan_draft_turn("Penalty Shoot-out Dataset"),
    ];
    let (pipeline, store) = pipeline(&dir, turns, kernel);

    let paper = pipeline
        .ingest(IngestRequest {
            source: PdfSource::Bytes(pdf_bytes()),
            title: "Penalty Kicks Paper".to_string(),
            dataset_upload: Some(UploadRequest {
                filename: "AER20081092_Data.xls".to_string(),
                bytes: b"fake xls bytes".to_vec(),
            }),
        })
        .await
        .unwrap();
    assert!(paper.dataset_upload.is_some());

    let claims = pipeline.extract(&paper.id, None).await.unwrap();
    let claim_ids: Vec<ClaimId> = claims.iter().map(|claim| claim.id.clone()).collect();
    let plan = pipeline.plan(&paper.id, &claim_ids, 10, None).await.unwrap();
    assert_eq!(plan.document.dataset.name, "Penalty Shoot-out Dataset");
    assert_eq!(
        plan.document.dataset.loader_hints.get("target_column").map(String::as_str),
        Some("Winning Team")
    );

    pipeline.materialize(&plan.id).await.unwrap();
    let run = pipeline.run(&plan.id).await.unwrap();
    let finished = wait_for_run(&store, &run.id).await;
    assert_eq!(finished.status, RunStatus::Succeeded, "{:?}", finished.error_message);
}
