// crates/p2n-pipeline/src/pipeline.rs
// ============================================================================
// Module: Pipeline State Machine
// Description: Six-stage orchestration from ingest through report.
// Purpose: Drive stores, agents, generators, and the executor per paper.
// Dependencies: crate submodules, p2n-agents, p2n-broker, p2n-config,
// p2n-core, p2n-executor, p2n-notebook, p2n-planner, p2n-registry, reqwest
// ============================================================================

//! ## Overview
//! The pipeline owns the per-paper state machine: Ingest, Extract, Plan,
//! Materialize, Run, Report. Each operation checks stage legality, flips the
//! paper to processing, performs its work through the injected backends, and
//! finalizes the stage as completed or failed with a typed code. Streaming
//! stages forward agent events to the caller; runs execute as background
//! tasks whose events flow through the run-stream broker.
//!
//! Security posture: PDFs, uploads, and model output are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use p2n_agents::AgentError;
use p2n_agents::AgentHarness;
use p2n_agents::AgentRequest;
use p2n_agents::AgentRole;
use p2n_agents::LlmProvider;
use p2n_agents::OutputGuardrail;
use p2n_agents::ProviderEvent;
use p2n_agents::ToolCaps;
use p2n_agents::ToolSpec;
use p2n_broker::RunStreamBroker;
use p2n_config::Settings;
use p2n_core::Claim;
use p2n_core::ClaimId;
use p2n_core::DatasetUpload;
use p2n_core::ErrorCode;
use p2n_core::Paper;
use p2n_core::PaperId;
use p2n_core::PaperStatus;
use p2n_core::PlanId;
use p2n_core::PlanRecord;
use p2n_core::PlanState;
use p2n_core::Run;
use p2n_core::RunId;
use p2n_core::RunStatus;
use p2n_core::Stage;
use p2n_core::StreamEvent;
use p2n_core::Timestamp;
use p2n_core::TypedError;
use p2n_core::UploadFormat;
use p2n_core::hashing::sha256_hex;
use p2n_core::interfaces::BlobError;
use p2n_core::interfaces::BlobStore;
use p2n_core::interfaces::IndexProvider;
use p2n_core::interfaces::MetadataStore;
use p2n_core::interfaces::StoreError;
use p2n_core::paths;
use p2n_core::plan::MAX_REQUEST_BUDGET_MINUTES;
use p2n_executor::ExecutionRequest;
use p2n_executor::KernelConfig;
use p2n_executor::StagedDataset;
use p2n_executor::execute_notebook;
use p2n_notebook::build_notebook;
use p2n_notebook::validate_notebook;
use p2n_planner::PlanError;
use p2n_planner::PlanSynthesizer;
use p2n_planner::PlannerConfig;
use p2n_planner::SynthesisInput;
use p2n_registry::DatasetRegistry;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;

use crate::contracts::ClaimSheet;
use crate::contracts::MinConfidenceGuardrail;
use crate::contracts::WellFormedClaimsGuardrail;
use crate::contracts::claim_sheet_contract;
use crate::report::GapReport;
use crate::report::gap_percent;
use crate::report::normalize_observed;
use crate::sink::PersistingRunSink;
use crate::telemetry::MetricsSink;
use crate::telemetry::StageMetricEvent;
use crate::telemetry::StageOutcome;
use crate::transitions::ensure_transition;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Ingest payload ceiling: 15 MiB.
pub const MAX_PDF_BYTES: usize = 15 * 1024 * 1024;
/// URL ingest fetch timeout in seconds.
const URL_FETCH_TIMEOUT_SECONDS: u64 = 30;
/// Default signed-reference lifetime in seconds.
const SIGNED_REF_TTL_SECONDS: u64 = 120;
/// Maximum results per hosted file-search call.
const FILE_SEARCH_MAX_RESULTS: u32 = 8;

/// Instructions for the claim extractor role.
const EXTRACTOR_INSTRUCTIONS: &str =
    "You extract quantitative claims from a research paper. Search the paper and record every \
     claim that states a dataset, a metric, and a value. Quote the location of each claim as its \
     citation. Record metric values exactly as written, including percent values. Report a \
     confidence for each claim.";

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Source of the PDF at ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfSource {
    /// Direct upload bytes.
    Bytes(Vec<u8>),
    /// URL to fetch with a bounded timeout.
    Url(String),
}

/// Dataset upload accompanying a paper at ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Original filename; the extension selects the format tag.
    pub filename: String,
    /// File bytes.
    pub bytes: Vec<u8>,
}

/// One ingest request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    /// PDF source.
    pub source: PdfSource,
    /// Human title for the paper.
    pub title: String,
    /// Optional dataset upload.
    pub dataset_upload: Option<UploadRequest>,
}

/// Successful materialization summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOutcome {
    /// Blob path of the notebook artifact.
    pub notebook_path: String,
    /// Blob path of the requirements artifact.
    pub requirements_path: String,
    /// Environment fingerprint recorded on the plan.
    pub fingerprint: String,
}

// ============================================================================
// SECTION: Dependencies
// ============================================================================

/// Backends and configuration injected into the pipeline.
pub struct PipelineDeps {
    /// Validated settings.
    pub settings: Settings,
    /// Metadata store.
    pub store: Arc<dyn MetadataStore>,
    /// Blob store.
    pub blobs: Arc<dyn BlobStore>,
    /// Searchable index provider.
    pub index: Arc<dyn IndexProvider>,
    /// Streaming LLM provider.
    pub provider: Arc<dyn LlmProvider>,
    /// Process-wide dataset registry.
    pub registry: Arc<DatasetRegistry>,
    /// Run-stream broker.
    pub broker: Arc<RunStreamBroker>,
    /// Kernel command for the executor.
    pub kernel: KernelConfig,
    /// Metrics sink.
    pub metrics: Arc<dyn MetricsSink>,
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// The six-stage pipeline state machine.
///
/// # Invariants
/// - Stage transitions per paper are linearizable; extract holds a per-paper
///   lock across its replace-claims write.
/// - Input and policy failures never mutate entity state.
pub struct Pipeline {
    /// Validated settings.
    settings: Settings,
    /// Metadata store.
    store: Arc<dyn MetadataStore>,
    /// Blob store.
    blobs: Arc<dyn BlobStore>,
    /// Searchable index provider.
    index: Arc<dyn IndexProvider>,
    /// Process-wide dataset registry.
    registry: Arc<DatasetRegistry>,
    /// Run-stream broker.
    broker: Arc<RunStreamBroker>,
    /// Kernel command for the executor.
    kernel: KernelConfig,
    /// Metrics sink.
    metrics: Arc<dyn MetricsSink>,
    /// Agent harness with caps and rescue wired.
    harness: AgentHarness,
    /// HTTP client for URL ingest.
    fetch_client: reqwest::Client,
    /// Per-paper locks serializing extract's replace writes.
    paper_locks: std::sync::Mutex<BTreeMap<PaperId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    /// Creates a pipeline over the injected backends.
    ///
    /// # Errors
    ///
    /// Returns a typed error when the HTTP fetch client cannot be built.
    pub fn new(deps: PipelineDeps) -> Result<Self, TypedError> {
        let caps = ToolCaps {
            file_search_calls: deps.settings.tool_caps.file_search_per_run,
            web_search_calls: deps.settings.tool_caps.web_search_per_run,
            code_interpreter_seconds: deps.settings.tool_caps.code_interpreter_seconds,
        };
        let harness = AgentHarness::new(
            Arc::clone(&deps.provider),
            caps,
            deps.settings.llm.rescue_model.clone(),
            deps.settings.llm.max_output_tokens,
        );
        let fetch_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(URL_FETCH_TIMEOUT_SECONDS))
            .build()
            .map_err(|err| {
                TypedError::new(ErrorCode::UrlFetchFailed, format!("fetch client: {err}"))
            })?;
        Ok(Self {
            settings: deps.settings,
            store: deps.store,
            blobs: deps.blobs,
            index: deps.index,
            registry: deps.registry,
            broker: deps.broker,
            kernel: deps.kernel,
            metrics: deps.metrics,
            harness,
            fetch_client,
            paper_locks: std::sync::Mutex::new(BTreeMap::new()),
        })
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    /// Ingests a PDF, deduping by content checksum.
    ///
    /// # Errors
    ///
    /// Returns typed input errors for bad media or oversize payloads, and
    /// external errors for index or storage failures.
    pub async fn ingest(&self, request: IngestRequest) -> Result<Paper, TypedError> {
        let started = Instant::now();
        let outcome = self.ingest_inner(request).await;
        self.observe(Stage::Ingest, started, &outcome);
        outcome
    }

    /// Ingest body, separated so the stage metric wraps every path.
    async fn ingest_inner(&self, request: IngestRequest) -> Result<Paper, TypedError> {
        let (bytes, source_url) = match request.source {
            PdfSource::Bytes(bytes) => (bytes, None),
            PdfSource::Url(url) => (self.fetch_pdf(&url).await?, Some(url)),
        };
        if !bytes.starts_with(b"%PDF-") {
            return Err(TypedError::new(
                ErrorCode::UnsupportedMediaType,
                "payload is not a PDF",
            ));
        }
        if bytes.len() > MAX_PDF_BYTES {
            return Err(TypedError::new(
                ErrorCode::PayloadTooLarge,
                format!("payload is {} bytes; the ceiling is {MAX_PDF_BYTES}", bytes.len()),
            ));
        }

        let checksum = sha256_hex(&bytes);
        if let Some(existing) = self
            .store
            .find_paper_by_checksum(&checksum)
            .map_err(store_failure)?
        {
            return Ok(existing);
        }

        let paper_id = PaperId::generate();
        let now = Timestamp::now();
        let pdf_path = paths::paper_pdf_path(&self.settings.env_name, now, &paper_id);
        self.blobs.put(&pdf_path, &bytes).map_err(blob_failure)?;

        let dataset_upload = match request.dataset_upload {
            None => None,
            Some(upload) => Some(self.store_upload(&paper_id, now, upload)?),
        };

        let handle = self
            .index
            .create_index(&bytes, &format!("{paper_id}.pdf"))
            .await
            .map_err(|err| TypedError::new(ErrorCode::IndexCreationFailed, err.to_string()))?;

        let paper = Paper {
            id: paper_id,
            title: request.title,
            source_url,
            pdf_path,
            checksum: checksum.clone(),
            index_handle: Some(handle),
            dataset_upload,
            stage: Stage::Ingest,
            status: PaperStatus::Completed,
            created_at: now,
            updated_at: now,
        };
        match self.store.insert_paper(&paper) {
            Ok(()) => Ok(paper),
            // A concurrent ingest of the same bytes won the race; idempotence
            // says both callers get the surviving row.
            Err(StoreError::Conflict(_)) => self
                .store
                .find_paper_by_checksum(&checksum)
                .map_err(store_failure)?
                .ok_or_else(|| {
                    TypedError::new(ErrorCode::MetadataStoreFailure, "conflict without row")
                }),
            Err(err) => Err(store_failure(err)),
        }
    }

    /// Stores a dataset upload blob and returns its descriptor.
    fn store_upload(
        &self,
        paper_id: &PaperId,
        now: Timestamp,
        upload: UploadRequest,
    ) -> Result<DatasetUpload, TypedError> {
        let extension = upload.filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
        let format = UploadFormat::from_extension(extension).ok_or_else(|| {
            TypedError::new(
                ErrorCode::UnsupportedMediaType,
                format!("unsupported dataset format: \"{extension}\""),
            )
        })?;
        let blob_path =
            paths::paper_dataset_path(&self.settings.env_name, now, paper_id, format);
        self.blobs.put(&blob_path, &upload.bytes).map_err(blob_failure)?;
        Ok(DatasetUpload {
            blob_path,
            format,
            original_filename: upload.filename,
        })
    }

    /// Fetches a PDF by URL with the ingest timeout and size ceiling.
    async fn fetch_pdf(&self, url: &str) -> Result<Vec<u8>, TypedError> {
        let parsed = Url::parse(url)
            .map_err(|err| TypedError::new(ErrorCode::UrlFetchFailed, err.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TypedError::new(
                ErrorCode::UrlFetchFailed,
                format!("unsupported scheme: {}", parsed.scheme()),
            ));
        }
        let response = self
            .fetch_client
            .get(parsed)
            .send()
            .await
            .map_err(|err| TypedError::new(ErrorCode::UrlFetchFailed, err.to_string()))?;
        if !response.status().is_success() {
            return Err(TypedError::new(
                ErrorCode::UrlFetchFailed,
                format!("fetch returned status {}", response.status()),
            ));
        }
        if let Some(length) = response.content_length()
            && length > MAX_PDF_BYTES as u64
        {
            return Err(TypedError::new(ErrorCode::PayloadTooLarge, "download exceeds ceiling"));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TypedError::new(ErrorCode::UrlFetchFailed, err.to_string()))?;
        Ok(bytes.to_vec())
    }

    // ------------------------------------------------------------------
    // Extract
    // ------------------------------------------------------------------

    /// Extracts claims, replacing the paper's prior claim set.
    ///
    /// Agent stream events are forwarded to `events` when provided.
    ///
    /// # Errors
    ///
    /// Returns typed errors for missing papers, missing indexes, guardrail
    /// tripwires, and provider failures.
    pub async fn extract(
        &self,
        paper_id: &PaperId,
        events: Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<Vec<Claim>, TypedError> {
        let started = Instant::now();
        let outcome = self.extract_inner(paper_id, events.clone()).await;
        if let Err(error) = &outcome {
            emit(&events, StreamEvent::Error {
                code: error.code,
                message: error.message.clone(),
            })
            .await;
        }
        self.observe(Stage::Extract, started, &outcome);
        outcome
    }

    /// Extract body; failures flip the paper to failed.
    async fn extract_inner(
        &self,
        paper_id: &PaperId,
        events: Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<Vec<Claim>, TypedError> {
        let paper = self.load_paper(paper_id)?;
        ensure_transition(paper.stage, Stage::Extract)?;
        let index_handle = paper.index_handle.clone().ok_or_else(|| {
            TypedError::new(ErrorCode::PaperNotReady, "paper has no searchable index")
        })?;

        let lock = self.paper_lock(paper_id);
        let _guard = lock.lock().await;

        self.set_stage(paper_id, Stage::Extract, PaperStatus::Processing)?;
        emit(&events, StreamEvent::StageUpdate {
            stage: Stage::Extract,
            paper_id: Some(paper_id.clone()),
            run_id: None,
        })
        .await;

        let outcome = self.run_extractor(&paper, &index_handle, &events).await;
        match outcome {
            Ok(claims) => {
                emit(&events, StreamEvent::LogLine {
                    message: format!("persisting {} claims", claims.len()),
                })
                .await;
                self.store.replace_claims(paper_id, &claims).map_err(store_failure)?;
                self.set_stage(paper_id, Stage::Extract, PaperStatus::Completed)?;
                emit(&events, StreamEvent::Progress {
                    percent: 100,
                })
                .await;
                emit(&events, StreamEvent::LogLine {
                    message: "extraction complete".to_string(),
                })
                .await;
                Ok(claims)
            }
            Err(error) => {
                // Stage bookkeeping best-effort; the typed error wins.
                let _ = self.set_stage(paper_id, Stage::Extract, PaperStatus::Failed);
                Err(error)
            }
        }
    }

    /// Runs the extractor agent and maps its sheet into claim rows.
    async fn run_extractor(
        &self,
        paper: &Paper,
        index_handle: &p2n_core::IndexHandle,
        events: &Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<Vec<Claim>, TypedError> {
        let contract = claim_sheet_contract();
        let request = AgentRequest {
            model: self.settings.llm.extractor_model.clone(),
            instructions: EXTRACTOR_INSTRUCTIONS.to_string(),
            input: format!(
                "Paper: {}\nFind every quantitative claim and record the full set with \
                 record_claims.",
                paper.title
            ),
            temperature: 0.0,
            max_output_tokens: self.settings.llm.max_output_tokens,
            tools: vec![
                ToolSpec::FileSearch {
                    index: index_handle.clone(),
                    max_results: FILE_SEARCH_MAX_RESULTS,
                },
                ToolSpec::Function {
                    contract: contract.clone(),
                },
            ],
        };

        let forward = spawn_event_forwarder(events.clone(), AgentRole::Extractor.as_str());
        let response =
            self.harness.run(&request, forward).await.map_err(agent_failure)?;

        let min_confidence = MinConfidenceGuardrail {
            threshold: self.settings.extract.min_confidence,
        };
        let well_formed = WellFormedClaimsGuardrail;
        let guardrails: Vec<&dyn OutputGuardrail<ClaimSheet>> = vec![&min_confidence, &well_formed];
        let sheet: ClaimSheet = self
            .harness
            .structured(&response, &contract, &guardrails)
            .await
            .map_err(agent_failure)?;

        let threshold = self.settings.extract.min_confidence;
        Ok(sheet
            .claims
            .into_iter()
            .filter(|claim| claim.confidence >= threshold)
            .map(|draft| Claim {
                id: ClaimId::generate(),
                paper_id: paper.id.clone(),
                dataset_name: draft.dataset_name,
                split: draft.split,
                metric_name: draft.metric_name,
                metric_value: draft.metric_value,
                units: draft.units,
                method_snippet: draft.method_snippet,
                source_citation: draft.source_citation,
                confidence: draft.confidence,
                dataset_format: draft.dataset_format,
                target_column: draft.target_column,
                preprocessing_notes: draft.preprocessing_notes,
                dataset_url: draft.dataset_url,
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Plan
    // ------------------------------------------------------------------

    /// Synthesizes a plan from selected claims under a budget.
    ///
    /// # Errors
    ///
    /// Returns typed errors for input violations, policy refusals, and
    /// synthesis failures; no plan record persists on failure.
    pub async fn plan(
        &self,
        paper_id: &PaperId,
        claim_ids: &[ClaimId],
        budget_minutes: u32,
        events: Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<PlanRecord, TypedError> {
        let started = Instant::now();
        let outcome = self.plan_inner(paper_id, claim_ids, budget_minutes, events).await;
        self.observe(Stage::Plan, started, &outcome);
        outcome
    }

    /// Plan body; failures flip the paper to failed without persisting.
    async fn plan_inner(
        &self,
        paper_id: &PaperId,
        claim_ids: &[ClaimId],
        budget_minutes: u32,
        events: Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<PlanRecord, TypedError> {
        let paper = self.load_paper(paper_id)?;
        ensure_transition(paper.stage, Stage::Plan)?;
        let index_handle = paper.index_handle.clone().ok_or_else(|| {
            TypedError::new(ErrorCode::PaperNotReady, "paper has no searchable index")
        })?;

        if budget_minutes == 0 {
            return Err(TypedError::new(ErrorCode::InvalidBudget, "budget must be at least 1"));
        }
        if budget_minutes > MAX_REQUEST_BUDGET_MINUTES {
            return Err(TypedError::new(
                ErrorCode::BudgetExceedsPolicy,
                format!("budget {budget_minutes} exceeds {MAX_REQUEST_BUDGET_MINUTES}"),
            ));
        }

        let all_claims = self.store.list_claims(paper_id).map_err(store_failure)?;
        let selected: Vec<Claim> = all_claims
            .into_iter()
            .filter(|claim| claim_ids.contains(&claim.id))
            .collect();
        if selected.is_empty() {
            return Err(TypedError::new(
                ErrorCode::NoClaimsSelected,
                "no selected claims were found on the paper",
            ));
        }

        self.set_stage(paper_id, Stage::Plan, PaperStatus::Processing)?;
        emit(&events, StreamEvent::StageUpdate {
            stage: Stage::Plan,
            paper_id: Some(paper_id.clone()),
            run_id: None,
        })
        .await;

        let planner_config = PlannerConfig {
            reasoner_model: self.settings.llm.reasoner_model.clone(),
            shaper_model: self.settings.llm.shaper_model.clone(),
            shaper_temperature: self.settings.llm.temperature,
            max_output_tokens: self.settings.llm.max_output_tokens,
            two_stage_enabled: self.settings.llm.two_stage_enabled,
            file_search_max_results: FILE_SEARCH_MAX_RESULTS,
        };
        let synthesizer = PlanSynthesizer::new(&self.harness, &self.registry, planner_config);
        let forward = spawn_event_forwarder(events.clone(), AgentRole::Reasoner.as_str());
        let synthesis = synthesizer
            .synthesize(
                SynthesisInput {
                    paper: &paper,
                    claims: &selected,
                    index: &index_handle,
                    requested_budget_minutes: budget_minutes,
                },
                forward,
            )
            .await;

        match synthesis {
            Ok(outcome) => {
                for warning in &outcome.sanitized.warnings {
                    emit(&events, StreamEvent::LogLine {
                        message: format!("sanitizer: {warning}"),
                    })
                    .await;
                }
                let now = Timestamp::now();
                let record = PlanRecord {
                    id: PlanId::generate(),
                    paper_id: paper_id.clone(),
                    document: outcome.sanitized.plan,
                    env_fingerprint: None,
                    state: PlanState::Validated,
                    reasoning: Some(outcome.reasoning),
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_plan(&record).map_err(store_failure)?;
                self.set_stage(paper_id, Stage::Plan, PaperStatus::Completed)?;
                Ok(record)
            }
            Err(error) => {
                let typed = plan_failure(&error);
                let _ = self.set_stage(paper_id, Stage::Plan, PaperStatus::Failed);
                emit(&events, StreamEvent::Error {
                    code: typed.code,
                    message: typed.message.clone(),
                })
                .await;
                Err(typed)
            }
        }
    }

    // ------------------------------------------------------------------
    // Materialize
    // ------------------------------------------------------------------

    /// Builds, validates, and persists the notebook for a plan.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::NotebookValidationFailed`] with the issue list
    /// when validation rejects the artifact; nothing is persisted then.
    pub async fn materialize(&self, plan_id: &PlanId) -> Result<MaterializeOutcome, TypedError> {
        let started = Instant::now();
        let outcome = self.materialize_inner(plan_id);
        self.observe(Stage::Materialize, started, &outcome);
        outcome
    }

    /// Materialize body; validation failures persist nothing.
    fn materialize_inner(&self, plan_id: &PlanId) -> Result<MaterializeOutcome, TypedError> {
        let plan = self.load_plan(plan_id)?;
        let paper = self.load_paper(&plan.paper_id)?;
        ensure_transition(paper.stage, Stage::Materialize)?;
        self.set_stage(&paper.id, Stage::Materialize, PaperStatus::Processing)?;

        let built =
            build_notebook(&plan.document, &paper.title, Timestamp::now(), &self.registry);
        let issues = validate_notebook(&built.notebook);
        if !issues.is_empty() {
            let _ = self.set_stage(&paper.id, Stage::Materialize, PaperStatus::Failed);
            let rendered = serde_json::to_string(&issues).unwrap_or_default();
            return Err(TypedError::new(ErrorCode::NotebookValidationFailed, rendered));
        }

        let notebook_path = paths::plan_notebook_path(plan_id);
        let requirements_path = paths::plan_requirements_path(plan_id);
        let notebook_bytes = built
            .notebook
            .to_bytes()
            .map_err(|err| TypedError::new(ErrorCode::BlobStoreFailure, err.to_string()))?;
        self.blobs.put(&notebook_path, &notebook_bytes).map_err(blob_failure)?;
        self.blobs
            .put(&requirements_path, built.requirements.as_bytes())
            .map_err(blob_failure)?;
        self.store
            .set_plan_fingerprint(plan_id, &built.fingerprint, Timestamp::now())
            .map_err(store_failure)?;
        self.set_stage(&paper.id, Stage::Materialize, PaperStatus::Completed)?;

        Ok(MaterializeOutcome {
            notebook_path,
            requirements_path,
            fingerprint: built.fingerprint,
        })
    }

    // ------------------------------------------------------------------
    // Run
    // ------------------------------------------------------------------

    /// Starts a background notebook execution for a materialized plan.
    ///
    /// The returned run is pending; subscribe to the broker for live events.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::PlanNotMaterialized`] when the plan has no
    /// environment fingerprint or notebook artifact.
    pub async fn run(&self, plan_id: &PlanId) -> Result<Run, TypedError> {
        let plan = self.load_plan(plan_id)?;
        let paper = self.load_paper(&plan.paper_id)?;
        ensure_transition(paper.stage, Stage::Run)?;
        let fingerprint = plan.env_fingerprint.clone().ok_or_else(|| {
            TypedError::new(ErrorCode::PlanNotMaterialized, "plan has no fingerprint")
        })?;

        let notebook_bytes = match self.blobs.get(&paths::plan_notebook_path(plan_id)) {
            Ok(bytes) => bytes,
            Err(BlobError::NotFound(_)) => {
                return Err(TypedError::new(
                    ErrorCode::PlanNotMaterialized,
                    "notebook artifact is missing",
                ));
            }
            Err(err) => return Err(blob_failure(err)),
        };
        let notebook = p2n_notebook::Notebook::from_bytes(&notebook_bytes)
            .map_err(|err| TypedError::new(ErrorCode::BlobStoreFailure, err.to_string()))?;

        let dataset = match &paper.dataset_upload {
            None => None,
            Some(upload) => {
                let bytes = self.blobs.get(&upload.blob_path).map_err(blob_failure)?;
                Some(StagedDataset {
                    filename: format!("dataset.{}", upload.format.extension()),
                    bytes,
                })
            }
        };

        let now = Timestamp::now();
        let run = Run {
            id: RunId::generate(),
            plan_id: plan_id.clone(),
            paper_id: paper.id.clone(),
            status: RunStatus::Pending,
            seed: plan.document.config.seed,
            env_fingerprint: fingerprint,
            created_at: now,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            error_code: None,
            error_message: None,
        };
        self.store.insert_run(&run).map_err(store_failure)?;
        self.broker
            .register(&run.id)
            .map_err(|err| TypedError::new(ErrorCode::MetadataStoreFailure, err.to_string()))?;
        self.set_stage(&paper.id, Stage::Run, PaperStatus::Processing)?;

        let request = ExecutionRequest {
            run_id: run.id.clone(),
            notebook,
            primary_metric: plan.document.metrics.primary.clone(),
            budget_minutes: plan.document.policy.budget_minutes,
            max_minutes: self.settings.executor.run_max_minutes,
            dataset,
            dataset_cache_dir: self.settings.executor.dataset_cache_dir.clone(),
            offline_mode: self.settings.executor.offline_mode,
        };
        self.spawn_run_task(request, run.clone());
        Ok(run)
    }

    /// Spawns the background execution task for a pending run.
    fn spawn_run_task(&self, request: ExecutionRequest, mut run: Run) {
        let store = Arc::clone(&self.store);
        let blobs = Arc::clone(&self.blobs);
        let broker = Arc::clone(&self.broker);
        let metrics = Arc::clone(&self.metrics);
        let kernel = self.kernel.clone();

        tokio::spawn(async move {
            let sink =
                PersistingRunSink::new(Arc::clone(&store), Arc::clone(&broker), run.id.clone());
            sink_emit_stage(&sink, &run.id);

            run.status = RunStatus::Running;
            run.started_at = Some(Timestamp::now());
            let _ = store.update_run(&run);

            let executed = execute_notebook(&request, &kernel, &sink).await;
            let now = Timestamp::now();
            run.completed_at = Some(now);

            match executed {
                Ok(outcome) => {
                    run.duration_seconds = Some(outcome.duration_seconds);
                    persist_artifacts(&blobs, &run.id, &outcome.artifacts);
                    match outcome.error {
                        None => {
                            run.status = RunStatus::Succeeded;
                            let _ = store.update_paper_stage(
                                &run.paper_id,
                                Stage::Run,
                                PaperStatus::Completed,
                                now,
                            );
                        }
                        Some(error) => {
                            run.status = RunStatus::Failed;
                            run.error_code = Some(error.code);
                            run.error_message = Some(error.message);
                            let _ = store.update_paper_stage(
                                &run.paper_id,
                                Stage::Run,
                                PaperStatus::Failed,
                                now,
                            );
                        }
                    }
                }
                Err(environment_error) => {
                    run.status = RunStatus::Failed;
                    run.error_code = Some(ErrorCode::CellExecutionFailed);
                    run.error_message = Some(environment_error.to_string());
                    let _ = store.update_paper_stage(
                        &run.paper_id,
                        Stage::Run,
                        PaperStatus::Failed,
                        now,
                    );
                }
            }
            let _ = store.update_run(&run);
            let events = store.list_run_events(&run.id).map(|list| list.len()).unwrap_or(0);
            metrics.run_events_published(events as u64);
            broker.close(&run.id);
        });
    }

    // ------------------------------------------------------------------
    // Report
    // ------------------------------------------------------------------

    /// Derives the claimed-versus-observed gap for a paper.
    ///
    /// # Errors
    ///
    /// Returns typed errors when no successful run exists or its metrics
    /// artifact is unreadable.
    pub async fn report(&self, paper_id: &PaperId) -> Result<GapReport, TypedError> {
        let started = Instant::now();
        let outcome = self.report_inner(paper_id);
        self.observe(Stage::Report, started, &outcome);
        outcome
    }

    /// Report body.
    fn report_inner(&self, paper_id: &PaperId) -> Result<GapReport, TypedError> {
        let paper = self.load_paper(paper_id)?;
        ensure_transition(paper.stage, Stage::Report)?;

        let plans = self.store.list_plans(paper_id).map_err(store_failure)?;
        let plan = plans.first().ok_or_else(|| {
            TypedError::new(ErrorCode::PlanNotFound, "paper has no plans")
        })?;
        let runs = self.store.list_runs(&plan.id).map_err(store_failure)?;
        let run = runs
            .iter()
            .find(|run| run.status == RunStatus::Succeeded)
            .ok_or_else(|| {
                TypedError::new(ErrorCode::RunNotFound, "plan has no successful run")
            })?;

        let metrics_bytes = self
            .blobs
            .get(&paths::run_metrics_path(&run.id))
            .map_err(|_| TypedError::new(ErrorCode::MetricsMissing, "metrics artifact missing"))?;
        let metrics: serde_json::Value = serde_json::from_slice(&metrics_bytes)
            .map_err(|err| TypedError::new(ErrorCode::MetricsMissing, err.to_string()))?;
        let primary = &plan.document.metrics.primary;
        let observed_raw = metrics
            .get(primary)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| {
                TypedError::new(
                    ErrorCode::MetricsMissing,
                    format!("metrics lack the primary metric {primary}"),
                )
            })?;

        let goal = plan.document.metrics.goal;
        let (observed, representation_normalized) = normalize_observed(goal, observed_raw);
        let claims = self.store.list_claims(paper_id).map_err(store_failure)?;
        let lowered = primary.to_ascii_lowercase();
        let mut citations: Vec<String> = claims
            .iter()
            .filter(|claim| claim.metric_name.to_ascii_lowercase() == lowered)
            .map(|claim| claim.source_citation.clone())
            .collect();
        if citations.is_empty() {
            citations = claims.iter().map(|claim| claim.source_citation.clone()).collect();
        }

        let mut artifacts = Vec::new();
        for path in [
            paths::run_metrics_path(&run.id),
            paths::run_events_path(&run.id),
            paths::run_logs_path(&run.id),
        ] {
            if let Ok(reference) = self.blobs.signed_ref(&path, SIGNED_REF_TTL_SECONDS) {
                artifacts.push(reference);
            }
        }

        self.set_stage(paper_id, Stage::Report, PaperStatus::Completed)?;
        Ok(GapReport {
            metric: primary.clone(),
            claimed: goal,
            observed,
            gap_percent: gap_percent(goal, observed),
            representation_normalized,
            citations,
            artifacts,
        })
    }

    // ------------------------------------------------------------------
    // Deletion and reads
    // ------------------------------------------------------------------

    /// Deletes a paper, its index, its blobs, and every owned row.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::PaperNotFound`] for unknown papers; blob and
    /// index cleanup is best effort.
    pub async fn delete_paper(&self, paper_id: &PaperId) -> Result<(), TypedError> {
        let paper = self.load_paper(paper_id)?;
        if let Some(handle) = &paper.index_handle
            && self.index.delete_index(handle).await.is_err()
        {
            // Provider-side cleanup is best effort.
        }
        let _ = self.blobs.delete(&paper.pdf_path);
        if let Some(upload) = &paper.dataset_upload {
            let _ = self.blobs.delete(&upload.blob_path);
        }
        if let Ok(plans) = self.store.list_plans(paper_id) {
            for plan in plans {
                let _ = self.blobs.delete(&paths::plan_notebook_path(&plan.id));
                let _ = self.blobs.delete(&paths::plan_requirements_path(&plan.id));
                if let Ok(runs) = self.store.list_runs(&plan.id) {
                    for run in runs {
                        let _ = self.blobs.delete(&paths::run_metrics_path(&run.id));
                        let _ = self.blobs.delete(&paths::run_events_path(&run.id));
                        let _ = self.blobs.delete(&paths::run_logs_path(&run.id));
                    }
                }
            }
        }
        self.store.delete_paper(paper_id).map_err(|err| match err {
            StoreError::NotFound(_) => {
                TypedError::new(ErrorCode::PaperNotFound, format!("paper {paper_id}"))
            }
            other => store_failure(other),
        })
    }

    /// Returns the claims currently stored for a paper.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::MetadataStoreFailure`] on backend failure.
    pub fn list_claims(&self, paper_id: &PaperId) -> Result<Vec<Claim>, TypedError> {
        self.store.list_claims(paper_id).map_err(store_failure)
    }

    /// Returns a plan record.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::PlanNotFound`] for unknown plans.
    pub fn get_plan(&self, plan_id: &PlanId) -> Result<PlanRecord, TypedError> {
        self.load_plan(plan_id)
    }

    /// Returns the runs recorded for a plan, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::MetadataStoreFailure`] on backend failure.
    pub fn list_runs(&self, plan_id: &PlanId) -> Result<Vec<Run>, TypedError> {
        self.store.list_runs(plan_id).map_err(store_failure)
    }

    /// Returns the broker used for run subscriptions.
    #[must_use]
    pub fn broker(&self) -> &Arc<RunStreamBroker> {
        &self.broker
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Loads a paper, mapping absence onto the input error.
    fn load_paper(&self, paper_id: &PaperId) -> Result<Paper, TypedError> {
        self.store.get_paper(paper_id).map_err(|err| match err {
            StoreError::NotFound(_) => {
                TypedError::new(ErrorCode::PaperNotFound, format!("paper {paper_id}"))
            }
            other => store_failure(other),
        })
    }

    /// Loads a plan, mapping absence onto the input error.
    fn load_plan(&self, plan_id: &PlanId) -> Result<PlanRecord, TypedError> {
        self.store.get_plan(plan_id).map_err(|err| match err {
            StoreError::NotFound(_) => {
                TypedError::new(ErrorCode::PlanNotFound, format!("plan {plan_id}"))
            }
            other => store_failure(other),
        })
    }

    /// Updates a paper's stage and status.
    fn set_stage(
        &self,
        paper_id: &PaperId,
        stage: Stage,
        status: PaperStatus,
    ) -> Result<(), TypedError> {
        self.store
            .update_paper_stage(paper_id, stage, status, Timestamp::now())
            .map_err(store_failure)
    }

    /// Returns the per-paper lock, creating it on first use.
    fn paper_lock(&self, paper_id: &PaperId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.paper_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(paper_id.clone()).or_default())
    }

    /// Records a stage metric observation.
    fn observe<T>(&self, stage: Stage, started: Instant, outcome: &Result<T, TypedError>) {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.stage_completed(StageMetricEvent {
            stage,
            outcome: if outcome.is_ok() { StageOutcome::Ok } else { StageOutcome::Error },
            error_code: outcome.as_ref().err().map(|error| error.code),
            duration_ms,
        });
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Emits a stream event, ignoring disconnected consumers.
async fn emit(events: &Option<mpsc::Sender<StreamEvent>>, event: StreamEvent) {
    if let Some(events) = events
        && events.send(event).await.is_err()
    {
        // A disconnected consumer stops delivery, never the stage.
    }
}

/// Spawns a task translating provider events into stream events.
fn spawn_event_forwarder(
    events: Option<mpsc::Sender<StreamEvent>>,
    agent: &'static str,
) -> Option<mpsc::Sender<ProviderEvent>> {
    let events = events?;
    let (provider_tx, mut provider_rx) = mpsc::channel::<ProviderEvent>(64);
    tokio::spawn(async move {
        while let Some(event) = provider_rx.recv().await {
            let mapped = match event {
                ProviderEvent::TextDelta {
                    delta,
                } => Some(StreamEvent::Token {
                    delta,
                    agent: Some(agent.to_string()),
                }),
                ProviderEvent::FileSearchCall {
                    query,
                } => Some(StreamEvent::FileSearchCall {
                    query,
                }),
                ProviderEvent::WebSearchCall {
                    query,
                } => Some(StreamEvent::LogLine {
                    message: format!("web search{}", render_query(query.as_deref())),
                }),
                ProviderEvent::FunctionCallStart {
                    ..
                }
                | ProviderEvent::FunctionArgumentsDelta {
                    ..
                }
                | ProviderEvent::Completed => None,
            };
            if let Some(mapped) = mapped
                && events.send(mapped).await.is_err()
            {
                break;
            }
        }
    });
    Some(provider_tx)
}

/// Renders an optional search query suffix for log lines.
fn render_query(query: Option<&str>) -> String {
    query.map_or_else(String::new, |query| format!(": {query}"))
}

/// Emits the run-scoped stage update through the persisting sink.
fn sink_emit_stage(sink: &PersistingRunSink, run_id: &RunId) {
    use p2n_executor::RunEventSink as _;
    sink.emit("stage_update", &json!({ "stage": "run", "run_id": run_id.as_str() }));
}

/// Persists run artifacts at their stable paths, best effort.
fn persist_artifacts(
    blobs: &Arc<dyn BlobStore>,
    run_id: &RunId,
    artifacts: &p2n_executor::ExecutionArtifacts,
) {
    if let Some(metrics) = &artifacts.metrics_json {
        let _ = blobs.put(&paths::run_metrics_path(run_id), metrics);
    }
    let _ = blobs.put(&paths::run_events_path(run_id), &artifacts.events_jsonl);
    let _ = blobs.put(&paths::run_logs_path(run_id), &artifacts.logs_text);
}

/// Maps a store failure onto the external error code.
fn store_failure(error: StoreError) -> TypedError {
    TypedError::new(ErrorCode::MetadataStoreFailure, error.to_string())
}

/// Maps a blob failure onto the external error code.
fn blob_failure(error: BlobError) -> TypedError {
    TypedError::new(ErrorCode::BlobStoreFailure, error.to_string())
}

/// Maps an agent failure onto its stage-facing code.
fn agent_failure(error: AgentError) -> TypedError {
    let code = match &error {
        AgentError::CapExceeded(_) => ErrorCode::ToolCapExceeded,
        AgentError::Provider(_) => ErrorCode::LlmApiFailure,
        AgentError::Tripwire(_)
        | AgentError::MissingFunctionCall {
            ..
        }
        | AgentError::MalformedOutput(_) => ErrorCode::GuardrailTripped,
    };
    TypedError::new(code, error.to_string())
}

/// Maps a plan synthesis failure onto its typed error.
fn plan_failure(error: &PlanError) -> TypedError {
    TypedError::new(error.code(), error.to_string())
}
