// crates/p2n-executor/src/runner.rs
// ============================================================================
// Module: Notebook Runner
// Description: Sandboxed per-run notebook execution with an event bridge.
// Purpose: Run cells under budget, forward events, capture artifacts.
// Dependencies: crate::{kernel, tailer}, p2n-core, p2n-notebook, tokio
// ============================================================================

//! ## Overview
//! One run is one fresh working directory, one kernel process, and one pass
//! over the notebook's code cells. Between cells the runner forwards freshly
//! appended notebook events and accumulates captured output. The wall clock
//! is the plan budget capped by the absolute ceiling; hitting it kills the
//! kernel and finalizes the run as timed out. Artifacts captured up to a
//! failure are still returned for persistence.
//!
//! Security posture: the notebook is untrusted generated code; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use p2n_core::ErrorCode;
use p2n_core::RunId;
use p2n_core::TypedError;
use p2n_notebook::Notebook;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::kernel::KernelConfig;
use crate::kernel::KernelError;
use crate::kernel::KernelProcess;
use crate::tailer::EventsTailer;
use crate::tailer::MAX_EVENT_LOG_BYTES;
use crate::tailer::MAX_LOG_BYTES;
use crate::tailer::truncate_with_sentinel;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Absolute per-run wall-clock ceiling in minutes.
pub const ABSOLUTE_MAX_MINUTES: u32 = 25;

// ============================================================================
// SECTION: Request and Outcome
// ============================================================================

/// A dataset file staged into the run's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDataset {
    /// Filename written into the working directory.
    pub filename: String,
    /// File bytes.
    pub bytes: Vec<u8>,
}

/// One notebook execution request.
///
/// # Invariants
/// - `budget_minutes >= 1`; the effective budget is capped by
///   [`ABSOLUTE_MAX_MINUTES`] and `max_minutes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    /// Run identifier, used for diagnostics only.
    pub run_id: RunId,
    /// The notebook to execute.
    pub notebook: Notebook,
    /// Primary metric name that must appear in `metrics.json`.
    pub primary_metric: String,
    /// Plan budget in minutes.
    pub budget_minutes: u32,
    /// Deployment ceiling in minutes.
    pub max_minutes: u32,
    /// Optional dataset file staged into the working directory.
    pub dataset: Option<StagedDataset>,
    /// Dataset cache directory passed through to the notebook.
    pub dataset_cache_dir: Option<PathBuf>,
    /// Offline mode flag passed through to the notebook.
    pub offline_mode: bool,
}

/// Artifacts captured from a run, present regardless of outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionArtifacts {
    /// `metrics.json` bytes when the notebook produced them.
    pub metrics_json: Option<Vec<u8>>,
    /// Event log bytes, capped with a sentinel.
    pub events_jsonl: Vec<u8>,
    /// Captured stdout and stderr, capped with a sentinel.
    pub logs_text: Vec<u8>,
}

/// Terminal outcome of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Typed failure, absent on success.
    pub error: Option<TypedError>,
    /// Parsed metrics object on success.
    pub metrics: Option<Value>,
    /// Captured artifacts.
    pub artifacts: ExecutionArtifacts,
    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
}

impl ExecutionOutcome {
    /// Returns true when the run succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// SECTION: Event Sink
// ============================================================================

/// Destination for live run events.
///
/// The pipeline persists each event before fanning it to subscribers, so
/// emission order here is the canonical run event order.
pub trait RunEventSink: Send + Sync {
    /// Emits one `(type, payload)` event.
    fn emit(&self, event_type: &str, payload: &Value);
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Runner environment errors raised before any cell executes.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The working directory could not be prepared.
    #[error("workspace failure: {0}")]
    Workspace(String),
    /// The kernel could not be spawned.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Executes one notebook under the configured kernel.
///
/// # Errors
///
/// Returns [`RunnerError`] only for environment failures before the first
/// cell; execution failures are reported inside the outcome.
pub async fn execute_notebook(
    request: &ExecutionRequest,
    kernel_config: &KernelConfig,
    sink: &dyn RunEventSink,
) -> Result<ExecutionOutcome, RunnerError> {
    let started = Instant::now();
    let workspace = prepare_workspace(request).await?;
    let mut environment = BTreeMap::new();
    if let Some(dataset) = &request.dataset {
        environment.insert("P2N_DATASET_PATH".to_string(), dataset.filename.clone());
    }
    if let Some(cache_dir) = &request.dataset_cache_dir {
        environment
            .insert("DATASET_CACHE_DIR".to_string(), cache_dir.to_string_lossy().to_string());
    }
    if request.offline_mode {
        environment.insert("OFFLINE_MODE".to_string(), "true".to_string());
    }

    let kernel = KernelProcess::spawn(kernel_config, &workspace, &environment)?;
    let outcome = run_cells(request, kernel, sink, &workspace, started).await;
    if tokio::fs::remove_dir_all(&workspace).await.is_err() {
        // Workspace cleanup is best effort; artifacts are already captured.
    }
    Ok(outcome)
}

/// Creates the run's working directory and stages its inputs.
async fn prepare_workspace(request: &ExecutionRequest) -> Result<PathBuf, RunnerError> {
    let workspace = std::env::temp_dir().join(format!("p2n-run-{}", request.run_id));
    if tokio::fs::remove_dir_all(&workspace).await.is_ok() {
        // A stale directory from a crashed prior attempt was cleared.
    }
    tokio::fs::create_dir_all(&workspace)
        .await
        .map_err(|err| RunnerError::Workspace(err.to_string()))?;

    let notebook_bytes = request
        .notebook
        .to_bytes()
        .map_err(|err| RunnerError::Workspace(err.to_string()))?;
    tokio::fs::write(workspace.join("notebook.ipynb"), notebook_bytes)
        .await
        .map_err(|err| RunnerError::Workspace(err.to_string()))?;

    if let Some(dataset) = &request.dataset {
        tokio::fs::write(workspace.join(&dataset.filename), &dataset.bytes)
            .await
            .map_err(|err| RunnerError::Workspace(err.to_string()))?;
    }
    Ok(workspace)
}

/// Runs every code cell, bridging events and collecting artifacts.
async fn run_cells(
    request: &ExecutionRequest,
    mut kernel: KernelProcess,
    sink: &dyn RunEventSink,
    workspace: &std::path::Path,
    started: Instant,
) -> ExecutionOutcome {
    let budget_minutes =
        request.budget_minutes.min(request.max_minutes).min(ABSOLUTE_MAX_MINUTES);
    let deadline = Duration::from_secs(u64::from(budget_minutes) * 60);

    let mut tailer = EventsTailer::new(workspace.join("events.jsonl"));
    let mut logs: Vec<u8> = Vec::new();
    let code_cells: Vec<(usize, String)> = request
        .notebook
        .cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.is_code())
        .map(|(index, cell)| (index, cell.source_text()))
        .collect();
    let total = code_cells.len().max(1);

    let mut failure: Option<TypedError> = None;
    for (position, (cell_index, source)) in code_cells.iter().enumerate() {
        let percent = position * 100 / total;
        sink.emit("progress", &json!({ "percent": percent }));

        let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
            failure = Some(timeout_error(budget_minutes));
            break;
        };
        let reply =
            tokio::time::timeout(remaining, kernel.execute_cell(*cell_index, source)).await;
        match reply {
            Err(_) => {
                failure = Some(timeout_error(budget_minutes));
                break;
            }
            Ok(Err(kernel_error)) => {
                failure = Some(TypedError::new(
                    ErrorCode::CellExecutionFailed,
                    format!("cell {cell_index}: {kernel_error}"),
                ));
                break;
            }
            Ok(Ok(reply)) => {
                append_logs(&mut logs, &reply.stdout, &reply.stderr);
                forward_fresh_events(&mut tailer, sink).await;
                if !reply.is_ok() {
                    failure = Some(classify_cell_failure(*cell_index, &reply));
                    break;
                }
            }
        }
    }
    kernel.shutdown().await;
    forward_fresh_events(&mut tailer, sink).await;

    let mut metrics: Option<Value> = None;
    let mut metrics_bytes: Option<Vec<u8>> = None;
    if failure.is_none() {
        match verify_metrics(workspace, &request.primary_metric).await {
            Ok((value, bytes)) => {
                metrics = Some(value);
                metrics_bytes = Some(bytes);
                sink.emit("progress", &json!({ "percent": 100 }));
            }
            Err(error) => failure = Some(error),
        }
    } else if let Ok(bytes) = tokio::fs::read(workspace.join("metrics.json")).await {
        metrics_bytes = Some(bytes);
    }

    if let Some(error) = &failure {
        sink.emit("error", &json!({ "code": error.code.as_str(), "message": error.message }));
    }

    let events_bytes = tokio::fs::read(tailer.path()).await.unwrap_or_default();
    ExecutionOutcome {
        error: failure,
        metrics,
        artifacts: ExecutionArtifacts {
            metrics_json: metrics_bytes,
            events_jsonl: truncate_with_sentinel(events_bytes, MAX_EVENT_LOG_BYTES),
            logs_text: truncate_with_sentinel(logs, MAX_LOG_BYTES),
        },
        duration_seconds: started.elapsed().as_secs_f64(),
    }
}

/// Builds the timeout failure for the effective budget.
fn timeout_error(budget_minutes: u32) -> TypedError {
    TypedError::new(
        ErrorCode::RunTimeout,
        format!("run exceeded its {budget_minutes}-minute budget"),
    )
}

/// Classifies a raised cell into the GPU refusal or a plain cell failure.
fn classify_cell_failure(cell_index: usize, reply: &crate::kernel::CellReply) -> TypedError {
    let evalue = reply.evalue.as_deref().unwrap_or_default();
    let traceback = reply.traceback.as_deref().unwrap_or_default();
    if evalue.contains("GPU_REQUESTED") || traceback.contains("GPU_REQUESTED") {
        return TypedError::new(ErrorCode::GpuRequested, "GPU use detected at runtime");
    }
    let ename = reply.ename.as_deref().unwrap_or("Exception");
    TypedError::new(
        ErrorCode::CellExecutionFailed,
        format!("cell {cell_index} raised {ename}: {evalue}"),
    )
}

/// Appends one cell's captured output to the log buffer.
fn append_logs(logs: &mut Vec<u8>, stdout: &str, stderr: &str) {
    logs.extend_from_slice(stdout.as_bytes());
    if !stderr.is_empty() {
        logs.extend_from_slice(stderr.as_bytes());
    }
}

/// Forwards freshly appended notebook events to the sink.
async fn forward_fresh_events(tailer: &mut EventsTailer, sink: &dyn RunEventSink) {
    if let Ok(events) = tailer.poll().await {
        for (event_type, payload) in events {
            sink.emit(&event_type, &payload);
        }
    }
}

/// Verifies `metrics.json` exists and carries the primary metric.
async fn verify_metrics(
    workspace: &std::path::Path,
    primary_metric: &str,
) -> Result<(Value, Vec<u8>), TypedError> {
    let bytes = tokio::fs::read(workspace.join("metrics.json")).await.map_err(|_| {
        TypedError::new(ErrorCode::MetricsMissing, "metrics.json was not produced")
    })?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|err| {
        TypedError::new(ErrorCode::MetricsMissing, format!("metrics.json is invalid: {err}"))
    })?;
    if value.get(primary_metric).is_none() {
        return Err(TypedError::new(
            ErrorCode::MetricsMissing,
            format!("metrics.json lacks the primary metric {primary_metric}"),
        ));
    }
    Ok((value, bytes))
}
