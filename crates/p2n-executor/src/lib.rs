// crates/p2n-executor/src/lib.rs
// ============================================================================
// Module: Paper2Notebook Executor Library
// Description: Sandboxed notebook execution with a live event bridge.
// Purpose: Run validated notebooks CPU-only under a wall-clock budget.
// Dependencies: p2n-core, p2n-notebook, serde_json, tokio
// ============================================================================

//! ## Overview
//! `p2n-executor` runs a materialized notebook inside a per-run sandbox: a
//! fresh working directory, a worker kernel child process with scrubbed GPU
//! visibility, per-cell execution under the plan's wall-clock budget, and an
//! event bridge that tails the notebook's `events.jsonl` between cells.
//! Artifacts (metrics, event log, captured logs) are returned for
//! persistence whether the run succeeded or failed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod kernel;
pub mod runner;
pub mod tailer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use kernel::CellReply;
pub use kernel::KernelConfig;
pub use kernel::KernelError;
pub use kernel::KernelProcess;
pub use runner::ABSOLUTE_MAX_MINUTES;
pub use runner::ExecutionArtifacts;
pub use runner::ExecutionOutcome;
pub use runner::ExecutionRequest;
pub use runner::RunEventSink;
pub use runner::RunnerError;
pub use runner::StagedDataset;
pub use runner::execute_notebook;
pub use tailer::EventsTailer;
pub use tailer::MAX_EVENT_LOG_BYTES;
pub use tailer::MAX_LOG_BYTES;
pub use tailer::TRUNCATION_SENTINEL;
pub use tailer::truncate_with_sentinel;
