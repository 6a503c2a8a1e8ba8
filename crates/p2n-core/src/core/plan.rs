// crates/p2n-core/src/core/plan.rs
// ============================================================================
// Module: Paper2Notebook Plan Documents
// Description: Strict Plan v1.1 document and the permissive planner draft.
// Purpose: Model LLM plan output as draft-to-strict with explicit caps.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Plan synthesis accepts many incoming shapes from the language model and
//! must end with exactly one: the versioned Plan v1.1 document consumed by
//! materialize. This module defines both ends of that funnel. [`PlanDraft`]
//! tolerates missing fields, bare-string justifications, and absent defaults;
//! [`PlanV11`] is strict and only produced by the sanitizer.
//!
//! Invariants on [`PlanV11`]:
//! - `version` is exactly [`PLAN_VERSION`].
//! - `config.epochs <= MAX_EPOCHS` and `policy.budget_minutes <= MAX_BUDGET_MINUTES`.
//! - `metrics.primary` is non-empty.
//! - `justifications` carries non-empty quote and citation for every key in
//!   [`REQUIRED_JUSTIFICATIONS`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// The only plan document version understood by this pipeline.
pub const PLAN_VERSION: &str = "1.1";
/// Hard cap on training epochs after sanitization.
pub const MAX_EPOCHS: u32 = 20;
/// Hard cap on the execution budget in minutes after sanitization.
pub const MAX_BUDGET_MINUTES: u32 = 20;
/// Largest budget accepted at the request boundary before clamping.
pub const MAX_REQUEST_BUDGET_MINUTES: u32 = 120;
/// Seed injected when the draft omits one.
pub const DEFAULT_SEED: i64 = 42;
/// Epoch count injected when the draft omits one.
pub const DEFAULT_EPOCHS: u32 = 10;
/// Justification keys that must be present and non-empty.
pub const REQUIRED_JUSTIFICATIONS: [&str; 3] = ["dataset", "model", "config"];

// ============================================================================
// SECTION: Source Kinds
// ============================================================================

/// Dataset source families understood by the code generators.
///
/// # Invariants
/// - Variants are stable for serialization and generator dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Bundled scikit-learn dataset.
    Sklearn,
    /// Torchvision download with a local cache.
    Torchvision,
    /// Hugging Face hub dataset.
    Huggingface,
    /// Synthetic classification data fallback.
    Synthetic,
    /// User-uploaded tabular file attached to the paper.
    Upload,
}

impl SourceKind {
    /// Returns the stable wire label for the source kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sklearn => "sklearn",
            Self::Torchvision => "torchvision",
            Self::Huggingface => "huggingface",
            Self::Synthetic => "synthetic",
            Self::Upload => "upload",
        }
    }
}

// ============================================================================
// SECTION: Strict Plan v1.1
// ============================================================================

/// Dataset section of a Plan v1.1 document.
///
/// # Invariants
/// - `name` is the canonical registry name, or the extractor-provided name
///   when the paper-upload override fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDataset {
    /// Canonical dataset name.
    pub name: String,
    /// Source family used for generator dispatch.
    pub source: SourceKind,
    /// Loader hints keyed by loader-specific names.
    #[serde(default)]
    pub loader_hints: BTreeMap<String, String>,
    /// Chosen training split name.
    pub train_split: String,
    /// Chosen evaluation split name.
    pub test_split: String,
}

/// Model section of a Plan v1.1 document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanModel {
    /// Human-readable model name as stated in the paper.
    pub name: String,
    /// Architecture family used for generator dispatch.
    pub architecture: String,
    /// Framework tag for the emitted code.
    pub framework: String,
}

/// Training configuration section of a Plan v1.1 document.
///
/// # Invariants
/// - `epochs <= MAX_EPOCHS` after sanitization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Random seed applied to every PRNG in the notebook.
    pub seed: i64,
    /// Mini-batch size.
    pub batch_size: u32,
    /// Training epochs.
    pub epochs: u32,
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Optimizer name.
    pub optimizer: String,
    /// Optional dropout probability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropout: Option<f64>,
    /// Optional weight decay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_decay: Option<f64>,
}

/// Metrics section of a Plan v1.1 document.
///
/// # Invariants
/// - `primary` is non-empty.
/// - `goal` keeps the representation written in the source paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    /// Primary metric name.
    pub primary: String,
    /// Optional secondary metric names.
    #[serde(default)]
    pub secondary: Vec<String>,
    /// Goal value for the primary metric.
    pub goal: f64,
    /// Loss function name.
    pub loss: String,
}

/// A verbatim quote with its citation backing a plan decision.
///
/// # Invariants
/// - Both fields are non-empty for required justification keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    /// Verbatim quote from the paper.
    pub quote: String,
    /// Citation locating the quote.
    pub citation: String,
}

/// Policy section of a Plan v1.1 document.
///
/// # Invariants
/// - `budget_minutes` is in `1..=MAX_BUDGET_MINUTES` after sanitization.
/// - `cpu_only` is always true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPolicy {
    /// Execution budget in whole minutes.
    pub budget_minutes: u32,
    /// License tag for the chosen dataset.
    pub license: String,
    /// CPU-only execution flag; structurally true.
    pub cpu_only: bool,
}

/// The canonical, versioned reproduction plan consumed by materialize.
///
/// # Invariants
/// - Only the sanitizer constructs values of this type from drafts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanV11 {
    /// Document version; always [`PLAN_VERSION`].
    pub version: String,
    /// Dataset selection.
    pub dataset: PlanDataset,
    /// Model selection.
    pub model: PlanModel,
    /// Training configuration.
    pub config: PlanConfig,
    /// Metric targets.
    pub metrics: PlanMetrics,
    /// Paper-quoted justifications keyed by decision name.
    pub justifications: BTreeMap<String, Justification>,
    /// Execution policy.
    pub policy: PlanPolicy,
    /// Optional visualization hints.
    #[serde(default)]
    pub visualizations: Vec<String>,
}

// ============================================================================
// SECTION: Permissive Draft
// ============================================================================

/// Justification as the model may emit it: structured or a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JustificationDraft {
    /// Structured quote and citation.
    Structured(Justification),
    /// Bare string to be wrapped by the sanitizer.
    Bare(String),
}

/// Dataset section as drafted by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDatasetDraft {
    /// Dataset name, not yet canonical.
    #[serde(default)]
    pub name: Option<String>,
    /// Source family when volunteered.
    #[serde(default)]
    pub source: Option<SourceKind>,
    /// Loader hints when volunteered.
    #[serde(default)]
    pub loader_hints: BTreeMap<String, String>,
    /// Training split name when volunteered.
    #[serde(default)]
    pub train_split: Option<String>,
    /// Evaluation split name when volunteered.
    #[serde(default)]
    pub test_split: Option<String>,
}

/// Model section as drafted by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanModelDraft {
    /// Human-readable model name.
    #[serde(default)]
    pub name: Option<String>,
    /// Architecture family.
    #[serde(default)]
    pub architecture: Option<String>,
    /// Framework tag.
    #[serde(default)]
    pub framework: Option<String>,
}

/// Training configuration as drafted by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanConfigDraft {
    /// Random seed when present.
    #[serde(default)]
    pub seed: Option<i64>,
    /// Mini-batch size when present.
    #[serde(default)]
    pub batch_size: Option<u32>,
    /// Training epochs when present.
    #[serde(default)]
    pub epochs: Option<u32>,
    /// Learning rate when present.
    #[serde(default)]
    pub learning_rate: Option<f64>,
    /// Optimizer name when present.
    #[serde(default)]
    pub optimizer: Option<String>,
    /// Dropout probability when present.
    #[serde(default)]
    pub dropout: Option<f64>,
    /// Weight decay when present.
    #[serde(default)]
    pub weight_decay: Option<f64>,
}

/// Metrics section as drafted by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetricsDraft {
    /// Primary metric name when present.
    #[serde(default)]
    pub primary: Option<String>,
    /// Secondary metric names.
    #[serde(default)]
    pub secondary: Vec<String>,
    /// Goal value when present.
    #[serde(default)]
    pub goal: Option<f64>,
    /// Loss function name when present.
    #[serde(default)]
    pub loss: Option<String>,
}

/// Policy section as drafted by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPolicyDraft {
    /// Budget in minutes when present.
    #[serde(default)]
    pub budget_minutes: Option<u32>,
    /// License tag when present.
    #[serde(default)]
    pub license: Option<String>,
    /// CPU-only flag when present.
    #[serde(default)]
    pub cpu_only: Option<bool>,
}

/// Permissive plan draft accepted from either planner pass.
///
/// # Invariants
/// - Unknown keys are dropped at deserialization.
/// - Every field tolerates absence; the sanitizer decides what is fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    /// Declared version when present.
    #[serde(default)]
    pub version: Option<String>,
    /// Dataset section when present.
    #[serde(default)]
    pub dataset: Option<PlanDatasetDraft>,
    /// Model section when present.
    #[serde(default)]
    pub model: Option<PlanModelDraft>,
    /// Config section when present.
    #[serde(default)]
    pub config: Option<PlanConfigDraft>,
    /// Metrics section when present.
    #[serde(default)]
    pub metrics: Option<PlanMetricsDraft>,
    /// Justifications keyed by decision name.
    #[serde(default)]
    pub justifications: BTreeMap<String, JustificationDraft>,
    /// Policy section when present.
    #[serde(default)]
    pub policy: Option<PlanPolicyDraft>,
    /// Visualization hints.
    #[serde(default)]
    pub visualizations: Vec<String>,
}
