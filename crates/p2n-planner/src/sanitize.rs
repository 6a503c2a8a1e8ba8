// crates/p2n-planner/src/sanitize.rs
// ============================================================================
// Module: Plan Sanitizer
// Description: Deterministic normalizer from plan draft to Plan v1.1.
// Purpose: Coerce, resolve, cap, and validate model plan output without LLMs.
// Dependencies: crate::{error, schema, toolbox}, p2n-core, p2n-registry
// ============================================================================

//! ## Overview
//! The sanitizer is a fixed sequence of pure steps over a permissive draft:
//! structural coercion, dataset alias resolution, the paper-upload override,
//! caps, justification structuring, and final schema validation. Every step
//! is idempotent and order-stable, so sanitizing an already-sanitized plan
//! reproduces it exactly. The sanitizer never calls a language model.
//!
//! Invariants:
//! - A plan is accepted only when its dataset resolves in the registry (and
//!   is not block-listed) or the paper-upload override fired.
//! - Epochs and budget never exceed their hard caps after sanitization.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use p2n_core::Claim;
use p2n_core::Justification;
use p2n_core::JustificationDraft;
use p2n_core::Paper;
use p2n_core::PlanConfig;
use p2n_core::PlanDataset;
use p2n_core::PlanDraft;
use p2n_core::PlanMetrics;
use p2n_core::PlanModel;
use p2n_core::PlanPolicy;
use p2n_core::PlanV11;
use p2n_core::SourceKind;
use p2n_core::plan::DEFAULT_EPOCHS;
use p2n_core::plan::DEFAULT_SEED;
use p2n_core::plan::MAX_BUDGET_MINUTES;
use p2n_core::plan::MAX_EPOCHS;
use p2n_core::plan::PLAN_VERSION;
use p2n_core::plan::REQUIRED_JUSTIFICATIONS;
use p2n_registry::DatasetClass;
use p2n_registry::DatasetRegistry;
use p2n_registry::RegistryEntry;
use p2n_registry::classify;
use p2n_registry::normalize_name;
use serde_json::Value;

use crate::error::PlanError;
use crate::schema::validate_plan;
use crate::toolbox::license_for;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Batch size injected when the draft omits one.
const DEFAULT_BATCH_SIZE: u32 = 32;
/// Learning rate injected when the draft omits one.
const DEFAULT_LEARNING_RATE: f64 = 0.001;
/// Optimizer injected when the draft omits one.
const DEFAULT_OPTIMIZER: &str = "lbfgs";
/// Loss name injected when the draft omits one.
const DEFAULT_LOSS: &str = "log_loss";
/// Citation recorded when a bare-string justification is wrapped.
const INFERRED_CITATION: &str = "Inferred";

// ============================================================================
// SECTION: Context and Outcome
// ============================================================================

/// Immutable context the sanitizer resolves against.
///
/// # Invariants
/// - `claims` is the non-empty claim subset selected for planning.
/// - `requested_budget_minutes` has passed input validation.
#[derive(Debug, Clone, Copy)]
pub struct SanitizeContext<'a> {
    /// Process-wide dataset registry.
    pub registry: &'a DatasetRegistry,
    /// Owning paper, including any dataset upload.
    pub paper: &'a Paper,
    /// Selected claims.
    pub claims: &'a [Claim],
    /// Budget requested by the caller, in minutes.
    pub requested_budget_minutes: u32,
}

/// A sanitized plan together with advisory warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeOutcome {
    /// The validated plan document.
    pub plan: PlanV11,
    /// Advisory warnings accumulated across steps.
    pub warnings: Vec<String>,
}

/// Dataset resolution state threaded between steps two and three.
#[derive(Debug, Clone)]
enum DatasetResolution {
    /// Resolved against a registry entry.
    Registry(RegistryEntry),
    /// Resolved against the paper upload.
    Upload {
        /// Canonical name adopted for the plan.
        name: String,
    },
    /// Name survived but matched nothing.
    Unresolved,
    /// Entry was removed by the block-list.
    Removed,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Sanitizes a raw plan draft into a valid Plan v1.1 document.
///
/// The step order is fixed: structural coercion, dataset resolution, the
/// paper-upload override, caps, justification structuring, final validation.
///
/// # Errors
///
/// Returns [`PlanError::NoAllowedDatasets`] when no dataset survives,
/// [`PlanError::JustificationMissing`] or [`PlanError::PrimaryMetricMissing`]
/// for absent required fields, and [`PlanError::SchemaInvalid`] when the
/// finished document fails schema validation.
pub fn sanitize(raw: &Value, ctx: &SanitizeContext<'_>) -> Result<SanitizeOutcome, PlanError> {
    let mut warnings = Vec::new();

    let draft = coerce_structure(raw)?;
    let (resolution, mut dataset_draft) = resolve_dataset(&draft, ctx, &mut warnings);
    let resolution = apply_upload_override(resolution, &mut dataset_draft, ctx, &mut warnings);
    let dataset = finish_dataset(resolution, dataset_draft, ctx)?;
    let config = apply_caps(&draft);
    let justifications = structure_justifications(&draft)?;
    let plan = finish_plan(&draft, dataset, config, justifications, ctx, &mut warnings)?;

    validate_plan(&plan)?;
    Ok(SanitizeOutcome {
        plan,
        warnings,
    })
}

// ============================================================================
// SECTION: Step 1 - Structural Coercion
// ============================================================================

/// Known numeric field paths subject to string coercion.
const NUMERIC_PATHS: [(&str, &str); 8] = [
    ("config", "seed"),
    ("config", "batch_size"),
    ("config", "epochs"),
    ("config", "learning_rate"),
    ("config", "dropout"),
    ("config", "weight_decay"),
    ("metrics", "goal"),
    ("policy", "budget_minutes"),
];

/// Integer-typed field names among the numeric paths.
const INTEGER_FIELDS: [&str; 4] = ["seed", "batch_size", "epochs", "budget_minutes"];

/// Coerces string-typed numerics, rounds integers, and drops unknown keys.
fn coerce_structure(raw: &Value) -> Result<PlanDraft, PlanError> {
    let mut value = raw.clone();
    if let Some(root) = value.as_object_mut() {
        for (section, field) in NUMERIC_PATHS {
            let Some(slot) =
                root.get_mut(section).and_then(Value::as_object_mut).and_then(|s| s.get_mut(field))
            else {
                continue;
            };
            coerce_numeric(slot, INTEGER_FIELDS.contains(&field));
        }
    }
    serde_json::from_value(value).map_err(|err| PlanError::SchemaInvalid(err.to_string()))
}

/// Coerces one slot to a number, rounding when an integer is expected.
fn coerce_numeric(slot: &mut Value, integer: bool) {
    let parsed = match &*slot {
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    };
    let Some(parsed) = parsed else {
        return;
    };
    if integer {
        #[allow(clippy::cast_possible_truncation, reason = "Rounded before the cast.")]
        let rounded = parsed.round() as i64;
        *slot = Value::from(rounded);
    } else if let Some(number) = serde_json::Number::from_f64(parsed) {
        *slot = Value::Number(number);
    }
}

// ============================================================================
// SECTION: Step 2 - Dataset Resolution
// ============================================================================

/// Resolves the draft dataset against the registry and block-list.
fn resolve_dataset(
    draft: &PlanDraft,
    ctx: &SanitizeContext<'_>,
    warnings: &mut Vec<String>,
) -> (DatasetResolution, p2n_core::PlanDatasetDraft) {
    let mut dataset_draft = draft.dataset.clone().unwrap_or_default();
    if dataset_draft.name.is_none()
        && let Some(first) = ctx.claims.first()
    {
        warnings.push("draft carried no dataset; adopted the first claim's name".to_string());
        dataset_draft.name = Some(first.dataset_name.clone());
    }
    let Some(name) = dataset_draft.name.clone() else {
        return (DatasetResolution::Unresolved, dataset_draft);
    };

    match classify(&name, ctx.registry, Some(ctx.paper)) {
        DatasetClass::Blocked => {
            warnings.push(format!("dataset {name} is block-listed; entry removed"));
            dataset_draft.name = None;
            (DatasetResolution::Removed, dataset_draft)
        }
        DatasetClass::ResolvedRegistry {
            entry,
        } => {
            warn_when_not_claimed(&name, ctx, warnings);
            (DatasetResolution::Registry(entry), dataset_draft)
        }
        DatasetClass::ResolvedUpload {
            ..
        } => (
            DatasetResolution::Upload {
                name,
            },
            dataset_draft,
        ),
        DatasetClass::Complex | DatasetClass::Unknown => {
            (DatasetResolution::Unresolved, dataset_draft)
        }
    }
}

/// Warns when a registry-resolved dataset appears in no selected claim.
fn warn_when_not_claimed(name: &str, ctx: &SanitizeContext<'_>, warnings: &mut Vec<String>) {
    let normalized = normalize_name(name);
    let claimed = ctx
        .claims
        .iter()
        .any(|claim| normalize_name(&claim.dataset_name) == normalized);
    if !claimed {
        warnings.push(format!("dataset {name} does not appear in any selected claim"));
    }
}

// ============================================================================
// SECTION: Step 3 - Paper-Upload Override
// ============================================================================

/// Applies the paper-upload override to cleared or unresolved datasets.
///
/// This is the single safety guard: it fires only when the dataset did not
/// resolve and the owning paper actually carries an upload.
fn apply_upload_override(
    resolution: DatasetResolution,
    dataset_draft: &mut p2n_core::PlanDatasetDraft,
    ctx: &SanitizeContext<'_>,
    warnings: &mut Vec<String>,
) -> DatasetResolution {
    let cleared = matches!(resolution, DatasetResolution::Removed | DatasetResolution::Unresolved);
    if !cleared {
        return resolution;
    }
    let Some(upload) = ctx.paper.dataset_upload.as_ref() else {
        return resolution;
    };

    // The extractor-provided name wins over whatever the draft carried.
    let name = ctx
        .claims
        .first()
        .map(|claim| claim.dataset_name.clone())
        .or_else(|| dataset_draft.name.clone())
        .unwrap_or_else(|| upload.filename_stem().to_string());
    warnings.push(format!(
        "accepted paper upload {} as dataset {name}",
        upload.original_filename
    ));
    dataset_draft
        .loader_hints
        .insert("upload_format".to_string(), upload.format.extension().to_string());
    if let Some(target) = ctx.claims.iter().find_map(|claim| claim.target_column.clone()) {
        dataset_draft.loader_hints.entry("target_column".to_string()).or_insert(target);
    }
    DatasetResolution::Upload {
        name,
    }
}

/// Finishes the dataset section from the final resolution state.
fn finish_dataset(
    resolution: DatasetResolution,
    dataset_draft: p2n_core::PlanDatasetDraft,
    ctx: &SanitizeContext<'_>,
) -> Result<PlanDataset, PlanError> {
    match resolution {
        DatasetResolution::Registry(entry) => {
            if ctx.registry.is_blocked(&entry.canonical_name) {
                return Err(PlanError::NoAllowedDatasets);
            }
            let mut loader_hints = entry.loader_hints.clone();
            loader_hints.extend(dataset_draft.loader_hints);
            Ok(PlanDataset {
                name: entry.canonical_name.clone(),
                source: entry.source,
                loader_hints,
                train_split: dataset_draft
                    .train_split
                    .unwrap_or_else(|| pick_split(&entry, "train")),
                test_split: dataset_draft.test_split.unwrap_or_else(|| pick_split(&entry, "test")),
            })
        }
        DatasetResolution::Upload {
            name,
        } => Ok(PlanDataset {
            name,
            source: SourceKind::Upload,
            loader_hints: dataset_draft.loader_hints,
            train_split: dataset_draft.train_split.unwrap_or_else(|| "train".to_string()),
            test_split: dataset_draft.test_split.unwrap_or_else(|| "test".to_string()),
        }),
        DatasetResolution::Unresolved | DatasetResolution::Removed => {
            Err(PlanError::NoAllowedDatasets)
        }
    }
}

/// Picks a split name from an entry, preferring an exact match.
fn pick_split(entry: &RegistryEntry, preferred: &str) -> String {
    if entry.splits.iter().any(|split| split == preferred) {
        return preferred.to_string();
    }
    if preferred == "test" {
        return entry.splits.last().cloned().unwrap_or_else(|| "test".to_string());
    }
    entry.splits.first().cloned().unwrap_or_else(|| "train".to_string())
}

// ============================================================================
// SECTION: Step 4 - Caps
// ============================================================================

/// Applies the epoch cap and config defaults.
fn apply_caps(draft: &PlanDraft) -> PlanConfig {
    let config_draft = draft.config.clone().unwrap_or_default();
    PlanConfig {
        seed: config_draft.seed.unwrap_or(DEFAULT_SEED),
        batch_size: config_draft.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
        epochs: config_draft.epochs.unwrap_or(DEFAULT_EPOCHS).clamp(1, MAX_EPOCHS),
        learning_rate: config_draft.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE),
        optimizer: config_draft.optimizer.unwrap_or_else(|| DEFAULT_OPTIMIZER.to_string()),
        dropout: config_draft.dropout,
        weight_decay: config_draft.weight_decay,
    }
}

/// Clamps the budget to the hard cap and the caller's smaller request.
fn clamped_budget(draft: &PlanDraft, ctx: &SanitizeContext<'_>) -> u32 {
    let policy_budget = draft
        .policy
        .as_ref()
        .and_then(|policy| policy.budget_minutes)
        .unwrap_or(ctx.requested_budget_minutes);
    policy_budget.min(ctx.requested_budget_minutes).clamp(1, MAX_BUDGET_MINUTES)
}

// ============================================================================
// SECTION: Step 5 - Justification Structuring
// ============================================================================

/// Wraps bare-string justifications and enforces required keys.
fn structure_justifications(
    draft: &PlanDraft,
) -> Result<BTreeMap<String, Justification>, PlanError> {
    let mut structured = BTreeMap::new();
    for (key, value) in &draft.justifications {
        let justification = match value {
            JustificationDraft::Structured(justification) => justification.clone(),
            JustificationDraft::Bare(quote) => Justification {
                quote: quote.clone(),
                citation: INFERRED_CITATION.to_string(),
            },
        };
        structured.insert(key.clone(), justification);
    }

    for required in REQUIRED_JUSTIFICATIONS {
        let Some(justification) = structured.get(required) else {
            return Err(PlanError::JustificationMissing(required.to_string()));
        };
        if justification.quote.trim().is_empty() || justification.citation.trim().is_empty() {
            return Err(PlanError::JustificationMissing(required.to_string()));
        }
    }
    Ok(structured)
}

// ============================================================================
// SECTION: Step 6 - Final Assembly
// ============================================================================

/// Assembles the strict document and enforces the remaining invariants.
fn finish_plan(
    draft: &PlanDraft,
    dataset: PlanDataset,
    config: PlanConfig,
    justifications: BTreeMap<String, Justification>,
    ctx: &SanitizeContext<'_>,
    warnings: &mut Vec<String>,
) -> Result<PlanV11, PlanError> {
    let metrics_draft = draft.metrics.clone().unwrap_or_default();
    let primary = metrics_draft
        .primary
        .filter(|name| !name.trim().is_empty())
        .ok_or(PlanError::PrimaryMetricMissing)?;

    let goal = metrics_draft.goal.or_else(|| goal_from_claims(&primary, ctx));
    let Some(goal) = goal else {
        return Err(PlanError::SchemaInvalid("metrics.goal is missing".to_string()));
    };

    let model = draft.model.clone().unwrap_or_default();
    let model = match (model.name, model.architecture, model.framework) {
        (Some(name), Some(architecture), Some(framework)) => PlanModel {
            name,
            architecture,
            framework,
        },
        (name, architecture, framework) => {
            warnings.push("model section incomplete; defaulted to the baseline".to_string());
            PlanModel {
                name: name.unwrap_or_else(|| "Logistic Regression".to_string()),
                architecture: architecture.unwrap_or_else(|| "logistic_regression".to_string()),
                framework: framework.unwrap_or_else(|| "sklearn".to_string()),
            }
        }
    };

    let license = draft
        .policy
        .as_ref()
        .and_then(|policy| policy.license.clone())
        .unwrap_or_else(|| license_for(&dataset.name, ctx.registry).to_string());

    Ok(PlanV11 {
        version: PLAN_VERSION.to_string(),
        dataset,
        model,
        config,
        metrics: PlanMetrics {
            primary,
            secondary: metrics_draft.secondary,
            goal,
            loss: metrics_draft.loss.unwrap_or_else(|| DEFAULT_LOSS.to_string()),
        },
        justifications,
        policy: PlanPolicy {
            budget_minutes: clamped_budget(draft, ctx),
            license,
            cpu_only: true,
        },
        visualizations: draft.visualizations.clone(),
    })
}

/// Pulls a goal value from the selected claims for the primary metric.
fn goal_from_claims(primary: &str, ctx: &SanitizeContext<'_>) -> Option<f64> {
    let lowered = primary.to_ascii_lowercase();
    ctx.claims
        .iter()
        .find(|claim| claim.metric_name.to_ascii_lowercase() == lowered)
        .or_else(|| ctx.claims.first())
        .map(|claim| claim.metric_value)
}
