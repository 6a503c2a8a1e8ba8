// crates/p2n-planner/src/toolbox.rs
// ============================================================================
// Module: Reasoner Toolbox
// Description: Local function tools bound to the planning reasoner.
// Purpose: Execute resolver, license, and budget tools deterministically.
// Dependencies: crate, p2n-agents, p2n-core, p2n-registry, serde_json
// ============================================================================

//! ## Overview
//! The reasoner sees three function tools besides hosted search:
//! `dataset_resolver`, `license_checker`, and `budget_estimator`. All three
//! execute locally against process-immutable data, so a tool result never
//! depends on when it was called. The executed transcript is forwarded to the
//! shaper verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_agents::FunctionContract;
use p2n_agents::schema;
use p2n_core::Paper;
use p2n_registry::DatasetRegistry;
use p2n_registry::classify;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Contracts
// ============================================================================

/// Returns the `dataset_resolver` function contract.
#[must_use]
pub fn dataset_resolver_contract() -> FunctionContract {
    FunctionContract {
        name: "dataset_resolver".to_string(),
        description: "Classify a dataset name against the registry, block-list, and any paper \
                      upload."
            .to_string(),
        parameters: schema::object(
            json!({ "name": schema::string("Dataset name as written in the paper") }),
            &["name"],
        ),
    }
}

/// Returns the `license_checker` function contract.
#[must_use]
pub fn license_checker_contract() -> FunctionContract {
    FunctionContract {
        name: "license_checker".to_string(),
        description: "Look up the license tag for a canonical dataset name.".to_string(),
        parameters: schema::object(
            json!({ "name": schema::string("Canonical dataset name") }),
            &["name"],
        ),
    }
}

/// Returns the `budget_estimator` function contract.
#[must_use]
pub fn budget_estimator_contract() -> FunctionContract {
    FunctionContract {
        name: "budget_estimator".to_string(),
        description: "Estimate CPU-only training minutes for an epoch count and dataset size."
            .to_string(),
        parameters: schema::object(
            json!({
                "epochs": schema::integer("Planned training epochs"),
                "dataset_size_mb": schema::integer("Approximate dataset size in megabytes"),
            }),
            &["epochs"],
        ),
    }
}

// ============================================================================
// SECTION: Transcript
// ============================================================================

/// One executed tool call with its result, forwarded to the shaper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolTranscriptEntry {
    /// Tool name.
    pub tool: String,
    /// Raw arguments the model supplied.
    pub arguments: String,
    /// Result returned to the model.
    pub result: Value,
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Arguments accepted by the resolver and license tools.
#[derive(Debug, Deserialize)]
struct NameArgs {
    /// Dataset name argument.
    name: String,
}

/// Arguments accepted by the budget estimator.
#[derive(Debug, Deserialize)]
struct BudgetArgs {
    /// Planned epochs.
    epochs: u32,
    /// Approximate dataset size in megabytes.
    #[serde(default)]
    dataset_size_mb: Option<u32>,
}

/// Executes one reasoner function tool locally.
///
/// Unknown tools and malformed arguments return structured error payloads
/// rather than failing the stream; the model can recover in its next turn.
#[must_use]
pub fn execute_tool(
    tool: &str,
    arguments: &str,
    registry: &DatasetRegistry,
    paper: &Paper,
) -> Value {
    match tool {
        "dataset_resolver" => match serde_json::from_str::<NameArgs>(arguments) {
            Ok(args) => {
                serde_json::to_value(classify(&args.name, registry, Some(paper)))
                    .unwrap_or_else(|_| json!({ "error": "classification failed to serialize" }))
            }
            Err(err) => json!({ "error": format!("bad arguments: {err}") }),
        },
        "license_checker" => match serde_json::from_str::<NameArgs>(arguments) {
            Ok(args) => json!({ "name": args.name, "license": license_for(&args.name, registry) }),
            Err(err) => json!({ "error": format!("bad arguments: {err}") }),
        },
        "budget_estimator" => match serde_json::from_str::<BudgetArgs>(arguments) {
            Ok(args) => {
                let minutes = estimate_budget_minutes(args.epochs, args.dataset_size_mb);
                json!({ "estimated_minutes": minutes })
            }
            Err(err) => json!({ "error": format!("bad arguments: {err}") }),
        },
        other => json!({ "error": format!("unknown tool: {other}") }),
    }
}

/// Returns the license tag for a canonical dataset name.
///
/// Registry hits use a fixed per-dataset table; everything else is
/// `unknown`, which the sanitizer records verbatim.
#[must_use]
pub fn license_for(name: &str, registry: &DatasetRegistry) -> &'static str {
    let Some(entry) = registry.lookup(name) else {
        return "unknown";
    };
    match entry.canonical_name.as_str() {
        "sst2" | "imdb" | "agnews" => "research-only",
        "mnist" | "fashionmnist" => "cc-by-sa-3.0",
        "cifar10" => "mit-like",
        "iris" | "wine" | "breastcancer" | "digits" | "synthetic" => "public-domain",
        _ => "unknown",
    }
}

/// Estimates CPU-only training minutes for an epoch count and size hint.
///
/// The estimate is intentionally coarse: one minute of fixed overhead plus a
/// size-scaled per-epoch cost, rounded up.
#[must_use]
pub fn estimate_budget_minutes(epochs: u32, dataset_size_mb: Option<u32>) -> u32 {
    let size_mb = dataset_size_mb.unwrap_or(10).max(1);
    let per_epoch_seconds = 5 + size_mb / 4;
    let total_seconds = 60 + epochs * per_epoch_seconds;
    total_seconds.div_ceil(60)
}
