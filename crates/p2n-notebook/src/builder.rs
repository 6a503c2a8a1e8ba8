// crates/p2n-notebook/src/builder.rs
// ============================================================================
// Module: Notebook Builder
// Description: Assembles the fixed cell skeleton from generator outputs.
// Purpose: Produce the notebook, pinned requirements, and env fingerprint.
// Dependencies: crate::{generators, notebook}, p2n-core, p2n-registry
// ============================================================================

//! ## Overview
//! A materialized notebook is a fixed sequence: a markdown summary, the
//! seeding cell, the deduplicated import union, the dataset cell, and the
//! model cell. Requirements union the generator pins with a default base set;
//! the environment fingerprint hashes the sorted pins, so identical plans
//! fingerprint identically regardless of generator emission order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use p2n_core::PlanV11;
use p2n_core::Timestamp;
use p2n_core::hashing::environment_fingerprint;
use p2n_registry::DatasetRegistry;

use crate::generators::select_dataset_generator;
use crate::generators::select_model_generator;
use crate::notebook::Cell;
use crate::notebook::Notebook;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default dependency pins present in every requirements file.
const BASE_REQUIREMENTS: [&str; 4] =
    ["matplotlib==3.8.4", "numpy==1.26.4", "pandas==2.2.2", "scikit-learn==1.4.2"];

// ============================================================================
// SECTION: Build Output
// ============================================================================

/// A fully assembled notebook with its pinned environment.
///
/// # Invariants
/// - `fingerprint` is the hash of `requirements`; the pair never diverges.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedNotebook {
    /// The assembled notebook document.
    pub notebook: Notebook,
    /// Requirements file body, newline-terminated.
    pub requirements: String,
    /// Deterministic environment fingerprint.
    pub fingerprint: String,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds the notebook, requirements, and fingerprint for a plan.
#[must_use]
pub fn build_notebook(
    plan: &PlanV11,
    paper_title: &str,
    generated_at: Timestamp,
    registry: &DatasetRegistry,
) -> MaterializedNotebook {
    let dataset_generator = select_dataset_generator(plan, registry);
    let model_generator = select_model_generator(plan);

    let mut imports: BTreeSet<String> = BTreeSet::new();
    imports.extend(dataset_generator.imports(plan));
    imports.extend(model_generator.imports(plan));
    let imports_cell = imports.iter().map(|line| format!("{line}\n")).collect::<String>();

    let cells = vec![
        Cell::markdown(&summary_markdown(plan, paper_title, generated_at)),
        Cell::code(&seeding_cell(plan)),
        Cell::code(&imports_cell),
        Cell::code(&dataset_generator.code(plan)),
        Cell::code(&model_generator.code(plan)),
    ];

    let mut pins: BTreeSet<String> =
        BASE_REQUIREMENTS.iter().map(ToString::to_string).collect();
    pins.extend(dataset_generator.requirements(plan));
    pins.extend(model_generator.requirements(plan));
    let requirements = pins.iter().map(|pin| format!("{pin}\n")).collect::<String>();
    let fingerprint = environment_fingerprint(&requirements);

    MaterializedNotebook {
        notebook: Notebook::new(cells),
        requirements,
        fingerprint,
    }
}

// ============================================================================
// SECTION: Cell Bodies
// ============================================================================

/// Renders the markdown summary cell.
fn summary_markdown(plan: &PlanV11, paper_title: &str, generated_at: Timestamp) -> String {
    let mut body = format!(
        "# Reproduction: {paper_title}\n\n\
         Generated at unix-ms {}.\n\n\
         Dataset `{}` ({}), model `{}`, primary metric `{}` with goal {}.\n\n\
         ## Justifications\n\n",
        generated_at.as_unix_millis(),
        plan.dataset.name,
        plan.dataset.source.as_str(),
        plan.model.name,
        plan.metrics.primary,
        plan.metrics.goal,
    );
    for (key, justification) in &plan.justifications {
        body.push_str(&format!(
            "- **{key}**: \"{}\" ({})\n",
            justification.quote, justification.citation
        ));
    }
    body
}

/// Renders the setup and seeding cell.
fn seeding_cell(plan: &PlanV11) -> String {
    format!(
        "import json\n\
         import os\n\
         import random\n\
         \n\
         SEED = {seed}\n\
         random.seed(SEED)\n\
         \n\
         os.environ[\"CUDA_VISIBLE_DEVICES\"] = \"\"\n\
         os.environ[\"HIP_VISIBLE_DEVICES\"] = \"\"\n\
         \n\
         def require_cpu_only():\n\
         \x20   visible = os.environ.get(\"CUDA_VISIBLE_DEVICES\", \"\")\n\
         \x20   if visible not in (\"\", \"-1\"):\n\
         \x20       raise RuntimeError(\"GPU_REQUESTED: execution is CPU-only\")\n\
         \n\
         require_cpu_only()\n\
         \n\
         import numpy as np\n\
         \n\
         np.random.seed(SEED)\n\
         \n\
         _events_file = open(\"events.jsonl\", \"a\", encoding=\"utf-8\")\n\
         \n\
         def log_event(event_type, payload=None):\n\
         \x20   record = {{\"type\": event_type, \"payload\": payload or {{}}}}\n\
         \x20   _events_file.write(json.dumps(record, sort_keys=True) + \"\\n\")\n\
         \x20   _events_file.flush()\n\
         \n\
         log_event(\"setup_complete\", {{\"seed\": SEED, \"cpu_only\": True}})\n",
        seed = plan.config.seed,
    )
}
